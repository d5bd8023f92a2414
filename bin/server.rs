// Cajas Diarias - Web Server
// REST API + single-page UI with Axum

use anyhow::Context;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use cajas_diarias::{
    access, auth, domain_error, entities::{branch, category, payment_method}, entry, maintenance, reconciliation,
    report::{self, BranchScope, ReportQuery},
    summary, BranchForm, CajaError, CategoryForm, CategoryKind, Config, CrmForm, EntryForm, MovementKind,
    MovementUpdate, PaymentMethodForm, ReconciliationEngine, User,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
    engine: ReconciliationEngine,
}

impl AppState {
    fn new(conn: Connection, config: Config) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
            engine: ReconciliationEngine::default(),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError(anyhow::anyhow!("database mutex poisoned")))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            error: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ============================================================================
// Errors
// ============================================================================

/// Domain errors map to 4xx with their message; anything else is a logged 500
struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match domain_error(&self.0) {
            Some(CajaError::NotAuthenticated | CajaError::InvalidCredentials) => {
                (StatusCode::UNAUTHORIZED, self.0.to_string())
            }
            Some(CajaError::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg.clone()),
            Some(CajaError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            Some(CajaError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg.clone()),
            Some(CajaError::Config(_)) | None => {
                tracing::error!("request failed: {:#}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = ApiResponse {
            success: false,
            data: (),
            message: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Session extractor
// ============================================================================

/// Authenticated caller, from `Authorization: Bearer <token>`
struct Session {
    user: User,
    token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CajaError::NotAuthenticated)?
            .to_string();

        let conn = state.conn()?;
        let user = auth::authenticate(&conn, &token, state.config.session_timeout())?;
        Ok(Session { user, token })
    }
}

// ============================================================================
// Request bodies / query strings
// ============================================================================

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct PasswordRequest {
    current: String,
    new: String,
    confirm: String,
}

#[derive(Deserialize)]
struct CatalogParams {
    kind: CategoryKind,
}

#[derive(Deserialize)]
struct EntryOptionsParams {
    kind: MovementKind,
}

#[derive(Deserialize)]
struct SummaryParams {
    branch_id: i64,
    date: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct RangeParams {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    branch_id: Option<i64>,
}

impl RangeParams {
    fn query(&self, today: NaiveDate) -> ReportQuery {
        let scope = self.branch_id.map(BranchScope::One).unwrap_or(BranchScope::All);
        let defaults = ReportQuery::month_to_date(today, scope);
        ReportQuery {
            from: self.from.unwrap_or(defaults.from),
            to: self.to.unwrap_or(defaults.to),
            scope,
        }
    }
}

#[derive(Deserialize)]
struct ReconciliationParams {
    branch_id: i64,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

#[derive(Serialize)]
struct LogoutResponse {
    sessions_closed: usize,
}

#[derive(Serialize)]
struct CrmSaved {
    id: i64,
    outcome: cajas_diarias::UpsertOutcome,
}

#[derive(Serialize)]
struct DatesResponse {
    today: NaiveDate,
    choices: access::DateChoices,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/login - Email + password, returns a bearer token
async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> ApiResult<auth::LoginOutcome> {
    let conn = state.conn()?;
    ok(auth::login(&conn, &req.email, &req.password)?)
}

/// POST /api/logout - Close every session of the caller
async fn logout(State(state): State<AppState>, session: Session) -> ApiResult<LogoutResponse> {
    let conn = state.conn()?;
    let sessions_closed = auth::logout(&conn, &session.token)?;
    ok(LogoutResponse { sessions_closed })
}

/// GET /api/me - Current user
async fn me(session: Session) -> ApiResult<User> {
    ok(session.user)
}

/// POST /api/password - Change own password
async fn change_password(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<PasswordRequest>,
) -> ApiResult<&'static str> {
    let conn = state.conn()?;
    auth::change_password(&conn, &session.user, &session.token, &req.current, &req.new, &req.confirm)?;
    ok("Password updated")
}

/// GET /api/branches - Branches the caller may work with
async fn list_branches(State(state): State<AppState>, session: Session) -> ApiResult<Vec<cajas_diarias::Branch>> {
    let conn = state.conn()?;
    let active = branch::list_active_branches(&conn)?;
    ok(access::allowed_branches(&session.user, &active)?)
}

/// GET /api/categories?kind= - Active categories for the entry form
async fn list_categories(
    State(state): State<AppState>,
    _session: Session,
    Query(params): Query<CatalogParams>,
) -> ApiResult<Vec<cajas_diarias::Category>> {
    let conn = state.conn()?;
    ok(category::categories_for_form(&conn, params.kind)?)
}

/// GET /api/payment-methods?kind= - Active methods for sales or expenses
async fn list_payment_methods(
    State(state): State<AppState>,
    _session: Session,
    Query(params): Query<CatalogParams>,
) -> ApiResult<Vec<cajas_diarias::PaymentMethod>> {
    let conn = state.conn()?;
    ok(payment_method::payment_methods_for(&conn, params.kind)?)
}

/// GET /api/entry-options?kind= - Everything the entry form needs for a kind
async fn entry_options(
    State(state): State<AppState>,
    _session: Session,
    Query(params): Query<EntryOptionsParams>,
) -> ApiResult<entry::FormOptions> {
    let conn = state.conn()?;
    ok(entry::form_options(&conn, params.kind)?)
}

/// GET /api/dates - Dates the caller may pick
async fn list_dates(State(state): State<AppState>, session: Session) -> ApiResult<DatesResponse> {
    let today = state.config.today();
    ok(DatesResponse {
        today,
        choices: access::date_choices(session.user.role, today),
    })
}

/// POST /api/movements - Record a sale, expense or payroll payment
async fn create_movement(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<EntryForm>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = state.conn()?;
    let movement = entry::record_movement(&conn, &session.user, &form, state.config.today())?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(movement))))
}

/// GET /api/summary?branch_id=&date= - Daily summary
async fn daily_summary(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<SummaryParams>,
) -> ApiResult<summary::DailySummary> {
    let today = state.config.today();
    let conn = state.conn()?;
    ok(summary::daily_summary(
        &conn,
        &session.user,
        params.branch_id,
        params.date.unwrap_or(today),
        today,
    )?)
}

/// GET /api/reports?from=&to=&branch_id= - Range report
async fn range_report(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<RangeParams>,
) -> ApiResult<report::RangeReport> {
    let conn = state.conn()?;
    let report = report::range_report(&conn, &session.user, params.query(state.config.today()))?;
    if report.is_empty() {
        return Ok(Json(ApiResponse::ok(report).with_message(report::NO_DATA)));
    }
    ok(report)
}

/// GET /api/reports/csv?from=&to=&branch_id= - Range report as CSV download
async fn range_report_csv(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<RangeParams>,
) -> Result<Response, ApiError> {
    let conn = state.conn()?;
    let report = report::range_report(&conn, &session.user, params.query(state.config.today()))?;
    let body = report::to_csv_bytes(&report)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"reporte.csv\""),
        ],
        body,
    )
        .into_response())
}

/// POST /api/crm - Save a branch's CRM figures for a day
async fn save_crm(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<CrmForm>,
) -> ApiResult<CrmSaved> {
    let conn = state.conn()?;
    let (id, outcome) = reconciliation::save_crm_day(&conn, &session.user, &form)?;
    ok(CrmSaved { id, outcome })
}

/// GET /api/reconciliation?branch_id=&from=&to= - Register vs CRM
async fn reconcile(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<ReconciliationParams>,
) -> ApiResult<reconciliation::ReconciliationReport> {
    let defaults = ReportQuery::month_to_date(state.config.today(), BranchScope::One(params.branch_id));
    let conn = state.conn()?;
    ok(reconciliation::reconcile_branch(
        &conn,
        &session.user,
        &state.engine,
        params.branch_id,
        params.from.unwrap_or(defaults.from),
        params.to.unwrap_or(defaults.to),
    )?)
}

// ----------------------------------------------------------------------------
// Maintenance (admin)
// ----------------------------------------------------------------------------

/// GET /api/maintenance/branches - Every branch, including inactive
async fn maintenance_branches(State(state): State<AppState>, session: Session) -> ApiResult<Vec<cajas_diarias::Branch>> {
    let conn = state.conn()?;
    ok(maintenance::list_branches(&conn, &session.user)?)
}

/// POST /api/maintenance/branches - Create or update a branch
async fn maintenance_save_branch(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<BranchForm>,
) -> ApiResult<cajas_diarias::Branch> {
    let conn = state.conn()?;
    ok(maintenance::save_branch(&conn, &session.user, &form)?)
}

/// GET /api/maintenance/categories
async fn maintenance_categories(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Vec<cajas_diarias::Category>> {
    let conn = state.conn()?;
    ok(maintenance::list_categories(&conn, &session.user)?)
}

/// POST /api/maintenance/categories - Create or update a category
async fn maintenance_save_category(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<CategoryForm>,
) -> ApiResult<cajas_diarias::Category> {
    let conn = state.conn()?;
    ok(maintenance::save_category(&conn, &session.user, &form)?)
}

/// GET /api/maintenance/payment-methods
async fn maintenance_payment_methods(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Vec<cajas_diarias::PaymentMethod>> {
    let conn = state.conn()?;
    ok(maintenance::list_payment_methods(&conn, &session.user)?)
}

/// POST /api/maintenance/payment-methods - Create or update a payment method
async fn maintenance_save_payment_method(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<PaymentMethodForm>,
) -> ApiResult<cajas_diarias::PaymentMethod> {
    let conn = state.conn()?;
    ok(maintenance::save_payment_method(&conn, &session.user, &form)?)
}

/// GET /api/maintenance/movements - Latest movements, newest first
async fn maintenance_movements(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Vec<cajas_diarias::Movement>> {
    let conn = state.conn()?;
    ok(maintenance::latest_movements(&conn, &session.user)?)
}

/// PUT /api/maintenance/movements/:id - Correct amount, concept or date
async fn maintenance_update_movement(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Json(update): Json<MovementUpdate>,
) -> ApiResult<cajas_diarias::Movement> {
    let conn = state.conn()?;
    ok(maintenance::correct_movement(&conn, &session.user, id, &update)?)
}

/// DELETE /api/maintenance/movements/:id
async fn maintenance_delete_movement(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> ApiResult<i64> {
    let conn = state.conn()?;
    maintenance::remove_movement(&conn, &session.user, id)?;
    ok(id)
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Router
// ============================================================================

fn app(state: AppState) -> Router {
    let maintenance_routes = Router::new()
        .route("/branches", get(maintenance_branches).post(maintenance_save_branch))
        .route("/categories", get(maintenance_categories).post(maintenance_save_category))
        .route(
            "/payment-methods",
            get(maintenance_payment_methods).post(maintenance_save_payment_method),
        )
        .route("/movements", get(maintenance_movements))
        .route(
            "/movements/:id",
            put(maintenance_update_movement).delete(maintenance_delete_movement),
        );

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/password", post(change_password))
        .route("/branches", get(list_branches))
        .route("/categories", get(list_categories))
        .route("/payment-methods", get(list_payment_methods))
        .route("/entry-options", get(entry_options))
        .route("/dates", get(list_dates))
        .route("/movements", post(create_movement))
        .route("/summary", get(daily_summary))
        .route("/reports", get(range_report))
        .route("/reports/csv", get(range_report_csv))
        .route("/crm", post(save_crm))
        .route("/reconciliation", get(reconcile))
        .nest("/maintenance", maintenance_routes)
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cajas_diarias=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact().with_target(false))
        .init();

    let config = Config::load(None)?;
    let conn = cajas_diarias::open_database(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;

    tracing::info!(
        database = %config.database.display(),
        bind = %config.bind,
        timezone = %config.timezone,
        version = cajas_diarias::VERSION,
        "starting cajas-server"
    );

    let bind = config.bind.clone();
    let router = app(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;

    println!("\n🚀 Server running on http://{bind}");
    println!("   Press Ctrl+C to stop\n");

    axum::serve(listener, router).await.context("Server error")?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
