// Cajas Diarias - Core Library
// Daily cash registers for a chain of branches: shared by the CLI, the TUI viewer and the API server

pub mod error;          // Domain errors (CajaError)
pub mod config;         // TOML settings + business timezone
pub mod db;             // SQLite schema, seeds, audit events
pub mod entities;       // Branches, categories, payment methods, movements, CRM rows
pub mod auth;           // Users, bcrypt passwords, sessions
pub mod access;         // Branch/date rules per role
pub mod entry;          // Movement entry forms + validation
pub mod summary;        // Daily summary ("A Rendir")
pub mod report;         // Range report + CSV export
pub mod reconciliation; // Register vs CRM
pub mod maintenance;    // Admin catalog upkeep + corrections

// Re-export commonly used types
pub use error::{domain_error, CajaError};
pub use config::Config;
pub use db::{
    Event,
    open_database, open_in_memory, setup_database, seed_defaults,
    insert_event, log_event, get_events_for_entity,
};
pub use entities::{
    Branch, Category, CategoryKind, AppliesTo, PaymentMethod,
    Movement, MovementKind, MovementUpdate, NewMovement,
    CrmDaily, UpsertOutcome,
    CASH_METHOD, PAYROLL_CATEGORY,
};
pub use auth::{Role, User, NewUser, LoginOutcome};
pub use access::{DateChoices, allowed_branches, check_date, date_choices};
pub use entry::{EntryForm, FormOptions, form_options, record_movement};
pub use summary::{DailySummary, daily_summary};
pub use report::{BranchScope, RangeReport, ReportQuery, range_report, write_csv};
pub use reconciliation::{
    CrmForm, Diagnosis, ReconciliationEngine, ReconciliationReport,
    reconcile_branch, save_crm_day,
};
pub use maintenance::{BranchForm, CategoryForm, PaymentMethodForm};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
