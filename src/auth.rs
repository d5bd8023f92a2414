// 🔑 Auth - email/password login with bcrypt and server-side sessions
//
// Session tokens are random UUIDs handed to the client once; only their
// SHA-256 digest is stored in the `sessions` table. Logging in drops the
// user's older sessions, logging out drops all of them. Sessions expire a
// fixed number of hours after login.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::db::log_event;
use crate::entities::branch;
use crate::error::CajaError;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const MIN_PASSWORD_LEN: usize = 6;

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Everything, including reports, CRM, reconciliation and maintenance
    Admin,
    /// Any branch, any date, no admin screens
    Supervisor,
    /// Own branch only, today or yesterday only
    BranchManager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supervisor => "supervisor",
            Role::BranchManager => "branch_manager",
        }
    }

    /// Unknown role names fall back to the most restricted role
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            "supervisor" | "gerente" => Role::Supervisor,
            _ => Role::BranchManager,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "ADMINISTRATOR",
            Role::Supervisor => "SUPERVISOR",
            Role::BranchManager => "BRANCH MANAGER",
        }
    }

    /// Not limited to one branch or to today/yesterday
    pub fn has_full_access(&self) -> bool {
        matches!(self, Role::Admin | Role::Supervisor)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Authenticated user profile (never carries the password hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub branch_id: Option<i64>,
}

impl User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let role: String = row.get(3)?;
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            role: Role::parse(&role),
            branch_id: row.get(4)?,
        })
    }
}

/// Input for provisioning a user (CLI / maintenance)
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: String,
    pub branch_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    /// Raw token; the client sends it back as `Authorization: Bearer <token>`
    pub token: String,
    pub user: User,
}

// ============================================================================
// HELPERS
// ============================================================================

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let hash = bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
    Ok(hash)
}

fn password_hash_for(conn: &Connection, user_id: &str) -> anyhow::Result<Option<String>> {
    let hash = conn
        .query_row(
            "SELECT password_hash FROM user_profiles WHERE id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash)
}

fn new_session(conn: &Connection, user_id: &str, created_at: DateTime<Utc>) -> anyhow::Result<String> {
    let token = uuid::Uuid::new_v4().simple().to_string();
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![hash_token(&token), user_id, created_at],
    )?;
    Ok(token)
}

/// Drop every session of `user_id` except the one behind `keep_token`
fn drop_other_sessions(conn: &Connection, user_id: &str, keep_token: &str) -> anyhow::Result<usize> {
    let removed = conn.execute(
        "DELETE FROM sessions WHERE user_id = ?1 AND token_hash != ?2",
        params![user_id, hash_token(keep_token)],
    )?;
    Ok(removed)
}

// ============================================================================
// USERS
// ============================================================================

pub fn create_user(conn: &Connection, new_user: &NewUser) -> anyhow::Result<User> {
    let email = new_user.email.trim();
    if email.is_empty() || new_user.full_name.trim().is_empty() {
        return Err(CajaError::validation("Email and full name are required").into());
    }
    if new_user.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CajaError::validation(format!(
            "The password must be at least {MIN_PASSWORD_LEN} characters"
        ))
        .into());
    }
    if let Some(branch_id) = new_user.branch_id {
        if branch::get_branch(conn, branch_id)?.is_none() {
            return Err(CajaError::not_found(format!("Branch {branch_id} does not exist")).into());
        }
    }
    if find_user_by_email(conn, email)?.is_some() {
        return Err(CajaError::validation(format!("A user with email {email} already exists")).into());
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.to_string(),
        full_name: new_user.full_name.trim().to_string(),
        role: Role::parse(&new_user.role),
        branch_id: new_user.branch_id,
    };

    conn.execute(
        "INSERT INTO user_profiles (id, email, password_hash, full_name, role, branch_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.email,
            hash_password(&new_user.password)?,
            user.full_name,
            user.role.as_str(),
            user.branch_id,
        ],
    )?;

    log_event(
        conn,
        "user_created",
        "user",
        &user.id,
        serde_json::json!({ "email": user.email, "role": user.role.as_str() }),
        "maintenance",
    );
    info!(email = %user.email, role = user.role.as_str(), "user created");

    Ok(user)
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, email, full_name, role, branch_id FROM user_profiles WHERE email = ?1",
            [email.trim()],
            User::from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, email, full_name, role, branch_id FROM user_profiles WHERE id = ?1",
            [id],
            User::from_row,
        )
        .optional()?;
    Ok(user)
}

// ============================================================================
// SESSIONS
// ============================================================================

/// Verify credentials and open a session, closing any older ones
pub fn login(conn: &Connection, email: &str, password: &str) -> anyhow::Result<LoginOutcome> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(CajaError::validation("Please fill in all fields").into());
    }

    let user = match find_user_by_email(conn, email)? {
        Some(user) => user,
        None => {
            warn!(email = email.trim(), "login rejected: unknown email");
            return Err(CajaError::InvalidCredentials.into());
        }
    };

    let hash = password_hash_for(conn, &user.id)?.unwrap_or_default();
    if !bcrypt::verify(password, &hash).unwrap_or(false) {
        warn!(email = %user.email, "login rejected: wrong password");
        return Err(CajaError::InvalidCredentials.into());
    }

    // New session first, then drop the old ones
    let token = new_session(conn, &user.id, Utc::now())?;
    let dropped = drop_other_sessions(conn, &user.id, &token)?;

    log_event(
        conn,
        "login",
        "user",
        &user.id,
        serde_json::json!({ "dropped_sessions": dropped }),
        &user.email,
    );
    info!(email = %user.email, dropped, "login successful");

    Ok(LoginOutcome { token, user })
}

/// Resolve a bearer token to its user; expired sessions are removed
pub fn authenticate(conn: &Connection, token: &str, timeout: Duration) -> anyhow::Result<User> {
    authenticate_at(conn, token, timeout, Utc::now())
}

pub fn authenticate_at(
    conn: &Connection,
    token: &str,
    timeout: Duration,
    now: DateTime<Utc>,
) -> anyhow::Result<User> {
    let token_hash = hash_token(token);
    let session: Option<(String, DateTime<Utc>)> = conn
        .query_row(
            "SELECT user_id, created_at FROM sessions WHERE token_hash = ?1",
            [&token_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (user_id, created_at) = session.ok_or(CajaError::NotAuthenticated)?;

    if now - created_at > timeout {
        conn.execute("DELETE FROM sessions WHERE token_hash = ?1", [&token_hash])?;
        info!(user_id = %user_id, "session expired");
        return Err(CajaError::NotAuthenticated.into());
    }

    let user = get_user(conn, &user_id)?.ok_or(CajaError::NotAuthenticated)?;
    Ok(user)
}

/// Global sign-out: every session of the token's owner goes
pub fn logout(conn: &Connection, token: &str) -> anyhow::Result<usize> {
    let user_id: Option<String> = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token_hash = ?1",
            [hash_token(token)],
            |row| row.get(0),
        )
        .optional()?;

    let Some(user_id) = user_id else {
        return Ok(0);
    };

    let removed = conn.execute("DELETE FROM sessions WHERE user_id = ?1", [&user_id])?;
    log_event(conn, "logout", "user", &user_id, serde_json::json!({ "sessions": removed }), &user_id);
    info!(user_id = %user_id, removed, "logged out");
    Ok(removed)
}

/// Change the caller's password; keeps the current session, drops the rest
pub fn change_password(
    conn: &Connection,
    user: &User,
    current_token: &str,
    current: &str,
    new: &str,
    confirm: &str,
) -> anyhow::Result<()> {
    if current.is_empty() || new.is_empty() || confirm.is_empty() {
        return Err(CajaError::validation("Fill in all fields").into());
    }
    if new != confirm {
        return Err(CajaError::validation("The new passwords do not match").into());
    }
    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(CajaError::validation(format!(
            "The password must be at least {MIN_PASSWORD_LEN} characters"
        ))
        .into());
    }

    let hash = password_hash_for(conn, &user.id)?.ok_or(CajaError::NotAuthenticated)?;
    if !bcrypt::verify(current, &hash).unwrap_or(false) {
        return Err(CajaError::validation("The current password is incorrect").into());
    }

    conn.execute(
        "UPDATE user_profiles SET password_hash = ?1 WHERE id = ?2",
        params![hash_password(new)?, user.id],
    )?;
    let dropped = drop_other_sessions(conn, &user.id, current_token)?;

    log_event(
        conn,
        "password_changed",
        "user",
        &user.id,
        serde_json::json!({ "dropped_sessions": dropped }),
        &user.email,
    );
    info!(email = %user.email, "password changed");
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
