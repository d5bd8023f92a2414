// ⚠️ Domain Errors - Messages the user actually sees
//
// Plumbing failures (SQLite, IO, CSV) stay in anyhow::Error. Anything the
// cashier or admin should read travels as a CajaError inside it and is
// recovered with downcast_ref at the edge (server / CLI).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CajaError {
    /// No session, or the session expired
    #[error("You must log in to continue")]
    NotAuthenticated,

    /// Wrong email/password pair (same message for unknown email)
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Authenticated but not allowed to do this
    #[error("{0}")]
    Forbidden(String),

    /// Form input rejected
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CajaError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        CajaError::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CajaError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CajaError::NotFound(msg.into())
    }
}

/// Find the domain error inside an anyhow chain, if there is one
pub fn domain_error(err: &anyhow::Error) -> Option<&CajaError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CajaError>())
}
