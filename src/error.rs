//! Error taxonomy for the cache/invalidation/query core.
//!
//! Every fallible core operation returns [`CoreError`]; the HTTP layer in
//! [`crate::api`] maps it onto an HTTP status without the core depending on
//! axum beyond the `IntoResponse` impl below.

use thiserror::Error;

/// The five error kinds the core surfaces, per the error handling design.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {message}{}", sql_state.as_ref().map(|s| format!(" (sqlstate {s})")).unwrap_or_default())]
    Internal {
        message: String,
        sql_state: Option<String>,
    },

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl CoreError {
    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal {
            message: message.into(),
            sql_state: None,
        }
    }

    pub fn internal_with_sql_state(message: impl Into<String>, sql_state: impl Into<String>) -> Self {
        CoreError::Internal {
            message: message.into(),
            sql_state: Some(sql_state.into()),
        }
    }

    /// Stable machine-readable code, used by the HTTP layer and in logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::BadRequest(_) => "BAD_REQUEST",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Unavailable(_) => "UNAVAILABLE",
            CoreError::Internal { .. } => "INTERNAL",
            CoreError::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::BadRequest(format!("invalid configuration document: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping_is_stable() {
        assert_eq!(CoreError::BadRequest("x".into()).code(), "BAD_REQUEST");
        assert_eq!(CoreError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(CoreError::Unavailable("x".into()).code(), "UNAVAILABLE");
        assert_eq!(CoreError::internal("x").code(), "INTERNAL");
        assert_eq!(CoreError::DeadlineExceeded.code(), "DEADLINE_EXCEEDED");
    }

    #[test]
    fn internal_error_displays_sql_state_when_present() {
        let e = CoreError::internal_with_sql_state("boom", "42P01");
        assert!(e.to_string().contains("42P01"));
    }
}
