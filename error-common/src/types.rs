use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::codes;

/// Why an authentication attempt failed.
///
/// Only ever written to the audit trail and diagnostics. The caller sees the
/// same message for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UnknownPrincipal,
    InactivePrincipal,
    WrongPassword,
    WrongPasscode,
    NoPasswordSet,
    NoPasscodeSet,
    PasscodeExpired,
    MethodNotAllowed,
    FederatedMismatch,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownPrincipal => "unknown_principal",
            Self::InactivePrincipal => "inactive_principal",
            Self::WrongPassword => "wrong_password",
            Self::WrongPasscode => "wrong_passcode",
            Self::NoPasswordSet => "no_password_set",
            Self::NoPasscodeSet => "no_passcode_set",
            Self::PasscodeExpired => "passcode_expired",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::FederatedMismatch => "federated_mismatch",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boundary error for every operation exposed by the identity core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Malformed input, rejected before any store mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wrong or unknown credential. The reason never reaches the caller.
    #[error("Invalid credentials")]
    AuthenticationFailed { reason: FailureReason },

    #[error("Account locked until {locked_until}")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    /// Denied by the permission engine; `reason` is a diagnostic code
    #[error("Permission denied ({reason})")]
    PermissionDenied { reason: String },

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The store failed during the primary operation, so its effect is unknown
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for identity core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn authentication_failed(reason: FailureReason) -> Self {
        Self::AuthenticationFailed { reason }
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl fmt::Display) -> Self {
        Self::Unavailable(message.to_string())
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => codes::validation::INVALID_INPUT,
            Self::AuthenticationFailed { .. } => codes::authentication::INVALID_CREDENTIALS,
            Self::AccountLocked { .. } => codes::authentication::ACCOUNT_LOCKED,
            Self::SessionExpired | Self::SessionNotFound => {
                codes::authentication::SESSION_INVALID
            }
            Self::PermissionDenied { .. } => codes::authorization::ACCESS_DENIED,
            Self::RateLimited { .. } => codes::throttling::RATE_LIMITED,
            Self::Unavailable(_) => codes::availability::SERVICE_UNAVAILABLE,
        }
    }

    /// Message that is safe to show the caller.
    ///
    /// Validation messages are kept because they describe the caller's own
    /// input; every other variant collapses to a fixed string.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::AuthenticationFailed { .. } => "Invalid credentials".to_string(),
            Self::AccountLocked { locked_until } => {
                format!("Account locked until {}", locked_until.to_rfc3339())
            }
            Self::SessionExpired | Self::SessionNotFound => {
                "Session is no longer valid, please sign in again".to_string()
            }
            Self::PermissionDenied { .. } => "Permission denied".to_string(),
            Self::RateLimited { retry_after } => {
                format!("Too many attempts, retry in {} seconds", retry_after.as_secs().max(1))
            }
            Self::Unavailable(_) => "Service temporarily unavailable".to_string(),
        }
    }

    /// Expired and missing sessions are treated identically at the boundary
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::SessionNotFound)
    }

    /// Retry hint in whole seconds, if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        }
    }
}

/// Log an error at a level matched to its category
pub fn log_error(context: &str, error: &CoreError) {
    match error {
        CoreError::Unavailable(_) => {
            tracing::error!(context = context, code = error.code(), error = %error, "Identity core failure");
        }
        CoreError::AuthenticationFailed { reason } => {
            tracing::info!(context = context, code = error.code(), reason = %reason, "Authentication rejected");
        }
        _ => {
            tracing::debug!(context = context, code = error.code(), error = %error, "Request rejected");
        }
    }
}
