use chrono::{DateTime, Utc};
use database_layer::DatabaseError;
use error_common::{CoreError, FailureReason};
use thiserror::Error;

use crate::policy::PolicyViolation;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password does not meet policy: {}", join_violations(.0))]
    WeakPassword(Vec<PolicyViolation>),

    #[error("Invalid passcode: {0}")]
    InvalidPasscode(String),

    #[error("Username or email already in use")]
    IdentityTaken,

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Password was used recently")]
    PasswordReused,

    #[error("Passcode was used recently")]
    PasscodeReused,

    #[error("Passcode is already in use")]
    PasscodeNotUnique,

    #[error("Principal already has a password")]
    PasswordAlreadySet,

    #[error("Principal not found")]
    PrincipalNotFound,

    #[error("Principal is inactive")]
    PrincipalInactive,

    #[error("Invalid credentials ({0})")]
    InvalidCredentials(FailureReason),

    #[error("Account locked until {0}")]
    Locked(DateTime<Utc>),

    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

fn join_violations(violations: &[PolicyViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

impl From<IdentityError> for CoreError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidUsername(_)
            | IdentityError::InvalidEmail
            | IdentityError::WeakPassword(_)
            | IdentityError::InvalidPasscode(_)
            | IdentityError::IdentityTaken
            | IdentityError::UnknownRole(_)
            | IdentityError::PasswordReused
            | IdentityError::PasscodeReused
            | IdentityError::PasscodeNotUnique
            | IdentityError::PasswordAlreadySet => CoreError::validation(err.to_string()),
            IdentityError::PrincipalNotFound => {
                CoreError::authentication_failed(FailureReason::UnknownPrincipal)
            }
            IdentityError::PrincipalInactive => {
                CoreError::authentication_failed(FailureReason::InactivePrincipal)
            }
            IdentityError::InvalidCredentials(reason) => CoreError::authentication_failed(reason),
            IdentityError::Locked(locked_until) => CoreError::AccountLocked { locked_until },
            IdentityError::Hashing(_) | IdentityError::Database(_) => CoreError::unavailable(err),
        }
    }
}
