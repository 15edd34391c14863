//! Common error handling for the Hearth identity core
//!
//! Every crate in the workspace keeps its own `thiserror` enum for internal
//! failures and converts into [`CoreError`] at the service boundary. The
//! boundary error carries just enough for the caller to react (retry-after
//! hints, unlock timestamps) and a stable machine code, while the specific
//! reason for an authentication failure stays in the audit trail.
//!
//! # Error Categories
//!
//! - **Validation**: malformed usernames, emails, passwords and passcodes,
//!   rejected before any store mutation
//! - **Authentication**: wrong or unknown credentials, collapsed into a single
//!   uniform message to prevent account enumeration
//! - **Lockout**: the principal is temporarily locked out
//! - **Session**: expired and missing sessions, both resolving to "re-authenticate"
//! - **Authorization**: permission denials with a diagnostic reason code
//! - **Throttling**: rate-limited requests with a retry hint
//! - **Availability**: the credential store failed during a primary write
//!
//! # Example
//!
//! ```rust
//! use error_common::{CoreError, FailureReason};
//!
//! let err = CoreError::authentication_failed(FailureReason::UnknownPrincipal);
//! assert_eq!(err.public_message(), "Invalid credentials");
//! assert_eq!(err.code(), error_common::codes::authentication::INVALID_CREDENTIALS);
//! ```

pub mod codes;
pub mod types;

pub use types::*;
