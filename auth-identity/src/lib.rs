//! Password and passcode authenticators for the Hearth identity core
//!
//! [`PasswordAuthenticator`] handles full passwords: bcrypt hashing, a
//! configurable strength policy, reuse history and a failure counter that
//! locks the account. [`PasscodeAuthenticator`] handles 4-8 digit quick
//! passcodes hashed with Argon2id, with weak-pattern rejection and a lockout
//! that grows with every failure past the threshold.
//!
//! Both write their counter updates and audit entries in one transaction.
//! Neither decides what the caller sees: the session layer collapses every
//! credential failure into one uniform error.
//!
//! # Example
//!
//! ```rust,no_run
//! use auth_identity::{NewPrincipal, PasswordAuthenticator, PasswordPolicy, PasswordVerification};
//! # async fn run(store: database_layer::CredentialStore, audit: audit_engine::AuditLogger)
//! #     -> Result<(), auth_identity::IdentityError> {
//! let passwords = PasswordAuthenticator::new(store, audit, PasswordPolicy::default());
//! let id = passwords
//!     .create(
//!         NewPrincipal {
//!             username: "alice".into(),
//!             email: "alice@example.com".into(),
//!             password: Some("Kettle-Drum-42".into()),
//!             role: None,
//!             settings: Default::default(),
//!         },
//!         None,
//!     )
//!     .await?;
//! assert!(matches!(
//!     passwords.verify(id, "Kettle-Drum-42").await?,
//!     PasswordVerification::Success { .. }
//! ));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hashing;
pub mod passcode;
pub mod password;
pub mod policy;

pub use config::*;
pub use error::*;
pub use hashing::{BcryptHasher, PasscodeHasher};
pub use passcode::*;
pub use password::*;
pub use policy::{validate_email, validate_username, PolicyViolation};
