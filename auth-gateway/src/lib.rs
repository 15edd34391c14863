//! Session manager and service façade for the Hearth identity core
//!
//! [`AuthGateway`] is built once at startup and shared as `Arc<AuthGateway>`.
//! It ties together:
//!
//! - the password and passcode authenticators (`auth-identity`)
//! - the role-based permission engine (`auth-rbac`)
//! - the rate limiter, security monitor and audit log (`audit-engine`)
//! - durable sessions with an in-process index ([`SessionManager`])
//!
//! A login picks a session tier from the credential kind. Each tier has its
//! own lifetime, concurrency cap and set of permission prefixes that are
//! withheld until the session is escalated with a password.
//!
//! # Example
//!
//! ```rust,no_run
//! use auth_gateway::{AuthGateway, AuthRequest, Credentials, GatewayConfig, PrincipalRef};
//! use database_layer::{CredentialStore, DatabaseConfig};
//! use logger_redacted::PiiRedactor;
//! use secrecy::SecretString;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CredentialStore::open(&DatabaseConfig::for_path(std::path::Path::new("hearth.db"))).await?;
//! let gateway = AuthGateway::new(store, GatewayConfig::default(), PiiRedactor::default())?;
//!
//! let outcome = gateway
//!     .authenticate(AuthRequest::new(
//!         PrincipalRef::Username("alice".into()),
//!         Credentials::Password { password: SecretString::new("Kettle-Drum-42".into()) },
//!     ))
//!     .await?;
//! assert!(gateway.check_permission(&outcome.session.id, "profile.read", None).await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod models;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod token;

pub use config::*;
pub use models::*;
pub use scheduler::BackgroundTasks;
pub use service::AuthGateway;
pub use session::{GatewayError, GatewayResult, SessionManager};
pub use token::{extract_session_token, mint_session_token, SESSION_TOKEN_HEADER};
