//! Credential store for the Hearth identity core
//!
//! The only crate that talks to durable storage. It holds principals, roles,
//! the permission catalog, passcodes, sessions and the audit log in SQLite,
//! and carries no business rules: lockout thresholds, password policy and
//! permission matching all live in the crates above it.
//!
//! # Key Features
//!
//! - **Write-ahead journaling**: many concurrent readers, one serialized writer
//! - **Foreign keys enforced** on every pooled connection
//! - **Idempotent schema**: `CREATE TABLE IF NOT EXISTS` plus system-role seeding
//! - **Transaction-friendly statements**: single-statement helpers accept the
//!   pool or an open transaction, so a counter update and its audit row commit
//!   together
//!
//! # Example
//!
//! ```rust,no_run
//! use database_layer::{CredentialStore, DatabaseConfig, repository::users};
//!
//! # async fn run() -> Result<(), database_layer::DatabaseError> {
//! let store = CredentialStore::open(&DatabaseConfig::default()).await?;
//! let alice = users::find_by_username(store.pool(), "alice").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod models;
pub mod repository;
pub mod schema;

pub use config::*;
pub use connection::*;
pub use error::*;
pub use models::*;
pub use schema::{run_migrations, DEFAULT_PRINCIPAL_ROLE, DEFAULT_ROLES};

pub use sqlx::{Sqlite, SqliteConnection, Transaction};
