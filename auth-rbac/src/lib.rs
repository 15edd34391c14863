//! Role-based permission engine for the Hearth identity core
//!
//! Every principal holds one role, and roles inherit from at most one parent.
//! A permission check resolves the role chain into a compiled matcher, then
//! applies two adjustments:
//!
//! - **Ownership**: `*.read` and `*.update` are granted on resources the
//!   principal owns, even without a matching role grant
//! - **Context**: a time window, a passcode session or a shared device can
//!   deny a permission the role would otherwise grant
//!
//! Resolved sets are cached per principal with a TTL and are invalidated
//! explicitly whenever roles or assignments change.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use auth_rbac::{AccessContext, InMemoryRoleDirectory, RbacConfig, RbacEngine};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), auth_rbac::RbacError> {
//! let directory = InMemoryRoleDirectory::seeded();
//! let admin = directory.add_principal("admin");
//! let engine = RbacEngine::new(Arc::new(directory), RbacConfig::default());
//!
//! let decision = engine.check(admin, "calendar.delete", &AccessContext::default()).await?;
//! assert!(decision.granted);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod directory;
pub mod engine;
pub mod error;
pub mod models;
pub mod permission;
pub mod resolver;

pub use cache::{EffectivePermissions, PermissionCache};
pub use config::*;
pub use directory::{InMemoryRoleDirectory, RoleDirectory, StoreRoleDirectory};
pub use engine::RbacEngine;
pub use error::*;
pub use models::*;
pub use permission::{Permission, PermissionMatch, PermissionMatcher};
