//! Configuration loading for the Hearth identity core
//!
//! Each crate owns its configuration struct (serde defaults plus a `Default`
//! impl). This crate stacks those defaults with an optional file and
//! environment overrides, and hosts the serde adapters they share.
//!
//! # Example
//!
//! ```rust,no_run
//! use config_engine::ConfigLoader;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Default)]
//! #[serde(default)]
//! struct AppConfig {
//!     database_url: String,
//! }
//!
//! let config: AppConfig = ConfigLoader::new()
//!     .with_file("hearth.toml", false)
//!     .with_env_prefix("HEARTH")
//!     .load()?;
//! # Ok::<(), config_engine::ConfigError>(())
//! ```

pub mod error;
pub mod loader;
pub mod serde_helpers;

pub use error::*;
pub use loader::*;
pub use serde_helpers::{duration_secs, option_duration_secs};
