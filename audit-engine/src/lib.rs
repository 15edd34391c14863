//! Audit trail, throttling and attack detection for the Hearth identity core
//!
//! - [`AuditLogger`] writes append-only audit rows, inside a caller's
//!   transaction when one is open, and never lets a write failure surface
//! - [`RateLimiter`] keeps sliding windows per `(action, key)` and blocks keys
//!   that exceed their rule
//! - [`SecurityMonitor`] reads the audit history back to flag brute force,
//!   enumeration and credential stuffing
//!
//! # Example
//!
//! ```rust
//! use audit_engine::{RateAction, RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new(RateLimitConfig::default());
//! let key = limiter.key_for(RateAction::Login, Some("192.168.1.4"), None);
//! assert!(limiter.check(RateAction::Login, &key).is_allowed());
//! ```

pub mod config;
pub mod entry;
pub mod events;
pub mod logger;
pub mod monitor;
pub mod rate_limiter;

pub use config::*;
pub use entry::*;
pub use events::*;
pub use logger::*;
pub use monitor::*;
pub use rate_limiter::*;
