pub mod admin;
pub mod auth;
pub mod health;

use std::sync::Arc;

use auth_gateway::AuthGateway;
use axum::extract::FromRef;

use crate::extractors::TrustedProxies;

pub type Gateway = Arc<AuthGateway>;

/// Router state shared by every handler
#[derive(Clone, FromRef)]
pub struct AppState {
    pub gateway: Gateway,
    pub proxies: TrustedProxies,
}
