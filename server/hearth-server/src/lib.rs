//! HTTP front end for the Hearth identity core
//!
//! A thin axum layer over [`auth_gateway::AuthGateway`]: handlers pull the
//! session token from the request, call the gateway, and map its errors to
//! `{ "error": { "code", "message" } }` bodies.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use auth_gateway::AuthGateway;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::{BootstrapAdmin, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use extractors::TrustedProxies;
pub use handlers::AppState;

/// Build the router with every route and the request tracing layer.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// client addresses come from the connection.
pub fn create_app(gateway: Arc<AuthGateway>, proxies: TrustedProxies) -> Router {
    routes::create_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { gateway, proxies })
}
