use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Gateway;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: bool,
    pub timestamp: DateTime<Utc>,
}

pub async fn health_check(State(gateway): State<Gateway>) -> (StatusCode, Json<HealthResponse>) {
    let store = gateway.is_healthy().await;
    let (status, code) = if store {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            store,
            timestamp: Utc::now(),
        }),
    )
}
