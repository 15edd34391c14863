use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{admin, auth, health, AppState};

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health::health_check))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/sso", post(auth::sso_login))
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session))
        .route("/refresh", post(auth::refresh))
        .route("/escalate", post(auth::escalate))
        .route("/check", post(auth::check))
        .route("/password", post(auth::change_own_password))
        .route("/status/:principal_id", get(auth::status))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/principals", post(admin::register_principal))
        .route("/principals/:id/role", post(admin::assign_role))
        .route("/principals/:id/password", post(admin::change_password))
        .route("/principals/:id/password/reset", post(admin::reset_password))
        .route("/principals/:id/password/initial", post(admin::set_initial_password))
        .route("/principals/:id/unlock", post(admin::unlock_account))
        .route("/principals/:id/deactivate", post(admin::deactivate_principal))
        .route("/principals/:id/passcode", post(admin::set_passcode))
        .route("/principals/:id/passcode/disable", post(admin::disable_passcode))
        .route(
            "/principals/:id/passcode/reset-attempts",
            post(admin::reset_passcode_attempts),
        )
        .route("/principals/:id/sessions/revoke", post(admin::revoke_sessions))
        .route("/roles", post(admin::create_role))
        .route("/roles/:role/permissions/grant", post(admin::grant_permission))
        .route("/roles/:role/permissions/revoke", post(admin::revoke_permission))
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health_routes())
        .nest("/v1/auth", auth_routes())
        .nest("/v1/admin", admin_routes())
}
