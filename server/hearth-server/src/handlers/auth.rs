use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use auth_gateway::{AuthOutcome, AuthRequest, AuthStatus, FederatedLogin};
use chrono::{DateTime, Utc};
use database_layer::{AuthMethod, AuthSession, DeviceInfo, SessionType};
use error_common::CoreError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Gateway;
use crate::error::ApiResult;
use crate::extractors::{user_agent, ClientAddr, SessionToken};

/// A session as shown to its holder; the token itself is not echoed
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub principal_id: Uuid,
    pub session_type: SessionType,
    pub auth_method: AuthMethod,
    pub device: DeviceInfo,
    pub role_id: String,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
}

impl From<AuthSession> for SessionView {
    fn from(session: AuthSession) -> Self {
        Self {
            principal_id: session.principal_id,
            session_type: session.session_type,
            auth_method: session.auth_method,
            device: session.device,
            role_id: session.role_id,
            permissions: session.permissions,
            created_at: session.created_at,
            expires_at: session.expires_at,
            escalated_at: session.metadata.escalated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub requires_password_change: bool,
    pub session: SessionView,
}

impl From<AuthOutcome> for LoginResponse {
    fn from(outcome: AuthOutcome) -> Self {
        Self {
            token: outcome.session.id.clone(),
            requires_password_change: outcome.requires_password_change,
            session: outcome.session.into(),
        }
    }
}

pub async fn login(
    State(gateway): State<Gateway>,
    ClientAddr(client): ClientAddr,
    headers: HeaderMap,
    Json(mut request): Json<AuthRequest>,
) -> ApiResult<Json<LoginResponse>> {
    request.ip_address = client.map(|ip| ip.to_string());
    if request.user_agent.is_none() {
        request.user_agent = user_agent(&headers);
    }

    Ok(Json(gateway.authenticate(request).await?.into()))
}

/// Called by an SSO adapter with its own `sso.assert` session after it has
/// verified the provider's response. The body names the end user.
pub async fn sso_login(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    ClientAddr(client): ClientAddr,
    Json(mut login): Json<FederatedLogin>,
) -> ApiResult<Json<LoginResponse>> {
    if login.ip_address.is_none() {
        login.ip_address = client.map(|ip| ip.to_string());
    }
    Ok(Json(gateway.authenticate_federated(&token, login).await?.into()))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

pub async fn logout(State(gateway): State<Gateway>, SessionToken(token): SessionToken) -> ApiResult<Json<LogoutResponse>> {
    let logged_out = gateway.invalidate(&token).await?;
    Ok(Json(LogoutResponse { logged_out }))
}

pub async fn session(State(gateway): State<Gateway>, SessionToken(token): SessionToken) -> ApiResult<Json<SessionView>> {
    let session = gateway
        .validate(&token)
        .await?
        .ok_or(CoreError::SessionNotFound)?;
    Ok(Json(session.into()))
}

pub async fn refresh(State(gateway): State<Gateway>, SessionToken(token): SessionToken) -> ApiResult<Json<SessionView>> {
    Ok(Json(gateway.refresh(&token).await?.into()))
}

#[derive(Debug, Deserialize)]
pub struct EscalateRequest {
    pub password: SecretString,
}

#[derive(Debug, Serialize)]
pub struct EscalateResponse {
    pub escalated: bool,
}

pub async fn escalate(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Json(body): Json<EscalateRequest>,
) -> ApiResult<Json<EscalateResponse>> {
    let escalated = gateway
        .escalate(&token, body.password.expose_secret())
        .await?;
    Ok(Json(EscalateResponse { escalated }))
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub permission: String,
    #[serde(default)]
    pub resource_owner: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub granted: bool,
}

pub async fn check(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Json(body): Json<CheckRequest>,
) -> ApiResult<Json<CheckResponse>> {
    let granted = gateway
        .check_permission(&token, &body.permission, body.resource_owner)
        .await?;
    Ok(Json(CheckResponse { granted }))
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: SecretString,
    pub new_password: SecretString,
}

pub async fn change_own_password(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Json(body): Json<PasswordChangeRequest>,
) -> ApiResult<axum::http::StatusCode> {
    gateway
        .change_own_password(
            &token,
            body.current_password.expose_secret(),
            body.new_password.expose_secret(),
        )
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub principal_id: Uuid,
    pub status: AuthStatus,
}

/// Anyone may ask about themselves; asking about others takes `users.read`
pub async fn status(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal_id): Path<Uuid>,
) -> ApiResult<Json<StatusResponse>> {
    let caller = gateway
        .validate(&token)
        .await?
        .ok_or(CoreError::SessionNotFound)?;
    if caller.principal_id != principal_id {
        gateway.authorize(&token, "users.read").await?;
    }
    Ok(Json(StatusResponse {
        principal_id,
        status: gateway.get_auth_status(principal_id).await,
    }))
}
