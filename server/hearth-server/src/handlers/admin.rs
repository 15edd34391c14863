//! Household administration. Each handler passes the caller's token to the
//! gateway, which checks the permission the operation needs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use auth_identity::NewPrincipal;
use auth_rbac::NewRole;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Gateway;
use crate::error::ApiResult;
use crate::extractors::SessionToken;

#[derive(Debug, Serialize)]
pub struct CreatedPrincipal {
    pub id: Uuid,
}

pub async fn register_principal(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Json(body): Json<NewPrincipal>,
) -> ApiResult<(StatusCode, Json<CreatedPrincipal>)> {
    let id = gateway.register_principal(&token, body).await?;
    Ok((StatusCode::CREATED, Json(CreatedPrincipal { id })))
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

pub async fn assign_role(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
    Json(body): Json<AssignRoleRequest>,
) -> ApiResult<StatusCode> {
    gateway.assign_role(&token, principal, &body.role).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct TemporaryPassword {
    pub temporary_password: String,
}

pub async fn reset_password(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
) -> ApiResult<Json<TemporaryPassword>> {
    let temporary = gateway.reset_password(&token, principal).await?;
    Ok(Json(TemporaryPassword {
        temporary_password: temporary.expose_secret().clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password: SecretString,
}

pub async fn change_password(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
    Json(body): Json<SetPasswordRequest>,
) -> ApiResult<StatusCode> {
    gateway
        .change_password(&token, principal, body.password.expose_secret())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// First password for a principal that only had a passcode
pub async fn set_initial_password(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
    Json(body): Json<SetPasswordRequest>,
) -> ApiResult<StatusCode> {
    gateway
        .set_initial_password(&token, principal, body.password.expose_secret())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unlock_account(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
) -> ApiResult<StatusCode> {
    gateway.unlock_account(&token, principal).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ResetAttemptsResponse {
    pub reset: bool,
}

pub async fn reset_passcode_attempts(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
) -> ApiResult<Json<ResetAttemptsResponse>> {
    let reset = gateway.reset_passcode_attempts(&token, principal).await?;
    Ok(Json(ResetAttemptsResponse { reset }))
}

#[derive(Debug, Deserialize)]
pub struct SetPasscodeRequest {
    pub passcode: SecretString,
}

pub async fn set_passcode(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
    Json(body): Json<SetPasscodeRequest>,
) -> ApiResult<StatusCode> {
    gateway
        .set_passcode(&token, principal, body.passcode.expose_secret())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct DisabledPasscode {
    pub disabled: bool,
}

pub async fn disable_passcode(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
) -> ApiResult<Json<DisabledPasscode>> {
    let disabled = gateway.disable_passcode(&token, principal).await?;
    Ok(Json(DisabledPasscode { disabled }))
}

#[derive(Debug, Serialize)]
pub struct RevokedSessions {
    pub revoked: usize,
}

pub async fn revoke_sessions(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
) -> ApiResult<Json<RevokedSessions>> {
    let revoked = gateway.revoke_principal_sessions(&token, principal).await?;
    Ok(Json(RevokedSessions { revoked }))
}

pub async fn deactivate_principal(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(principal): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if gateway.deactivate_principal(&token, principal).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

pub async fn create_role(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Json(body): Json<NewRole>,
) -> ApiResult<StatusCode> {
    gateway.create_role(&token, body).await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub permission: String,
}

#[derive(Debug, Serialize)]
pub struct PermissionChange {
    pub changed: bool,
}

pub async fn grant_permission(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(role): Path<String>,
    Json(body): Json<PermissionRequest>,
) -> ApiResult<Json<PermissionChange>> {
    let changed = gateway
        .grant_permission(&token, &role, &body.permission)
        .await?;
    Ok(Json(PermissionChange { changed }))
}

pub async fn revoke_permission(
    State(gateway): State<Gateway>,
    SessionToken(token): SessionToken,
    Path(role): Path<String>,
    Json(body): Json<PermissionRequest>,
) -> ApiResult<Json<PermissionChange>> {
    let changed = gateway
        .revoke_permission(&token, &role, &body.permission)
        .await?;
    Ok(Json(PermissionChange { changed }))
}
