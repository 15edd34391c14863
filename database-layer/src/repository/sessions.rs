//! Durable session rows

use chrono::{DateTime, Utc};
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;

use crate::error::DatabaseResult;
use crate::models::{AuthSession, SessionMetadata, SessionType};

const SESSION_COLUMNS: &str = "id, principal_id, session_type, auth_method, device, created_at, \
     last_activity_at, expires_at, is_active, permissions, role_id, metadata";

pub async fn insert<'e, E>(executor: E, session: &AuthSession) -> DatabaseResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO sessions (id, principal_id, session_type, auth_method, device, created_at,
               last_activity_at, expires_at, is_active, permissions, role_id, metadata)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&session.id)
    .bind(session.principal_id)
    .bind(session.session_type.as_str())
    .bind(session.auth_method.as_str())
    .bind(serde_json::to_string(&session.device)?)
    .bind(session.created_at)
    .bind(session.last_activity_at)
    .bind(session.expires_at)
    .bind(session.is_active)
    .bind(serde_json::to_string(&session.permissions)?)
    .bind(&session.role_id)
    .bind(serde_json::to_string(&session.metadata)?)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find<'e, E>(executor: E, id: &str) -> DatabaseResult<Option<AuthSession>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    row.as_ref().map(AuthSession::from_row).transpose()
}

pub async fn list_for_principal<'e, E>(executor: E, principal_id: Uuid) -> DatabaseResult<Vec<AuthSession>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE principal_id = ? ORDER BY created_at DESC"
    );
    let rows = sqlx::query(&sql).bind(principal_id).fetch_all(executor).await?;
    rows.iter().map(AuthSession::from_row).collect()
}

/// Sessions of one type that are still valid at `now`
pub async fn count_valid<'e, E>(
    executor: E,
    principal_id: Uuid,
    session_type: SessionType,
    now: DateTime<Utc>,
) -> DatabaseResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT COUNT(*) AS n FROM sessions
           WHERE principal_id = ? AND session_type = ? AND is_active = 1 AND expires_at > ?"#,
    )
    .bind(principal_id)
    .bind(session_type.as_str())
    .bind(now)
    .fetch_one(executor)
    .await?;
    Ok(row.try_get("n")?)
}

/// Move expiry forward. The `MAX` keeps `expires_at` from ever going backwards.
pub async fn extend<'e, E>(
    executor: E,
    id: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DatabaseResult<Option<DateTime<Utc>>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"UPDATE sessions SET expires_at = MAX(expires_at, ?), last_activity_at = ?
           WHERE id = ? AND is_active = 1 AND expires_at > ?
           RETURNING expires_at"#,
    )
    .bind(expires_at)
    .bind(now)
    .bind(id)
    .bind(now)
    .fetch_optional(executor)
    .await?;
    row.map(|r| r.try_get("expires_at").map_err(Into::into)).transpose()
}

/// Upgrade a session's tier in place, keeping its id
pub async fn escalate<'e, E>(
    executor: E,
    id: &str,
    session_type: SessionType,
    expires_at: DateTime<Utc>,
    metadata: &SessionMetadata,
    now: DateTime<Utc>,
) -> DatabaseResult<Option<DateTime<Utc>>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"UPDATE sessions SET session_type = ?, expires_at = MAX(expires_at, ?), metadata = ?,
               last_activity_at = ?
           WHERE id = ? AND is_active = 1 AND expires_at > ?
           RETURNING expires_at"#,
    )
    .bind(session_type.as_str())
    .bind(expires_at)
    .bind(serde_json::to_string(metadata)?)
    .bind(now)
    .bind(id)
    .bind(now)
    .fetch_optional(executor)
    .await?;
    row.map(|r| r.try_get("expires_at").map_err(Into::into)).transpose()
}

pub async fn deactivate<'e, E>(executor: E, id: &str) -> DatabaseResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE sessions SET is_active = 0 WHERE id = ? AND is_active = 1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deactivate every session of a principal; returns the affected ids
pub async fn deactivate_for_principal<'e, E>(executor: E, principal_id: Uuid) -> DatabaseResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "UPDATE sessions SET is_active = 0 WHERE principal_id = ? AND is_active = 1 RETURNING id",
    )
    .bind(principal_id)
    .fetch_all(executor)
    .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("id").map_err(Into::into))
        .collect()
}

/// Remove expired or revoked rows; returns the removed ids
pub async fn delete_expired<'e, E>(executor: E, now: DateTime<Utc>) -> DatabaseResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("DELETE FROM sessions WHERE expires_at <= ? OR is_active = 0 RETURNING id")
        .bind(now)
        .fetch_all(executor)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("id").map_err(Into::into))
        .collect()
}

pub async fn delete<'e, E>(executor: E, id: &str) -> DatabaseResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
