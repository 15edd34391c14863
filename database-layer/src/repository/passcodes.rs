//! Passcode credentials. Old passcodes stay as inactive rows for reuse checks.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;

use crate::error::DatabaseResult;
use crate::models::PasscodeCredential;

const PASSCODE_COLUMNS: &str = "id, principal_id, passcode_hash, salt, failed_attempts, max_attempts, \
     expires_at, is_active, last_used_at, created_at";

#[derive(Debug, Clone)]
pub struct NewPasscodeRecord {
    pub principal_id: Uuid,
    pub passcode_hash: String,
    pub salt: String,
    pub max_attempts: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn find_active<'e, E>(executor: E, principal_id: Uuid) -> DatabaseResult<Option<PasscodeCredential>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {PASSCODE_COLUMNS} FROM passcodes WHERE principal_id = ? AND is_active = 1"
    );
    let row = sqlx::query(&sql).bind(principal_id).fetch_optional(executor).await?;
    row.as_ref().map(PasscodeCredential::from_row).transpose()
}

/// Active passcode hashes of every other active principal
pub async fn other_active_hashes<'e, E>(executor: E, principal_id: Uuid) -> DatabaseResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"SELECT p.passcode_hash FROM passcodes p
           JOIN users u ON u.id = p.principal_id
           WHERE p.is_active = 1 AND u.is_active = 1 AND p.principal_id != ?"#,
    )
    .bind(principal_id)
    .fetch_all(executor)
    .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("passcode_hash").map_err(Into::into))
        .collect()
}

/// This principal's most recent passcode hashes, active or not, newest first
pub async fn recent_hashes<'e, E>(executor: E, principal_id: Uuid, limit: u32) -> DatabaseResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT passcode_hash FROM passcodes WHERE principal_id = ? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(principal_id)
    .bind(i64::from(limit))
    .fetch_all(executor)
    .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("passcode_hash").map_err(Into::into))
        .collect()
}

pub async fn deactivate_for_principal<'e, E>(executor: E, principal_id: Uuid) -> DatabaseResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE passcodes SET is_active = 0, updated_at = ? WHERE principal_id = ? AND is_active = 1",
    )
    .bind(Utc::now())
    .bind(principal_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert<'e, E>(executor: E, record: &NewPasscodeRecord) -> DatabaseResult<Uuid>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"INSERT INTO passcodes (id, principal_id, passcode_hash, salt, failed_attempts, max_attempts,
               expires_at, is_active, last_used_at, created_at, updated_at)
           VALUES (?, ?, ?, ?, 0, ?, ?, 1, NULL, ?, ?)"#,
    )
    .bind(id)
    .bind(record.principal_id)
    .bind(&record.passcode_hash)
    .bind(&record.salt)
    .bind(record.max_attempts)
    .bind(record.expires_at)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(id)
}

/// Count a failed attempt and stamp `last_used_at`; returns the new count
pub async fn record_failure<'e, E>(executor: E, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"UPDATE passcodes SET failed_attempts = failed_attempts + 1, last_used_at = ?, updated_at = ?
           WHERE id = ? RETURNING failed_attempts"#,
    )
    .bind(at)
    .bind(at)
    .bind(id)
    .fetch_one(executor)
    .await?;
    Ok(row.try_get("failed_attempts")?)
}

pub async fn record_success<'e, E>(executor: E, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE passcodes SET failed_attempts = 0, last_used_at = ?, updated_at = ? WHERE id = ?")
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn reset_attempts<'e, E>(executor: E, principal_id: Uuid) -> DatabaseResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE passcodes SET failed_attempts = 0, updated_at = ? WHERE principal_id = ? AND is_active = 1",
    )
    .bind(Utc::now())
    .bind(principal_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}
