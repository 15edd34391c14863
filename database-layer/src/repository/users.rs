//! Principal rows and password history

use chrono::{DateTime, Utc};
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::error::DatabaseResult;
use crate::models::{NewPrincipalRecord, Principal};

const PRINCIPAL_COLUMNS: &str = "id, username, email, password_hash, role_id, is_active, is_verified, \
     failed_password_attempts, locked_until, password_changed_at, must_change_password, settings, \
     created_at, updated_at";

/// Counter state after a failed password attempt was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureState {
    pub failed_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
}

pub async fn insert(conn: &mut SqliteConnection, record: &NewPrincipalRecord) -> DatabaseResult<()> {
    let now = Utc::now();
    let settings = serde_json::to_string(&record.settings)?;
    let password_changed_at = record.password_hash.as_ref().map(|_| now);

    sqlx::query(
        r#"INSERT INTO users (id, username, email, password_hash, role_id, is_active, is_verified,
               failed_password_attempts, locked_until, password_changed_at, must_change_password,
               settings, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, 1, ?, 0, NULL, ?, 0, ?, ?, ?)"#,
    )
    .bind(record.id)
    .bind(&record.username)
    .bind(&record.email)
    .bind(&record.password_hash)
    .bind(&record.role_id)
    .bind(record.is_verified)
    .bind(password_changed_at)
    .bind(settings)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if let Some(hash) = &record.password_hash {
        insert_password_history(&mut *conn, record.id, hash).await?;
    }
    Ok(())
}

pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> DatabaseResult<Option<Principal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    row.as_ref().map(Principal::from_row).transpose()
}

/// Active principal by username, case-insensitive
pub async fn find_by_username<'e, E>(executor: E, username: &str) -> DatabaseResult<Option<Principal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE username = ? COLLATE NOCASE AND is_active = 1"
    );
    let row = sqlx::query(&sql).bind(username).fetch_optional(executor).await?;
    row.as_ref().map(Principal::from_row).transpose()
}

/// Whether an active principal other than `exclude` already uses the username or email
pub async fn identity_taken<'e, E>(
    executor: E,
    username: &str,
    email: &str,
    exclude: Option<Uuid>,
) -> DatabaseResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT COUNT(*) AS taken FROM users
           WHERE is_active = 1
             AND (username = ? COLLATE NOCASE OR email = ? COLLATE NOCASE)
             AND (? IS NULL OR id != ?)"#,
    )
    .bind(username)
    .bind(email)
    .bind(exclude)
    .bind(exclude)
    .fetch_one(executor)
    .await?;
    let taken: i64 = row.try_get("taken")?;
    Ok(taken > 0)
}

pub async fn count<'e, E>(executor: E) -> DatabaseResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT COUNT(*) AS n FROM users").fetch_one(executor).await?;
    Ok(row.try_get("n")?)
}

/// Increment the failed-attempt counter in a single statement.
///
/// When the new count reaches `threshold` the lock is applied and the
/// counter starts over, so the next window gets a fresh set of attempts.
pub async fn record_password_failure<'e, E>(
    executor: E,
    id: Uuid,
    threshold: i64,
    lock_until: DateTime<Utc>,
) -> DatabaseResult<FailureState>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    let row = sqlx::query(
        r#"UPDATE users SET
               locked_until = CASE WHEN failed_password_attempts + 1 >= ?1 THEN ?2 ELSE locked_until END,
               failed_password_attempts = CASE WHEN failed_password_attempts + 1 >= ?1 THEN 0
                                               ELSE failed_password_attempts + 1 END,
               updated_at = ?3
           WHERE id = ?4
           RETURNING failed_password_attempts, locked_until"#,
    )
    .bind(threshold)
    .bind(lock_until)
    .bind(now)
    .bind(id)
    .fetch_one(executor)
    .await?;

    let locked: Option<DateTime<Utc>> = row.try_get("locked_until")?;
    let failed_attempts: i64 = row.try_get("failed_password_attempts")?;
    Ok(FailureState {
        // A stale lock from an earlier window is not a new lock
        failed_attempts,
        locked_until: locked.filter(|until| *until > now),
    })
}

/// Clear the counter and any lock
pub async fn clear_password_failures<'e, E>(executor: E, id: Uuid) -> DatabaseResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE users SET failed_password_attempts = 0, locked_until = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace the password hash and record it in history
pub async fn update_password(
    conn: &mut SqliteConnection,
    id: Uuid,
    password_hash: &str,
    must_change: bool,
) -> DatabaseResult<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"UPDATE users SET password_hash = ?, password_changed_at = ?, must_change_password = ?,
               failed_password_attempts = 0, locked_until = NULL, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(password_hash)
    .bind(now)
    .bind(must_change)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }
    insert_password_history(&mut *conn, id, password_hash).await?;
    Ok(true)
}

pub async fn update_role<'e, E>(executor: E, id: Uuid, role_id: &str) -> DatabaseResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE users SET role_id = ?, updated_at = ? WHERE id = ?")
        .bind(role_id)
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Soft-disable or re-enable a principal; rows are never hard-deleted
pub async fn set_active<'e, E>(executor: E, id: Uuid, active: bool) -> DatabaseResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_password_history(
    conn: &mut SqliteConnection,
    id: Uuid,
    password_hash: &str,
) -> DatabaseResult<()> {
    sqlx::query("INSERT INTO password_history (principal_id, password_hash, created_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}

/// Most recent password hashes, newest first
pub async fn recent_password_hashes<'e, E>(
    executor: E,
    id: Uuid,
    limit: u32,
) -> DatabaseResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT password_hash FROM password_history WHERE principal_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(id)
    .bind(i64::from(limit))
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("password_hash").map_err(Into::into))
        .collect()
}
