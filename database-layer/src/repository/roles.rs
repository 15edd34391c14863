//! Roles and their ordered permission lists

use chrono::Utc;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};

use crate::error::DatabaseResult;
use crate::models::Role;

/// Load one role together with its permissions in grant order
pub async fn find(conn: &mut SqliteConnection, id: &str) -> DatabaseResult<Option<Role>> {
    let Some(row) = sqlx::query(
        "SELECT id, display_name, inherits_from, is_system, created_at FROM roles WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let permissions = permissions_of(&mut *conn, id).await?;
    Ok(Some(Role {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        permissions,
        inherits_from: row.try_get("inherits_from")?,
        is_system: row.try_get("is_system")?,
        created_at: row.try_get("created_at")?,
    }))
}

pub async fn exists<'e, E>(executor: E, id: &str) -> DatabaseResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT COUNT(*) AS n FROM roles WHERE id = ?")
        .bind(id)
        .fetch_one(executor)
        .await?;
    let n: i64 = row.try_get("n")?;
    Ok(n > 0)
}

pub async fn list_ids<'e, E>(executor: E) -> DatabaseResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT id FROM roles ORDER BY id").fetch_all(executor).await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("id").map_err(Into::into))
        .collect()
}

async fn permissions_of(conn: &mut SqliteConnection, role_id: &str) -> DatabaseResult<Vec<String>> {
    let rows = sqlx::query(
        "SELECT permission FROM role_permissions WHERE role_id = ? ORDER BY position, permission",
    )
    .bind(role_id)
    .fetch_all(conn)
    .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("permission").map_err(Into::into))
        .collect()
}

/// Insert a custom role and its permissions. Grammar checks happen upstream.
pub async fn insert(
    conn: &mut SqliteConnection,
    id: &str,
    display_name: &str,
    inherits_from: Option<&str>,
    permissions: &[String],
) -> DatabaseResult<()> {
    let now = Utc::now();
    sqlx::query(
        r#"INSERT INTO roles (id, display_name, inherits_from, is_system, created_at, updated_at)
           VALUES (?, ?, ?, 0, ?, ?)"#,
    )
    .bind(id)
    .bind(display_name)
    .bind(inherits_from)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    for permission in permissions {
        add_permission(&mut *conn, id, permission).await?;
    }
    Ok(())
}

/// Append a permission to the end of the role's list; no-op if already held
pub async fn add_permission(
    conn: &mut SqliteConnection,
    role_id: &str,
    permission: &str,
) -> DatabaseResult<bool> {
    sqlx::query("INSERT OR IGNORE INTO permissions (name, created_at) VALUES (?, ?)")
        .bind(permission)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query(
        r#"INSERT OR IGNORE INTO role_permissions (role_id, permission, position)
           VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1 FROM role_permissions WHERE role_id = ?1))"#,
    )
    .bind(role_id)
    .bind(permission)
    .execute(&mut *conn)
    .await?;

    touch(&mut *conn, role_id).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_permission(
    conn: &mut SqliteConnection,
    role_id: &str,
    permission: &str,
) -> DatabaseResult<bool> {
    let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission = ?")
        .bind(role_id)
        .bind(permission)
        .execute(&mut *conn)
        .await?;
    touch(&mut *conn, role_id).await?;
    Ok(result.rows_affected() > 0)
}

async fn touch(conn: &mut SqliteConnection, role_id: &str) -> DatabaseResult<()> {
    sqlx::query("UPDATE roles SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(role_id)
        .execute(conn)
        .await?;
    Ok(())
}
