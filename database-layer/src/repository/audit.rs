//! Append-only audit log plus the aggregate queries the security monitor runs

use chrono::{DateTime, Utc};
use sqlx::{Executor, Row, Sqlite};

use crate::error::DatabaseResult;
use crate::models::{AuditLogEntry, NewAuditEntry};

pub async fn insert<'e, E>(executor: E, entry: &NewAuditEntry, at: DateTime<Utc>) -> DatabaseResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"INSERT INTO audit_log (principal_id, action, resource, result, ip_address, user_agent, details, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)
           RETURNING id"#,
    )
    .bind(entry.principal_id)
    .bind(&entry.action)
    .bind(&entry.resource)
    .bind(entry.result.as_str())
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(serde_json::to_string(&entry.details)?)
    .bind(at)
    .fetch_one(executor)
    .await?;
    Ok(row.try_get("id")?)
}

/// Newest entries first, optionally filtered by action
pub async fn recent<'e, E>(executor: E, action: Option<&str>, limit: u32) -> DatabaseResult<Vec<AuditLogEntry>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"SELECT id, principal_id, action, resource, result, ip_address, user_agent, details, created_at
           FROM audit_log
           WHERE (? IS NULL OR action = ?)
           ORDER BY id DESC LIMIT ?"#,
    )
    .bind(action)
    .bind(action)
    .bind(i64::from(limit))
    .fetch_all(executor)
    .await?;
    rows.iter().map(AuditLogEntry::from_row).collect()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// Failed attempts of the given actions from one ip since `since`
pub async fn count_failures_from_ip<'e, E>(
    executor: E,
    ip: &str,
    actions: &[&str],
    since: DateTime<Utc>,
) -> DatabaseResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if actions.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "SELECT COUNT(*) AS n FROM audit_log WHERE ip_address = ? AND result = 'failure' \
         AND action IN ({}) AND created_at >= ?",
        placeholders(actions.len())
    );
    let mut query = sqlx::query(&sql).bind(ip);
    for action in actions {
        query = query.bind(*action);
    }
    let row = query.bind(since).fetch_one(executor).await?;
    Ok(row.try_get("n")?)
}

/// Distinct targets probed with failing attempts from one ip since `since`
pub async fn count_distinct_targets_from_ip<'e, E>(
    executor: E,
    ip: &str,
    actions: &[&str],
    since: DateTime<Utc>,
) -> DatabaseResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if actions.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "SELECT COUNT(DISTINCT resource) AS n FROM audit_log WHERE ip_address = ? AND result = 'failure' \
         AND action IN ({}) AND resource IS NOT NULL AND created_at >= ?",
        placeholders(actions.len())
    );
    let mut query = sqlx::query(&sql).bind(ip);
    for action in actions {
        query = query.bind(*action);
    }
    let row = query.bind(since).fetch_one(executor).await?;
    Ok(row.try_get("n")?)
}

/// Distinct source ips failing against one target since `since`
pub async fn count_distinct_ips_for_target<'e, E>(
    executor: E,
    resource: &str,
    actions: &[&str],
    since: DateTime<Utc>,
) -> DatabaseResult<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if actions.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "SELECT COUNT(DISTINCT ip_address) AS n FROM audit_log WHERE resource = ? AND result = 'failure' \
         AND action IN ({}) AND ip_address IS NOT NULL AND created_at >= ?",
        placeholders(actions.len())
    );
    let mut query = sqlx::query(&sql).bind(resource);
    for action in actions {
        query = query.bind(*action);
    }
    let row = query.bind(since).fetch_one(executor).await?;
    Ok(row.try_get("n")?)
}

/// Retention policy: the only path that removes audit rows
pub async fn delete_older_than<'e, E>(executor: E, cutoff: DateTime<Utc>) -> DatabaseResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM audit_log WHERE created_at < ?")
        .bind(cutoff)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
