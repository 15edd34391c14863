//! Schema creation and default-role seeding.
//!
//! Every statement is idempotent, so running this at each startup is safe.

use chrono::Utc;
use tracing::{debug, info};

use crate::connection::CredentialStore;
use crate::error::{DatabaseError, DatabaseResult};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS roles (
        id              TEXT PRIMARY KEY,
        display_name    TEXT NOT NULL,
        inherits_from   TEXT REFERENCES roles(id),
        is_system       INTEGER NOT NULL DEFAULT 0,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS permissions (
        name        TEXT PRIMARY KEY,
        created_at  TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS role_permissions (
        role_id     TEXT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission  TEXT NOT NULL REFERENCES permissions(name),
        position    INTEGER NOT NULL,
        PRIMARY KEY (role_id, permission)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users (
        id                          BLOB PRIMARY KEY,
        username                    TEXT NOT NULL,
        email                       TEXT NOT NULL,
        password_hash               TEXT,
        role_id                     TEXT NOT NULL REFERENCES roles(id),
        is_active                   INTEGER NOT NULL DEFAULT 1,
        is_verified                 INTEGER NOT NULL DEFAULT 0,
        failed_password_attempts    INTEGER NOT NULL DEFAULT 0,
        locked_until                TEXT,
        password_changed_at         TEXT,
        must_change_password        INTEGER NOT NULL DEFAULT 0,
        settings                    TEXT NOT NULL DEFAULT '{}',
        created_at                  TEXT NOT NULL,
        updated_at                  TEXT NOT NULL
    )"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username_active ON users(username COLLATE NOCASE) WHERE is_active = 1",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_active ON users(email COLLATE NOCASE) WHERE is_active = 1",
    "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role_id)",
    r#"CREATE TABLE IF NOT EXISTS password_history (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        principal_id    BLOB NOT NULL REFERENCES users(id),
        password_hash   TEXT NOT NULL,
        created_at      TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_password_history_principal ON password_history(principal_id, id)",
    r#"CREATE TABLE IF NOT EXISTS passcodes (
        id              BLOB PRIMARY KEY,
        principal_id    BLOB NOT NULL REFERENCES users(id),
        passcode_hash   TEXT NOT NULL,
        salt            TEXT NOT NULL,
        failed_attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts    INTEGER NOT NULL,
        expires_at      TEXT,
        is_active       INTEGER NOT NULL DEFAULT 1,
        last_used_at    TEXT,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    )"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_passcodes_active_principal ON passcodes(principal_id) WHERE is_active = 1",
    "CREATE INDEX IF NOT EXISTS idx_passcodes_principal_created ON passcodes(principal_id, created_at)",
    r#"CREATE TABLE IF NOT EXISTS sessions (
        id                  TEXT PRIMARY KEY,
        principal_id        BLOB NOT NULL REFERENCES users(id),
        session_type        TEXT NOT NULL,
        auth_method         TEXT NOT NULL,
        device              TEXT NOT NULL,
        created_at          TEXT NOT NULL,
        last_activity_at    TEXT NOT NULL,
        expires_at          TEXT NOT NULL,
        is_active           INTEGER NOT NULL DEFAULT 1,
        permissions         TEXT NOT NULL,
        role_id             TEXT NOT NULL,
        metadata            TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_principal ON sessions(principal_id, session_type)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at)",
    r#"CREATE TABLE IF NOT EXISTS audit_log (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        principal_id    BLOB,
        action          TEXT NOT NULL,
        resource        TEXT,
        result          TEXT NOT NULL,
        ip_address      TEXT,
        user_agent      TEXT,
        details         TEXT NOT NULL DEFAULT '{}',
        created_at      TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_log(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_audit_ip ON audit_log(ip_address, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_audit_resource ON audit_log(resource, created_at)",
];

/// A role seeded on first start. System roles cannot be edited later.
pub struct SeedRole {
    pub id: &'static str,
    pub display_name: &'static str,
    pub inherits_from: Option<&'static str>,
    pub permissions: &'static [&'static str],
}

/// Parents come before children so the foreign key always resolves
pub const DEFAULT_ROLES: &[SeedRole] = &[
    SeedRole {
        id: "guest",
        display_name: "Guest",
        inherits_from: None,
        permissions: &["profile.read", "calendar.read", "lists.read", "music.play"],
    },
    SeedRole {
        id: "child",
        display_name: "Child",
        inherits_from: Some("guest"),
        permissions: &["tasks.read", "tasks.complete", "lists.update", "music.*"],
    },
    SeedRole {
        id: "member",
        display_name: "Household Member",
        inherits_from: Some("child"),
        permissions: &[
            "profile.update",
            "calendar.*",
            "tasks.*",
            "lists.*",
            "home.*",
        ],
    },
    SeedRole {
        id: "parent",
        display_name: "Parent",
        inherits_from: Some("member"),
        permissions: &[
            "family.*",
            "users.read",
            "users.update",
            "users.unlock",
            "passcodes.reset",
            "passcodes.manage",
            "sessions.revoke",
        ],
    },
    SeedRole {
        id: "admin",
        display_name: "Administrator",
        inherits_from: None,
        permissions: &["*"],
    },
    SeedRole {
        id: "service",
        display_name: "Service Account",
        inherits_from: None,
        permissions: &["api.*", "sso.assert", "calendar.read", "tasks.read", "lists.read"],
    },
];

/// Role assigned when a principal is created without one
pub const DEFAULT_PRINCIPAL_ROLE: &str = "member";

/// Create tables and indexes, then seed system roles
pub async fn run_migrations(store: &CredentialStore) -> DatabaseResult<()> {
    let mut tx = store.begin().await?;

    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
    }

    let now = Utc::now();
    let mut seeded = 0u64;
    for role in DEFAULT_ROLES {
        let inserted = sqlx::query(
            r#"INSERT OR IGNORE INTO roles (id, display_name, inherits_from, is_system, created_at, updated_at)
               VALUES (?, ?, ?, 1, ?, ?)"#,
        )
        .bind(role.id)
        .bind(role.display_name)
        .bind(role.inherits_from)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| DatabaseError::MigrationError(e.to_string()))?
        .rows_affected();

        if inserted == 0 {
            continue;
        }
        seeded += 1;

        for (position, permission) in role.permissions.iter().enumerate() {
            sqlx::query("INSERT OR IGNORE INTO permissions (name, created_at) VALUES (?, ?)")
                .bind(*permission)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;

            sqlx::query(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission, position) VALUES (?, ?, ?)",
            )
            .bind(role.id)
            .bind(*permission)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
        }
        debug!(role = role.id, "Seeded system role");
    }

    tx.commit().await?;
    info!(seeded_roles = seeded, "Credential store schema is up to date");
    Ok(())
}
