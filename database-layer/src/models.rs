use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseResult};

/// Open-ended principal settings, stored as a JSON object
pub type Settings = BTreeMap<String, JsonValue>;

/// An authenticable identity (household member or service account)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role_id: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub failed_password_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub must_change_password: bool,
    pub settings: Settings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub(crate) fn from_row(row: &SqliteRow) -> DatabaseResult<Self> {
        let settings: String = row.try_get("settings")?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role_id: row.try_get("role_id")?,
            is_active: row.try_get("is_active")?,
            is_verified: row.try_get("is_verified")?,
            failed_password_attempts: row.try_get("failed_password_attempts")?,
            locked_until: row.try_get("locked_until")?,
            password_changed_at: row.try_get("password_changed_at")?,
            must_change_password: row.try_get("must_change_password")?,
            settings: serde_json::from_str(&settings)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Input for inserting a principal; hashing happens before this point
#[derive(Debug, Clone)]
pub struct NewPrincipalRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role_id: String,
    pub is_verified: bool,
    pub settings: Settings,
}

/// A named bundle of permissions with optional single-parent inheritance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub display_name: String,
    /// Declared permissions in grant order
    pub permissions: Vec<String>,
    pub inherits_from: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasscodeCredential {
    pub id: Uuid,
    pub principal_id: Uuid,
    #[serde(skip_serializing)]
    pub passcode_hash: String,
    #[serde(skip_serializing)]
    pub salt: String,
    pub failed_attempts: i64,
    pub max_attempts: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasscodeCredential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub(crate) fn from_row(row: &SqliteRow) -> DatabaseResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            principal_id: row.try_get("principal_id")?,
            passcode_hash: row.try_get("passcode_hash")?,
            salt: row.try_get("salt")?,
            failed_attempts: row.try_get("failed_attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            expires_at: row.try_get("expires_at")?,
            is_active: row.try_get("is_active")?,
            last_used_at: row.try_get("last_used_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(DatabaseError::CorruptRow(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

/// Trust tier of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Full password session
    Standard,
    /// Quick numeric passcode session
    Passcode,
    Guest,
    /// Service / API session
    Api,
    /// Federated login session
    Sso,
}

string_enum!(SessionType {
    Standard => "standard",
    Passcode => "passcode",
    Guest => "guest",
    Api => "api",
    Sso => "sso",
});

impl SessionType {
    pub const ALL: [SessionType; 5] = [
        SessionType::Standard,
        SessionType::Passcode,
        SessionType::Guest,
        SessionType::Api,
        SessionType::Sso,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    Passcode,
    Guest,
    ApiKey,
    Federated,
}

string_enum!(AuthMethod {
    Password => "password",
    Passcode => "passcode",
    Guest => "guest",
    ApiKey => "api_key",
    Federated => "federated",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Phone,
    Tablet,
    Desktop,
    /// Wall-mounted shared household panel
    TouchPanel,
    SmartSpeaker,
    Server,
    #[default]
    Unknown,
}

string_enum!(DeviceType {
    Phone => "phone",
    Tablet => "tablet",
    Desktop => "desktop",
    TouchPanel => "touch_panel",
    SmartSpeaker => "smart_speaker",
    Server => "server",
    Unknown => "unknown",
});

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl DeviceInfo {
    pub fn of_type(device_type: DeviceType) -> Self {
        Self {
            device_type,
            ..Self::default()
        }
    }
}

/// Session metadata; `extra` holds whatever else a caller attaches
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMetadata {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub escalated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub escalated_from: Option<SessionType>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    #[serde(skip_serializing)]
    pub id: String,
    pub principal_id: Uuid,
    pub session_type: SessionType,
    pub auth_method: AuthMethod,
    pub device: DeviceInfo,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    /// Effective permissions resolved when the session was minted
    pub permissions: Vec<String>,
    pub role_id: String,
    pub metadata: SessionMetadata,
}

impl AuthSession {
    /// A session is valid iff it is active and `now < expires_at`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }

    pub(crate) fn from_row(row: &SqliteRow) -> DatabaseResult<Self> {
        let session_type: String = row.try_get("session_type")?;
        let auth_method: String = row.try_get("auth_method")?;
        let device: String = row.try_get("device")?;
        let permissions: String = row.try_get("permissions")?;
        let metadata: String = row.try_get("metadata")?;

        Ok(Self {
            id: row.try_get("id")?,
            principal_id: row.try_get("principal_id")?,
            session_type: session_type.parse()?,
            auth_method: auth_method.parse()?,
            device: serde_json::from_str(&device)?,
            created_at: row.try_get("created_at")?,
            last_activity_at: row.try_get("last_activity_at")?,
            expires_at: row.try_get("expires_at")?,
            is_active: row.try_get("is_active")?,
            permissions: serde_json::from_str(&permissions)?,
            role_id: row.try_get("role_id")?,
            metadata: serde_json::from_str(&metadata)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Failure,
    Blocked,
}

string_enum!(AuditResult {
    Success => "success",
    Failure => "failure",
    Blocked => "blocked",
});

/// An audit row before it is appended
#[derive(Debug, Clone, Serialize)]
pub struct NewAuditEntry {
    pub principal_id: Option<Uuid>,
    pub action: String,
    pub resource: Option<String>,
    pub result: AuditResult,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: JsonValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub principal_id: Option<Uuid>,
    pub action: String,
    pub resource: Option<String>,
    pub result: AuditResult,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub(crate) fn from_row(row: &SqliteRow) -> DatabaseResult<Self> {
        let result: String = row.try_get("result")?;
        let details: String = row.try_get("details")?;
        Ok(Self {
            id: row.try_get("id")?,
            principal_id: row.try_get("principal_id")?,
            action: row.try_get("action")?,
            resource: row.try_get("resource")?,
            result: result.parse()?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            details: serde_json::from_str(&details)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_string_enums_round_trip_through_text() {
        for session_type in SessionType::ALL {
            assert_eq!(session_type.as_str().parse::<SessionType>().unwrap(), session_type);
        }
        assert_eq!("touch_panel".parse::<DeviceType>().unwrap(), DeviceType::TouchPanel);
        assert!("bogus".parse::<AuthMethod>().is_err());
    }

    #[test]
    fn test_session_validity_boundary() {
        let now = Utc::now();
        let session = AuthSession {
            id: "t".into(),
            principal_id: Uuid::new_v4(),
            session_type: SessionType::Standard,
            auth_method: AuthMethod::Password,
            device: DeviceInfo::default(),
            created_at: now,
            last_activity_at: now,
            expires_at: now + Duration::seconds(10),
            is_active: true,
            permissions: vec![],
            role_id: "member".into(),
            metadata: SessionMetadata::default(),
        };

        assert!(session.is_valid_at(now));
        assert!(!session.is_valid_at(session.expires_at));
    }
}
