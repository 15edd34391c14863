use database_layer::{AuthMethod, AuthSession, DeviceInfo, SessionType};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who is logging in. Either an id or a username is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalRef {
    Id(Uuid),
    Username(String),
}

impl PrincipalRef {
    /// Identifier used for rate-limit keys and audit resources
    pub fn identifier(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Username(username) => username.trim().to_lowercase(),
        }
    }
}

/// The proof offered for a login
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Credentials {
    Password { password: SecretString },
    Passcode { passcode: SecretString },
    Guest,
    /// Service principals present their password as the API secret
    ApiKey { secret: SecretString },
}

impl Credentials {
    pub fn method(&self) -> AuthMethod {
        match self {
            Self::Password { .. } => AuthMethod::Password,
            Self::Passcode { .. } => AuthMethod::Passcode,
            Self::Guest => AuthMethod::Guest,
            Self::ApiKey { .. } => AuthMethod::ApiKey,
        }
    }

    /// The session tier a successful login with these credentials opens
    pub fn session_type(&self) -> SessionType {
        match self {
            Self::Password { .. } => SessionType::Standard,
            Self::Passcode { .. } => SessionType::Passcode,
            Self::Guest => SessionType::Guest,
            Self::ApiKey { .. } => SessionType::Api,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequest {
    pub principal: PrincipalRef,
    pub credentials: Credentials,
    #[serde(default)]
    pub device: DeviceInfo,
    /// Set by the transport from the connection, never read from the body
    #[serde(skip)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl AuthRequest {
    pub fn new(principal: PrincipalRef, credentials: Credentials) -> Self {
        Self {
            principal,
            credentials,
            device: DeviceInfo::default(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn from_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn on_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }
}

/// An SSO adapter's statement that `subject` signed in at `provider`.
///
/// Only accepted from an authenticated adapter session; the adapter relays
/// the end user's address and device.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedLogin {
    pub principal: PrincipalRef,
    pub provider: String,
    pub subject: String,
    #[serde(default)]
    pub device: DeviceInfo,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl FederatedLogin {
    pub fn new(principal: PrincipalRef, provider: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            principal,
            provider: provider.into(),
            subject: subject.into(),
            device: DeviceInfo::default(),
            ip_address: None,
            user_agent: None,
        }
    }

    /// The settings key that links a principal to this provider
    pub fn link_key(&self) -> String {
        format!("sso.{}", self.provider)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub session: AuthSession,
    /// The password must be changed before it expires or was set by an administrator
    pub requires_password_change: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    NotConnected,
    Connected,
    Expired,
    Error,
}

impl AuthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Connected => "connected",
            Self::Expired => "expired",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
