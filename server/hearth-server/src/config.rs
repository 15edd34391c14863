use std::net::{IpAddr, SocketAddr};

use auth_gateway::GatewayConfig;
use config_engine::{ConfigError, ValidateConfig};
use database_layer::DatabaseConfig;
use logger_redacted::LoggingConfig;
use serde::{Deserialize, Serialize};

/// First administrator, created only when the store holds no principals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

/// Process configuration.
///
/// Loaded from defaults, then an optional file, then `HEARTH__*`
/// environment variables, e.g. `HEARTH__DATABASE__URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Peers allowed to set `X-Forwarded-For` / `X-Real-IP`. Empty means the
    /// TCP peer is always the client.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: GatewayConfig,
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            trusted_proxies: Vec::new(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            auth: GatewayConfig::default(),
            bootstrap_admin: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("bind address {:?}: {e}", self.bind)))
    }
}

impl ValidateConfig for ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("database.url must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".into(),
            ));
        }
        self.auth.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_bad_bind_address_rejected() {
        let config = ServerConfig {
            bind: "localhost".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }
}
