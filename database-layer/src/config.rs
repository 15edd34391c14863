use config_engine::duration_secs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Credential store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://hearth.db` or `sqlite::memory:`
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a caller waits for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "duration_secs")]
    pub acquire_timeout: Duration,

    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout", with = "duration_secs")]
    pub busy_timeout: Duration,

    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}

fn default_url() -> String {
    "sqlite://hearth.db".to_string()
}

fn default_max_connections() -> u32 {
    8
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
            busy_timeout: default_busy_timeout(),
            create_if_missing: true,
        }
    }
}

impl DatabaseConfig {
    /// Settings for a database file at `path`
    pub fn for_path(path: &std::path::Path) -> Self {
        Self {
            url: format!("sqlite://{}", path.display()),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}
