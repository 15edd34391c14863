// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is not set
    #[serde(default = "default_level")]
    pub level: String,
    /// Structured JSON output instead of human-readable lines
    #[serde(default)]
    pub json: bool,
    #[serde(default = "default_true")]
    pub redaction_enabled: bool,
    /// Replace redacted values with a short hash so log lines can still be correlated
    #[serde(default = "default_true")]
    pub hash_for_correlation: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            redaction_enabled: true,
            hash_for_correlation: true,
        }
    }
}
