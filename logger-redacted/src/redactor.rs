use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::LoggingConfig;

lazy_static! {
    static ref EMAIL_REGEX: Option<Regex> =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok();
    static ref IP_REGEX: Option<Regex> = Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").ok();
    static ref BEARER_REGEX: Option<Regex> = Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").ok();
}

/// Detail keys whose values never reach a log line or an audit row
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "current_password",
    "new_password",
    "temporary_password",
    "passcode",
    "token",
    "session_token",
    "session_id",
    "secret",
    "authorization",
    "hash",
    "password_hash",
    "passcode_hash",
];

const REDACTED: &str = "[REDACTED]";

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub redact_emails: bool,
    pub redact_ip_addresses: bool,
    pub redact_bearer_tokens: bool,
    pub hash_for_correlation: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_emails: true,
            redact_ip_addresses: true,
            redact_bearer_tokens: true,
            hash_for_correlation: true,
        }
    }
}

impl From<&LoggingConfig> for RedactionConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            enabled: config.redaction_enabled,
            hash_for_correlation: config.hash_for_correlation,
            ..Self::default()
        }
    }
}

/// PII redactor for log messages and audit details
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        if !self.config.enabled {
            return text.to_string();
        }

        let mut result = text.to_string();

        // Tokens first so an email-shaped token is not half-redacted
        if self.config.redact_bearer_tokens {
            if let Some(re) = BEARER_REGEX.as_ref() {
                result = re.replace_all(&result, "Bearer [REDACTED]").to_string();
            }
        }

        if self.config.redact_emails {
            result = self.redact_emails(&result);
        }

        if self.config.redact_ip_addresses {
            result = self.redact_ip_addresses(&result);
        }

        result
    }

    /// Strip sensitive keys from a structured details object, recursively.
    ///
    /// String values under other keys go through [`PiiRedactor::redact`].
    pub fn redact_json(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, inner) in map {
                    if is_sensitive_key(key) {
                        out.insert(key.clone(), Value::String(REDACTED.to_string()));
                    } else {
                        out.insert(key.clone(), self.redact_json(inner));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_json(v)).collect()),
            // Free text may still hold emails or bearer tokens
            Value::String(s) if self.config.enabled && self.config.redact_bearer_tokens => {
                let cleaned = BEARER_REGEX
                    .as_ref()
                    .map(|re| re.replace_all(s, "Bearer [REDACTED]").to_string())
                    .unwrap_or_else(|| s.clone());
                Value::String(cleaned)
            }
            other => other.clone(),
        }
    }

    /// Short stable fingerprint for correlating a secret across log lines
    pub fn fingerprint(&self, value: &str) -> String {
        hash_value(value)
    }

    fn redact_emails(&self, text: &str) -> String {
        let Some(re) = EMAIL_REGEX.as_ref() else {
            return text.to_string();
        };
        re.replace_all(text, |caps: &Captures| {
            let email = caps.get(0).map_or("", |m| m.as_str());
            if self.config.hash_for_correlation {
                format!("EMAIL[{}]", hash_value(email))
            } else {
                match email.split_once('@') {
                    Some((local, domain)) => format!(
                        "{}***@{}***",
                        local.chars().next().unwrap_or('*'),
                        domain.chars().next().unwrap_or('*')
                    ),
                    None => "***@***".to_string(),
                }
            }
        })
        .to_string()
    }

    fn redact_ip_addresses(&self, text: &str) -> String {
        let Some(re) = IP_REGEX.as_ref() else {
            return text.to_string();
        };
        re.replace_all(text, |caps: &Captures| {
            let ip = caps.get(0).map_or("", |m| m.as_str());
            if self.config.hash_for_correlation {
                format!("IP[{}]", hash_value(ip))
            } else {
                let parts: Vec<&str> = ip.split('.').collect();
                match (parts.first(), parts.get(3)) {
                    (Some(first), Some(last)) if parts.len() == 4 => format!("{first}.***.***.{last}"),
                    _ => "***.***.***.***".to_string(),
                }
            }
        })
        .to_string()
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|k| *k == lower)
}

fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    // First 8 bytes keep the fingerprint short
    general_purpose::URL_SAFE_NO_PAD.encode(digest.get(..8).unwrap_or_default())
}
