mod credentials;
mod engine;
mod environments;
mod observability;
mod runtime;
mod server;

pub use credentials::*;
pub use engine::*;
pub use environments::*;
pub use observability::*;
pub use runtime::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSON catalog of environments (endpoints + initiator credentials).
    #[serde(default = "d_environments_path")]
    pub environments_path: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineDefaults,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environments_path: d_environments_path(),
            server: ServerConfig::default(),
            engine: EngineDefaults::default(),
            credentials: CredentialsConfig::default(),
            batch: BatchConfig::default(),
            recovery: RecoveryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn d_environments_path() -> PathBuf {
    PathBuf::from("configuration.json")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut error = |field: &str, message: &str| {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message: message.into(),
            });
        };

        if self.server.port == 0 {
            error("server.port", "port must be greater than 0");
        }
        if self.server.host.is_empty() {
            error("server.host", "host must not be empty");
        }
        if self.engine.begin_string.is_empty() {
            error("engine.begin_string", "begin_string must not be empty");
        }
        if self.engine.heartbeat_secs == 0 {
            error("engine.heartbeat_secs", "heartbeat interval must be greater than 0");
        }
        if self.credentials.dir.as_os_str().is_empty() {
            error("credentials.dir", "credentials directory must not be empty");
        }
        if self.batch.client_buffer == 0 {
            error("batch.client_buffer", "client buffer must hold at least one event");
        }
        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            error("observability.sample_rate", "sample rate must be within 0.0..=1.0");
        }

        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }

        if !self.environments_path.exists() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "environments_path".into(),
                message: format!(
                    "{} not found; no environment will accept sessions",
                    self.environments_path.display()
                ),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let issues = Config::default().validate();
        assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn zero_port_and_empty_begin_string_are_errors() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        cfg.engine.begin_string.clear();
        let fields: Vec<_> = cfg
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .map(|i| i.field)
            .collect();
        assert!(fields.contains(&"server.port".to_string()));
        assert!(fields.contains(&"engine.begin_string".to_string()));
    }

    #[test]
    fn out_of_range_sample_rate_is_flagged() {
        let mut cfg = Config::default();
        cfg.observability.sample_rate = 1.5;
        assert!(cfg
            .validate()
            .iter()
            .any(|i| i.field == "observability.sample_rate"));
    }

    #[test]
    fn display_includes_severity_tag() {
        let issue = ConfigError {
            severity: ConfigSeverity::Warning,
            field: "server.cors.allowed_origins".into(),
            message: "wildcard".into(),
        };
        assert_eq!(issue.to_string(), "[WARN] server.cors.allowed_origins: wildcard");
    }
}
