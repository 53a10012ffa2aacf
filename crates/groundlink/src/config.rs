//! Configuration
//!
//! Settings are layered with figment: built-in defaults, then an optional
//! TOML file, then `GROUNDLINK_` environment variables (`__` separates
//! sections, e.g. `GROUNDLINK_SERVER__PORT=9000`).

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::store::ScheduleOrdering;

/// Longest accepted `registry.stale_after_secs` (ten years)
pub const MAX_STALE_AFTER_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Figment(#[from] figment::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundlinkConfig {
    pub server: ServerConfig,
    pub topics: TopicConfig,
    pub schedule: ScheduleConfig,
    pub registry: RegistryConfig,
    pub catalog: CatalogConfig,
    pub commands: CommandConfig,
}

/// WebSocket surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Topic patterns routed to each event kind.
///
/// Patterns accept `*` and `?` wildcards. Kinds are checked in the order
/// registry_replace, schedule_update, removal, patch; the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub registry_replace: Vec<String>,
    pub patch: Vec<String>,
    pub schedule_update: Vec<String>,
    pub removal: Vec<String>,
}

impl Default for TopicConfig {
    fn default() -> Self {
        fn topics(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            registry_replace: topics(&["client_data_update", "registry/replace"]),
            patch: topics(&[
                "field_unit_data",
                "az_el_result",
                "select_satellite",
                "unit/patch",
            ]),
            schedule_update: topics(&["schedule_update", "schedule/update"]),
            removal: topics(&["unit_removed", "unit/removed"]),
        }
    }
}

/// Schedule cache behaviour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub ordering: ScheduleOrdering,
}

/// Unit registry housekeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Drop units not heard from for this many seconds (0 = never)
    pub stale_after_secs: u64,
    /// How often the stale sweep runs
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 0,
            sweep_interval_secs: 60,
        }
    }
}

/// Satellite catalog backing the name lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file of TLE records; no catalog when unset
    pub path: Option<PathBuf>,
}

/// Outbound command channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Topic command messages are published on
    pub topic: String,
    /// Append outbound messages to this JSON-lines file
    pub output: Option<PathBuf>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            topic: "fu_command".to_string(),
            output: None,
        }
    }
}

impl GroundlinkConfig {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(GroundlinkConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::from_figment(figment.merge(Env::prefixed("GROUNDLINK_").split("__")))
    }

    /// Extract and validate from an assembled figment
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let topics = [
            ("registry_replace", &self.topics.registry_replace),
            ("patch", &self.topics.patch),
            ("schedule_update", &self.topics.schedule_update),
            ("removal", &self.topics.removal),
        ];
        for (kind, patterns) in topics {
            if patterns.iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "topics.{kind} contains an empty pattern"
                )));
            }
        }

        if self.registry.stale_after_secs > 0 && self.registry.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "registry.sweep_interval_secs must be positive when stale_after_secs is set"
                    .to_string(),
            ));
        }

        if self.registry.stale_after_secs > MAX_STALE_AFTER_SECS {
            return Err(ConfigError::Invalid(format!(
                "registry.stale_after_secs must be at most {MAX_STALE_AFTER_SECS}"
            )));
        }

        if self.commands.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("commands.topic is empty".to_string()));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = GroundlinkConfig::from_figment(Figment::from(Serialized::defaults(
            GroundlinkConfig::default(),
        )))
        .unwrap();

        assert_eq!(config, GroundlinkConfig::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.schedule.ordering, ScheduleOrdering::StartTime);
        assert_eq!(config.registry.stale_after_secs, 0);
        assert!(config.topics.patch.contains(&"field_unit_data".to_string()));
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "groundlink.toml",
                r#"
[server]
port = 9100

[schedule]
ordering = "source"

[registry]
stale_after_secs = 300

[topics]
patch = ["telemetry/*"]
"#,
            )?;
            jail.set_env("GROUNDLINK_SERVER__HOST", "127.0.0.1");
            jail.set_env("GROUNDLINK_REGISTRY__SWEEP_INTERVAL_SECS", "15");

            let config = GroundlinkConfig::load(Some(Path::new("groundlink.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.server.port, 9100);
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.schedule.ordering, ScheduleOrdering::Source);
            assert_eq!(config.registry.stale_after_secs, 300);
            assert_eq!(config.registry.sweep_interval_secs, 15);
            assert_eq!(config.topics.patch, vec!["telemetry/*".to_string()]);
            // untouched sections keep their defaults
            assert_eq!(config.topics.removal, TopicConfig::default().removal);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file() {
        let err = GroundlinkConfig::load(Some(Path::new("/nonexistent/groundlink.toml")));
        assert!(matches!(err, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = GroundlinkConfig::default();
        config.registry.stale_after_secs = 60;
        config.registry.sweep_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GroundlinkConfig::default();
        config.topics.removal.push(" ".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_stale_after_upper_bound() {
        let mut config = GroundlinkConfig::default();
        config.registry.stale_after_secs = MAX_STALE_AFTER_SECS;
        assert!(config.validate().is_ok());

        config.registry.stale_after_secs = 10_000_000_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_render_round_trip() {
        let mut config = GroundlinkConfig::default();
        config.catalog.path = Some(PathBuf::from("data/satellites.json"));

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[server]"));

        let parsed: GroundlinkConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
