use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "padmapper";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_PROFILE_FILE: &str = "default.json";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub driver: DriverConfig,
    pub profile: ProfileConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// How often pending timers are checked between controller reports
    pub tick_interval_ms: u64,
    /// Capacity of the snapshot queue feeding the engine
    pub input_queue: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            input_queue: 256,
        }
    }
}

impl DriverConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ProfileConfig {
    pub path: Option<PathBuf>,
}

impl ProfileConfig {
    /// Configured profile, or `default.json` next to the config file
    pub fn resolve(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| config_dir().join(DEFAULT_PROFILE_FILE))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl LoggingConfig {
    /// Configured level, `INFO` if the text names no level
    pub fn level(&self) -> tracing::Level {
        self.level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level '{}', using info", self.level);
            tracing::Level::INFO
        })
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Loads the config file; a missing file yields the defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            warn!(
                "Config file {} does not exist, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub async fn load_default() -> Result<Self, ConfigError> {
        Self::load(default_config_path()).await
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_toml()?).await?;
        info!("Config saved to {}", path.display());
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        })
        .join(CONFIG_DIR)
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [driver]
            tick_interval_ms = 4

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.driver.tick_interval(), Duration::from_millis(4));
        assert_eq!(config.driver.input_queue, 256);
        assert_eq!(config.logging.level(), tracing::Level::DEBUG);
        assert_eq!(config.profile.path, None);
    }

    #[test]
    fn toml_round_trip() {
        let mut config = EngineConfig::default();
        config.profile.path = Some(PathBuf::from("/tmp/desktop.json"));
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
        assert_eq!(config.profile.resolve(), PathBuf::from("/tmp/desktop.json"));
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(matches!(
            EngineConfig::from_toml("[driver\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config = EngineConfig::load("/nonexistent/padmapper/config.toml")
            .await
            .unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
