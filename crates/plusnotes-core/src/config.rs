use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PlusNotesError, Result};

const CONFIG_FILE: &str = "config.toml";

/// Upper bound for `updates.check_interval_hours` (ten years)
pub const MAX_CHECK_INTERVAL_HOURS: u64 = 24 * 365 * 10;

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# PlusNotes configuration file
# Location: <data dir>/PlusNotes/config.toml

[network]
# Only repositories on this host can be fetched
host = "github.com"
# Metadata API used for branch, manifest and release lookups
api_base = "https://api.github.com"
# Branch used when the default branch cannot be resolved
default_branch = "main"
# Upper bound for every HTTP request, in seconds
timeout_secs = 30
user_agent = "PlusNotes-App"

[updates]
# Extensions updated more recently than this are not checked again
check_interval_hours = 24
# Repository whose releases announce new PlusNotes versions
app_repository = "https://github.com/plusnotes/plusnotes"
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub updates: UpdatesConfig,
}

/// Remote fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_branch")]
    pub default_branch: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_host() -> String {
    "github.com".to_string()
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "PlusNotes-App".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_base: default_api_base(),
            default_branch: default_branch(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Update check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesConfig {
    #[serde(default = "default_check_interval_hours")]
    pub check_interval_hours: u64,

    #[serde(default = "default_app_repository")]
    pub app_repository: String,
}

fn default_check_interval_hours() -> u64 {
    24
}

fn default_app_repository() -> String {
    env!("CARGO_PKG_REPOSITORY").to_string()
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            check_interval_hours: default_check_interval_hours(),
            app_repository: default_app_repository(),
        }
    }
}

impl UpdatesConfig {
    /// Interval as a duration, capped at [`MAX_CHECK_INTERVAL_HOURS`]
    pub fn check_interval(&self) -> chrono::Duration {
        let hours = self.check_interval_hours.min(MAX_CHECK_INTERVAL_HOURS);
        i64::try_from(hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or_else(|| chrono::Duration::days(365 * 10))
    }
}

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let mut config: Config =
            toml::from_str(&content).map_err(|e| PlusNotesError::ConfigParse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if config.updates.check_interval_hours > MAX_CHECK_INTERVAL_HOURS {
            warn!(
                "updates.check_interval_hours = {} in {} is too large, using {}",
                config.updates.check_interval_hours,
                path.display(),
                MAX_CHECK_INTERVAL_HOURS
            );
            config.updates.check_interval_hours = MAX_CHECK_INTERVAL_HOURS;
        }

        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim().trim_matches('"');
        match key {
            "network.host" => self.network.host = value.to_string(),
            "network.api_base" => self.network.api_base = value.trim_end_matches('/').to_string(),
            "network.default_branch" => self.network.default_branch = value.to_string(),
            "network.timeout_secs" => self.network.timeout_secs = parse_number(key, value)?,
            "network.user_agent" => self.network.user_agent = value.to_string(),
            "updates.check_interval_hours" => {
                let hours = parse_number(key, value)?;
                if hours > MAX_CHECK_INTERVAL_HOURS {
                    return Err(PlusNotesError::InvalidConfigValue {
                        key: key.to_string(),
                        message: format!("at most {} hours, got {}", MAX_CHECK_INTERVAL_HOURS, hours),
                    });
                }
                self.updates.check_interval_hours = hours
            }
            "updates.app_repository" => {
                self.updates.app_repository = value.trim_end_matches('/').to_string()
            }
            _ => {
                return Err(PlusNotesError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("network.host".to_string(), self.network.host.clone()),
            ("network.api_base".to_string(), self.network.api_base.clone()),
            (
                "network.default_branch".to_string(),
                self.network.default_branch.clone(),
            ),
            (
                "network.timeout_secs".to_string(),
                self.network.timeout_secs.to_string(),
            ),
            (
                "network.user_agent".to_string(),
                self.network.user_agent.clone(),
            ),
            (
                "updates.check_interval_hours".to_string(),
                self.updates.check_interval_hours.to_string(),
            ),
            (
                "updates.app_repository".to_string(),
                self.updates.app_repository.clone(),
            ),
        ]
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| PlusNotesError::InvalidConfigValue {
        key: key.to_string(),
        message: format!("expected a non-negative integer, got '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.host, "github.com");
        assert_eq!(config.network.default_branch, "main");
        assert_eq!(config.network.timeout(), Duration::from_secs(30));
        assert_eq!(config.updates.check_interval(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_init_template_parses() {
        let temp = TempDir::new().unwrap();
        let path = Config::init(temp.path()).unwrap();
        assert!(path.exists());

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.network.api_base, "https://api.github.com");
        assert_eq!(config.updates.check_interval_hours, 24);
        assert_eq!(config.updates.app_repository, default_app_repository());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE),
            "[network]\ntimeout_secs = 5\n",
        )
        .unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.network.timeout_secs, 5);
        assert_eq!(config.network.host, "github.com");
    }

    #[test]
    fn test_config_get_set() {
        let mut config = Config::default();

        config.set("network.default_branch", "trunk").unwrap();
        assert_eq!(config.get("network.default_branch").unwrap(), "trunk");

        config.set("updates.check_interval_hours", "6").unwrap();
        assert_eq!(config.updates.check_interval_hours, 6);

        assert!(config.set("network.timeout_secs", "soon").is_err());
        assert!(config.set("nope", "1").is_err());
    }

    #[test]
    fn test_check_interval_is_bounded() {
        let mut config = Config::default();

        let result = config.set("updates.check_interval_hours", "3000000000000000");
        assert!(matches!(
            result,
            Err(PlusNotesError::InvalidConfigValue { .. })
        ));
        assert_eq!(config.updates.check_interval_hours, 24);

        config
            .set("updates.check_interval_hours", &MAX_CHECK_INTERVAL_HOURS.to_string())
            .unwrap();
        assert_eq!(
            config.updates.check_interval(),
            chrono::Duration::hours(MAX_CHECK_INTERVAL_HOURS as i64)
        );

        // Values written by hand never reach chrono unchecked
        config.updates.check_interval_hours = u64::MAX;
        assert_eq!(
            config.updates.check_interval(),
            chrono::Duration::hours(MAX_CHECK_INTERVAL_HOURS as i64)
        );
    }

    #[test]
    fn test_load_clamps_oversized_interval() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE),
            "[updates]\ncheck_interval_hours = 3000000000000000\n",
        )
        .unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.updates.check_interval_hours, MAX_CHECK_INTERVAL_HOURS);
    }

    #[test]
    fn test_save_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.set("network.host", "git.example.com").unwrap();
        config.save(temp.path()).unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert_eq!(loaded.network.host, "git.example.com");
    }
}
