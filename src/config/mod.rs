use crate::error::{DevpipeError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Settings shared by the capture engine, the merge engine and the token store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevpipeConfig {
    /// Rotation threshold for the capture log, in KB
    #[serde(default = "default_max_file_size", alias = "maxFileSize")]
    pub max_file_size: u64,

    /// Default number of records returned by recent-log queries
    #[serde(default = "default_max_logs", alias = "maxLogs")]
    pub max_logs: usize,

    /// URL substrings a record must match to be captured (empty = accept all)
    #[serde(default, alias = "urlFilters")]
    pub url_filters: Vec<String>,

    /// Base directory for the capture log
    #[serde(default = "default_log_dir", alias = "logDir")]
    pub log_dir: PathBuf,

    /// Externally maintained log file merged with the capture log (empty = unset)
    #[serde(default, alias = "externalLogPath")]
    pub external_log_path: Option<PathBuf>,

    /// Merged artifact path, or a directory that receives the canonical file name
    #[serde(default = "default_merged_log_path", alias = "mergedLogPath")]
    pub merged_log_path: PathBuf,

    /// Where directory tokens are persisted
    #[serde(default = "default_token_store", alias = "tokenStore")]
    pub token_store: PathBuf,

    /// Directories a token may point into (empty = any absolute path)
    #[serde(default, alias = "allowedRoots")]
    pub allowed_roots: Vec<PathBuf>,
}

/// Settings that can be changed at runtime and persisted back to the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    MaxFileSize,
    MaxLogs,
    ExternalLogPath,
    MergedLogPath,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::MaxFileSize,
        ConfigKey::MaxLogs,
        ConfigKey::ExternalLogPath,
        ConfigKey::MergedLogPath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::MaxFileSize => "max_file_size",
            ConfigKey::MaxLogs => "max_logs",
            ConfigKey::ExternalLogPath => "external_log_path",
            ConfigKey::MergedLogPath => "merged_log_path",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = DevpipeError;

    /// Accepts both snake_case and camelCase names
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max_file_size" | "maxFileSize" => Ok(ConfigKey::MaxFileSize),
            "max_logs" | "maxLogs" => Ok(ConfigKey::MaxLogs),
            "external_log_path" | "externalLogPath" => Ok(ConfigKey::ExternalLogPath),
            "merged_log_path" | "mergedLogPath" => Ok(ConfigKey::MergedLogPath),
            other => Err(DevpipeError::InvalidConfig(format!(
                "Unknown setting: {}",
                other
            ))),
        }
    }
}

// Default value functions for serde
fn default_max_file_size() -> u64 {
    50
}

fn default_max_logs() -> usize {
    10
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_merged_log_path() -> PathBuf {
    PathBuf::from("logs/devpipe_merged.log")
}

fn default_token_store() -> PathBuf {
    PathBuf::from("config/directory_tokens.json")
}

impl Default for DevpipeConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_logs: default_max_logs(),
            url_filters: Vec::new(),
            log_dir: default_log_dir(),
            external_log_path: None,
            merged_log_path: default_merged_log_path(),
            token_store: default_token_store(),
            allowed_roots: Vec::new(),
        }
    }
}

impl DevpipeConfig {
    /// Load configuration from a file (supports TOML and JSON).
    ///
    /// A missing file yields the default configuration.
    pub fn from_file(path: &Path) -> Result<DevpipeConfig> {
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        if !matches!(extension, "toml" | "json") {
            return Err(DevpipeError::InvalidConfig(format!(
                "Unsupported file format: {}. Use .toml or .json",
                extension
            )));
        }

        if !path.exists() {
            return Ok(DevpipeConfig::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| DevpipeError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            _ => Self::parse_json(&contents)?,
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<DevpipeConfig> {
        toml::from_str(contents)
            .map_err(|e| DevpipeError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<DevpipeConfig> {
        serde_json::from_str(contents)
            .map_err(|e| DevpipeError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(DevpipeError::ConfigValidationError(
                "max_file_size must be at least 1 KB".to_string(),
            ));
        }

        if self.max_logs == 0 {
            return Err(DevpipeError::ConfigValidationError(
                "max_logs must be at least 1".to_string(),
            ));
        }

        if self.log_dir.as_os_str().is_empty() {
            return Err(DevpipeError::ConfigValidationError(
                "log_dir must not be empty".to_string(),
            ));
        }

        if let Some(ref external) = self.external_log_path {
            if !external.is_absolute() {
                return Err(DevpipeError::ConfigValidationError(format!(
                    "external_log_path must be absolute: {}",
                    external.display()
                )));
            }
        }

        for root in &self.allowed_roots {
            if !root.is_absolute() {
                return Err(DevpipeError::ConfigValidationError(format!(
                    "allowed root must be absolute: {}",
                    root.display()
                )));
            }
        }

        Ok(())
    }

    /// Save configuration with an atomic write; the format follows the extension
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let contents = match extension {
            "toml" => toml::to_string_pretty(self).map_err(|e| {
                DevpipeError::ConfigError(format!("Failed to serialize config: {}", e))
            })?,
            "json" => serde_json::to_string_pretty(self).map_err(|e| {
                DevpipeError::ConfigError(format!("Failed to serialize config: {}", e))
            })?,
            _ => {
                return Err(DevpipeError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    DevpipeError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let temp_path = path.with_extension(format!("{}.tmp", extension));
        {
            let file = File::create(&temp_path).map_err(|e| {
                DevpipeError::ConfigError(format!("Failed to create temp config file: {}", e))
            })?;
            let mut writer = BufWriter::new(file);
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        fs::rename(&temp_path, path).map_err(|e| {
            DevpipeError::ConfigError(format!("Failed to rename temp config file: {}", e))
        })?;

        Ok(())
    }

    /// Current value of a setting as displayed to users; unset paths are empty
    pub fn get_value(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::MaxFileSize => self.max_file_size.to_string(),
            ConfigKey::MaxLogs => self.max_logs.to_string(),
            ConfigKey::ExternalLogPath => self
                .external_log_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ConfigKey::MergedLogPath => self.merged_log_path.display().to_string(),
        }
    }

    /// Parse `value` into the setting and validate the result.
    ///
    /// An empty external path unsets it. Nothing changes on error.
    pub fn set_value(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let mut updated = self.clone();
        let value = value.trim();

        match key {
            ConfigKey::MaxFileSize => updated.max_file_size = parse_number(key, value)?,
            ConfigKey::MaxLogs => updated.max_logs = parse_number(key, value)?,
            ConfigKey::ExternalLogPath => {
                updated.external_log_path = Some(PathBuf::from(value))
                    .filter(|p| !p.as_os_str().is_empty());
            }
            ConfigKey::MergedLogPath => {
                if value.is_empty() {
                    return Err(DevpipeError::ConfigValidationError(
                        "merged_log_path must not be empty".to_string(),
                    ));
                }
                updated.merged_log_path = PathBuf::from(value);
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Rotation threshold in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size * 1024
    }

    /// Expand environment variables in path fields
    fn expand_env_vars(&mut self) {
        self.log_dir = expand_env_in_path(&self.log_dir);
        self.merged_log_path = expand_env_in_path(&self.merged_log_path);
        self.token_store = expand_env_in_path(&self.token_store);
        self.external_log_path = self
            .external_log_path
            .take()
            .map(|p| expand_env_in_path(&p))
            .filter(|p| !p.as_os_str().is_empty());
        self.allowed_roots = self
            .allowed_roots
            .iter()
            .map(|root| expand_env_in_path(root))
            .collect();
    }
}

fn parse_number<T: FromStr>(key: ConfigKey, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        DevpipeError::ConfigValidationError(format!("{} expects a number, got '{}'", key, value))
    })
}

/// Expand `$VAR` and `${VAR}` in a string
fn expand_env_in_string(s: &str) -> String {
    let mut result = s.to_string();

    // Longest names first so $HOME_DIR is not clobbered by $HOME
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    for (key, value) in vars {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(expand_env_in_string(&path_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DevpipeConfig::default();
        assert_eq!(config.max_file_size, 50);
        assert_eq!(config.max_logs, 10);
        assert!(config.url_filters.is_empty());
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.external_log_path, None);
        assert_eq!(
            config.merged_log_path,
            PathBuf::from("logs/devpipe_merged.log")
        );
        assert_eq!(config.max_file_size_bytes(), 50 * 1024);
    }

    #[test]
    fn test_parse_json_camel_case_aliases() {
        let json = r#"
            {
                "maxFileSize": 20,
                "externalLogPath": "/var/log/wp/debug.log",
                "mergedLogPath": "/tmp/merged"
            }
        "#;

        let config = DevpipeConfig::parse_json(json).unwrap();
        assert_eq!(config.max_file_size, 20);
        assert_eq!(
            config.external_log_path,
            Some(PathBuf::from("/var/log/wp/debug.log"))
        );
        assert_eq!(config.merged_log_path, PathBuf::from("/tmp/merged"));
        assert_eq!(config.max_logs, 10);
    }

    #[test]
    fn test_parse_toml() {
        let toml_content = r#"
            max_file_size = 5
            url_filters = ["localhost"]
            allowed_roots = ["/srv/logs"]
        "#;

        let config = DevpipeConfig::parse_toml(toml_content).unwrap();
        assert_eq!(config.max_file_size, 5);
        assert_eq!(config.url_filters, vec!["localhost".to_string()]);
        assert_eq!(config.allowed_roots, vec![PathBuf::from("/srv/logs")]);
    }

    #[test]
    fn test_validate_zero_file_size() {
        let config = DevpipeConfig {
            max_file_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DevpipeError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_relative_external_path() {
        let config = DevpipeConfig {
            external_log_path: Some(PathBuf::from("relative/debug.log")),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DevpipeError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_relative_root() {
        let config = DevpipeConfig {
            allowed_roots: vec![PathBuf::from("logs")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("DEVPIPE_TEST_ROOT", "/tmp/devpipe");

        let mut config = DevpipeConfig {
            log_dir: PathBuf::from("$DEVPIPE_TEST_ROOT/logs"),
            external_log_path: Some(PathBuf::from("${DEVPIPE_TEST_ROOT}/ext.log")),
            ..Default::default()
        };
        config.expand_env_vars();

        assert_eq!(config.log_dir, PathBuf::from("/tmp/devpipe/logs"));
        assert_eq!(
            config.external_log_path,
            Some(PathBuf::from("/tmp/devpipe/ext.log"))
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = DevpipeConfig::from_file(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DevpipeConfig::default());
    }

    #[test]
    fn test_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "max_file_size: 1").unwrap();

        let result = DevpipeConfig::from_file(&path);
        assert!(matches!(result, Err(DevpipeError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_key_names() {
        for key in ConfigKey::ALL {
            assert_eq!(key.as_str().parse::<ConfigKey>().unwrap(), key);
        }
        assert_eq!(
            "externalLogPath".parse::<ConfigKey>().unwrap(),
            ConfigKey::ExternalLogPath
        );
        assert!("log_level".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_set_value() {
        let mut config = DevpipeConfig::default();

        config.set_value(ConfigKey::MaxFileSize, "200").unwrap();
        assert_eq!(config.max_file_size, 200);
        assert_eq!(config.get_value(ConfigKey::MaxFileSize), "200");

        config
            .set_value(ConfigKey::ExternalLogPath, "/var/www/debug.log")
            .unwrap();
        assert_eq!(
            config.external_log_path,
            Some(PathBuf::from("/var/www/debug.log"))
        );
        config.set_value(ConfigKey::ExternalLogPath, "").unwrap();
        assert_eq!(config.external_log_path, None);
        assert_eq!(config.get_value(ConfigKey::ExternalLogPath), "");
    }

    #[test]
    fn test_set_value_rejects_invalid_without_change() {
        let mut config = DevpipeConfig::default();

        assert!(config.set_value(ConfigKey::MaxFileSize, "0").is_err());
        assert!(config.set_value(ConfigKey::MaxLogs, "many").is_err());
        assert!(config
            .set_value(ConfigKey::ExternalLogPath, "relative.log")
            .is_err());
        assert!(config.set_value(ConfigKey::MergedLogPath, " ").is_err());
        assert_eq!(config, DevpipeConfig::default());
    }

    #[test]
    fn test_save_and_reload_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let config = DevpipeConfig {
            max_file_size: 7,
            url_filters: vec!["example.com".to_string()],
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = DevpipeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.max_file_size, 7);
        assert_eq!(loaded.url_filters, vec!["example.com".to_string()]);
    }
}
