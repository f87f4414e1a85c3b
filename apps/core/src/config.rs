use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const APP_DIR_NAME: &str = "fuzzyfind";
const WINDOWS_APP_DIR_NAME: &str = "FuzzyFind";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Serialize(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {error}"),
            Self::Parse(error) => write!(f, "parse error: {error}"),
            Self::Serialize(error) => write!(f, "serialize error: {error}"),
            Self::Invalid(error) => write!(f, "invalid config: {error}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_command: Vec<String>,
    pub reindex_command: Vec<String>,
    pub reindex_interval_secs: u64,
    pub reindex_overlap_guard: bool,
    pub rendezvous_name: String,
    pub rendezvous_port: u16,
    pub rendezvous_timeout_ms: u64,
    pub hotkey: String,
    pub hide_on_focus_loss: bool,
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_command: vec!["python".into(), "main.py".into()],
            reindex_command: vec!["python".into(), "libs/index.py".into()],
            reindex_interval_secs: 60 * 60,
            reindex_overlap_guard: true,
            rendezvous_name: "fuzzyfinder".into(),
            rendezvous_port: 47913,
            rendezvous_timeout_ms: 500,
            hotkey: "Ctrl+Space".into(),
            hide_on_focus_loss: true,
            config_path: default_config_path(),
        }
    }
}

impl Config {
    pub fn reindex_interval(&self) -> Duration {
        Duration::from_secs(self.reindex_interval_secs)
    }

    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_millis(self.rendezvous_timeout_ms)
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    if let Some(dir) = non_empty_env("FUZZYFIND_HOME") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = non_empty_env("LOCALAPPDATA") {
        return PathBuf::from(dir).join(WINDOWS_APP_DIR_NAME);
    }
    if let Some(dir) = non_empty_env("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join(APP_DIR_NAME);
    }
    if let Some(dir) = non_empty_env("HOME") {
        return PathBuf::from(dir).join(format!(".{APP_DIR_NAME}"));
    }
    std::env::temp_dir().join(APP_DIR_NAME)
}

pub fn default_config_path() -> PathBuf {
    stable_app_data_dir().join(CONFIG_FILE_NAME)
}

pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    let mut config = if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path)?;
        parse(&raw, &config_path)?
    } else {
        Config::default()
    };
    config.config_path = config_path;

    validate(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

pub fn save(config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = config.config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let encoded = if is_json_path(&config.config_path) {
        serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?
    } else {
        toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?
    };
    std::fs::write(&config.config_path, encoded)?;
    Ok(())
}

pub fn parse(raw: &str, path: &Path) -> Result<Config, ConfigError> {
    if is_json_path(path) {
        json5::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    } else {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

pub fn validate(cfg: &Config) -> Result<(), String> {
    if command_is_empty(&cfg.backend_command) {
        return Err("backend_command is required".into());
    }

    if command_is_empty(&cfg.reindex_command) {
        return Err("reindex_command is required".into());
    }

    if cfg.reindex_interval_secs < 60 {
        return Err("reindex_interval_secs must be at least 60".into());
    }

    if cfg.rendezvous_name.trim().is_empty() {
        return Err("rendezvous_name is required".into());
    }

    if cfg
        .rendezvous_name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err("rendezvous_name must not contain path separators".into());
    }

    if cfg.rendezvous_port == 0 {
        return Err("rendezvous_port must be non-zero".into());
    }

    if !(50..=10_000).contains(&cfg.rendezvous_timeout_ms) {
        return Err("rendezvous_timeout_ms out of range".into());
    }

    if cfg.hotkey.trim().is_empty() {
        return Err("hotkey is required".into());
    }

    Ok(())
}

fn command_is_empty(command: &[String]) -> bool {
    command
        .first()
        .map(|program| program.trim().is_empty())
        .unwrap_or(true)
}

fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("json5"))
        .unwrap_or(false)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{is_json_path, parse, Config};
    use std::path::Path;

    #[test]
    fn json5_config_accepts_comments_and_partial_fields() {
        let raw = r#"{
            // only override the backend
            backend_command: ["./finder", "--stdio"],
        }"#;
        let cfg = parse(raw, Path::new("config.json5")).unwrap();
        assert_eq!(cfg.backend_command, vec!["./finder", "--stdio"]);
        assert_eq!(cfg.reindex_interval_secs, Config::default().reindex_interval_secs);
    }

    #[test]
    fn json_extension_detection_is_case_insensitive() {
        assert!(is_json_path(Path::new("a/config.JSON")));
        assert!(is_json_path(Path::new("config.json5")));
        assert!(!is_json_path(Path::new("config.toml")));
        assert!(!is_json_path(Path::new("config")));
    }
}
