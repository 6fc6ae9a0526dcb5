//! Configuration types and loading.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Root configuration structure for Winstate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct WinstateConfig {
    /// Logging configuration.
    pub log: LogConfig,

    /// Defaults for the `replay` command.
    pub replay: ReplayConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// `tracing` filter directive used when `WINSTATE_LOG` is unset.
    ///
    /// Examples: `"warn"`, `"winstate=debug"`, `"winstate::property=trace"`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self { Self { filter: "warn".to_string() } }
}

/// Replay command defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplayConfig {
    /// How recorded events are printed.
    pub format: OutputFormat,
}

/// Output format for recorded events.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// A rounded table, one row per event.
    #[default]
    Table,
    /// One JSON object per line.
    Json,
}

/// Errors that can occur when loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No configuration file was found in any of the expected locations.
    #[error(
        "No configuration file found. Expected at $XDG_CONFIG_HOME/winstate/config.jsonc or \
         ~/.config/winstate/config.jsonc"
    )]
    NotFound,

    /// The configuration file exists but could not be read.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file contains invalid JSON.
    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration file names to search for (in priority order).
const CONFIG_FILE_NAMES: &[&str] = &["config.jsonc", "config.json"];

/// Returns the possible configuration file paths in priority order.
///
/// 1. `$XDG_CONFIG_HOME/winstate/config.jsonc` (or `.json`), when set
/// 2. `~/.config/winstate/config.jsonc` (or `.json`)
/// 3. the platform configuration directory, e.g.
///    `~/Library/Application Support/winstate/config.jsonc`
#[must_use]
pub fn config_paths() -> Vec<PathBuf> {
    let mut dirs_to_search = Vec::new();

    if let Some(xdg_config) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        dirs_to_search.push(PathBuf::from(xdg_config).join("winstate"));
    }

    if let Some(home) = dirs::home_dir() {
        dirs_to_search.push(home.join(".config").join("winstate"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        dirs_to_search.push(config_dir.join("winstate"));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for dir in dirs_to_search {
        for filename in CONFIG_FILE_NAMES {
            let path = dir.join(filename);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Parses a configuration from JSONC text.
///
/// # Errors
///
/// Returns `ConfigError::Parse` if the text is not valid JSON once comments
/// are stripped.
pub fn parse_config<R: Read>(reader: R) -> Result<WinstateConfig, ConfigError> {
    let reader = json_comments::StripComments::new(reader);
    Ok(serde_json::from_reader(reader)?)
}

/// Loads the configuration from the first available config file.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if no configuration file exists in any of
/// the expected locations, or the error of [`load_config_from_path`].
pub fn load_config() -> Result<(WinstateConfig, PathBuf), ConfigError> {
    config_paths()
        .into_iter()
        .find(|path| path.is_file())
        .map_or(Err(ConfigError::NotFound), |path| load_config_from_path(&path))
}

/// Loads the configuration from a specific path.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if the file does not exist,
/// `ConfigError::Io` if it cannot be read, or `ConfigError::Parse` if it
/// contains invalid JSON.
pub fn load_config_from_path(path: &Path) -> Result<(WinstateConfig, PathBuf), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound);
    }

    let file = fs::File::open(path)?;
    let config = parse_config(file)?;
    Ok((config, path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = WinstateConfig::default();
        assert_eq!(config.log.filter, "warn");
        assert_eq!(config.replay.format, OutputFormat::Table);
    }

    #[test]
    fn test_parse_jsonc_with_comments() {
        let text = r#"
        {
            // Verbose reconciliation logging
            "log": { "filter": "winstate=debug" },
            /* Machine-readable output */
            "replay": { "format": "json" }
        }"#;

        let config = parse_config(text.as_bytes()).unwrap();
        assert_eq!(config.log.filter, "winstate=debug");
        assert_eq!(config.replay.format, OutputFormat::Json);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = parse_config(r#"{ "replay": {} }"#.as_bytes()).unwrap();
        assert_eq!(config, WinstateConfig::default());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = parse_config(r#"{ "log": "#.as_bytes()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to parse"));
    }

    #[test]
    fn test_load_config_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{ \"log\": {{ \"filter\": \"trace\" }} }} // trailing").unwrap();

        let (config, path) = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.log.filter, "trace");
        assert_eq!(path, file.path());
    }

    #[test]
    fn test_load_config_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_from_path(&dir.path().join("absent.jsonc"));
        assert!(matches!(result, Err(ConfigError::NotFound)));
    }

    #[test]
    fn test_config_paths_are_not_empty() {
        let paths = config_paths();
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.parent().is_some_and(|d| d.ends_with("winstate"))));
    }
}
