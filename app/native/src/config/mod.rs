//! Configuration module for Winstate.
//!
//! The configuration file supports JSONC format (JSON with comments).
//! Both single-line (`//`) and multi-line (`/* */`) comments are allowed.

mod types;

use std::path::{Path, PathBuf};

pub use types::{
    ConfigError, LogConfig, OutputFormat, ReplayConfig, WinstateConfig, config_paths, load_config,
    load_config_from_path, parse_config,
};

/// Loads the configuration, from `custom` when given or from the default
/// search paths otherwise.
///
/// A missing file in the default locations is not an error: the defaults
/// are returned with no path.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if `custom` does not exist, or any read
/// or parse error of the selected file.
pub fn load(custom: Option<&Path>) -> Result<(WinstateConfig, Option<PathBuf>), ConfigError> {
    let result = custom.map_or_else(load_config, load_config_from_path);

    match result {
        Ok((config, path)) => Ok((config, Some(path))),
        Err(ConfigError::NotFound) if custom.is_none() => Ok((WinstateConfig::default(), None)),
        Err(err) => Err(err),
    }
}

/// JSON Schema describing the configuration file.
///
/// # Errors
///
/// Returns an error if the schema cannot be serialized.
pub fn schema_json() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(WinstateConfig);
    serde_json::to_string_pretty(&schema)
}
