//! Reading configuration from disk.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::ToolMeshConfig;

/// Parses and validates configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
/// [`ConfigError::Invalid`] for values that fail validation.
pub fn from_toml_str(input: &str) -> ConfigResult<ToolMeshConfig> {
    let config: ToolMeshConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, otherwise the
/// errors of [`from_toml_str`].
pub fn load(path: &Path) -> ConfigResult<ToolMeshConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = from_toml_str(&raw)?;
    debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Loads the file when a path is given, otherwise returns the defaults.
///
/// # Errors
///
/// See [`load`].
pub fn load_or_default(path: Option<&Path>) -> ConfigResult<ToolMeshConfig> {
    match path {
        Some(path) => load(path),
        None => {
            debug!("no config file given; using defaults");
            Ok(ToolMeshConfig::default())
        }
    }
}
