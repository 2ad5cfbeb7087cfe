use std::fs;
use std::path::Path;

use super::Mock4rsConfig;
use crate::errors::{ErrorCode, Mock4rsError};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = ".mock4rs.toml";

/// Read the raw contents of a configuration file.
pub fn read_config_file(path: &Path) -> Result<String, std::io::Error> {
    fs::read_to_string(path)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_and_validate_config(contents: &str) -> Result<Mock4rsConfig, String> {
    let config = toml::from_str::<Mock4rsConfig>(contents)
        .map_err(|e| format!("Failed to parse {CONFIG_FILE_NAME}: {e}"))?;

    if config.command.is_empty() {
        return Err(String::from("`command` must name an executable"));
    }
    if config.entry_points.iter().any(|name| name.trim().is_empty()) {
        return Err(String::from("`entry_points` may not contain empty names"));
    }
    if let Err(e) = config.exclude_patterns() {
        return Err(format!("invalid `exclude` pattern: {e}"));
    }
    config.runtime_dependency.validate()?;

    Ok(config)
}

/// Load the configuration for the crate at `crate_root`.
///
/// An explicit `config_path` must exist. Without one, `.mock4rs.toml` in the
/// crate root is used when present, otherwise the defaults. Relative paths in
/// the file are resolved against the directory holding it.
pub fn load_config(
    crate_root: &Path,
    config_path: Option<&Path>,
) -> Result<Mock4rsConfig, Mock4rsError> {
    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (crate_root.join(CONFIG_FILE_NAME), false),
    };

    let contents = match read_config_file(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Mock4rsConfig::default());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Mock4rsError::Config {
                code: ErrorCode::CONFIG_FILE_NOT_FOUND,
                message: String::from("configuration file not found"),
                path: Some(path),
            });
        }
        Err(e) => return Err(Mock4rsError::from_io_error(e, path)),
    };

    let mut config = parse_and_validate_config(&contents)
        .map_err(|message| Mock4rsError::config_with_path(message, &path))?;

    let base = path.parent().unwrap_or(crate_root);
    config.runtime_dependency = config.runtime_dependency.resolved(base);
    if let Some(destination) = &config.destination {
        if destination.is_relative() {
            config.destination = Some(base.join(destination));
        }
    }

    debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}
