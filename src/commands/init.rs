use crate::config::CONFIG_FILE_NAME;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = r#"# mock4rs configuration

# Where the instrumented copy is staged (default: <tmp>/mock4rs).
# destination = "target/mock4rs"

# Test command run inside the staged copy.
command = ["cargo", "test"]

# Sources copied without rewriting, as globs relative to the crate root.
exclude = []

# File-scope functions that are never rewritten.
entry_points = ["main"]

# Log and skip traits that cannot be mocked instead of failing.
skip_unsupported_interfaces = false

# How the staged crate depends on the runtime. Use `path` or `git` to test
# against an unreleased mock4rs.
[runtime_dependency]
version = "@VERSION@"
"#;

/// Contents written by `mock4rs init`.
#[must_use]
pub fn default_config_text() -> String {
    DEFAULT_CONFIG.replace("@VERSION@", env!("CARGO_PKG_VERSION"))
}

/// Write `.mock4rs.toml` into `crate_dir`, returning its path.
pub fn init_config(crate_dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = crate_dir.join(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        );
    }

    fs::write(&config_path, default_config_text())
        .with_context(|| format!("cannot write {}", config_path.display()))?;
    println!("Created {} configuration file", config_path.display());

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_and_validate_config, Mock4rsConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn template_parses_to_defaults() {
        let config = parse_and_validate_config(&default_config_text()).unwrap();
        assert_eq!(config, Mock4rsConfig::default());
    }

    #[test]
    fn existing_file_needs_force() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path(), false).unwrap();
        assert!(init_config(dir.path(), false).is_err());
        assert!(init_config(dir.path(), true).is_ok());
    }
}
