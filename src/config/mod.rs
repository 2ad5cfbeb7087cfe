//! `.mock4rs.toml` configuration.

mod loader;

pub use loader::{
    load_config, parse_and_validate_config, read_config_file, CONFIG_FILE_NAME,
};

use crate::instrument::InstrumentOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for staging and testing one crate.
///
/// Every key is optional; command line flags override file values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Mock4rsConfig {
    /// Directory receiving the staged copy. Defaults to a directory under
    /// the system temp dir.
    pub destination: Option<PathBuf>,

    /// Command run inside the staged crate.
    pub command: Vec<String>,

    /// Glob patterns, relative to the crate root, of sources copied without
    /// instrumentation.
    pub exclude: Vec<String>,

    /// File-scope functions that are never rewritten.
    pub entry_points: Vec<String>,

    /// Log and skip traits that cannot be mocked instead of failing.
    pub skip_unsupported_interfaces: bool,

    /// How staged crates depend on the runtime.
    pub runtime_dependency: RuntimeDependency,
}

impl Default for Mock4rsConfig {
    fn default() -> Self {
        Self {
            destination: None,
            command: vec![String::from("cargo"), String::from("test")],
            exclude: Vec::new(),
            entry_points: vec![String::from("main")],
            skip_unsupported_interfaces: false,
            runtime_dependency: RuntimeDependency::default(),
        }
    }
}

impl Mock4rsConfig {
    #[must_use]
    pub fn instrument_options(&self) -> InstrumentOptions {
        InstrumentOptions {
            entry_points: self.entry_points.clone(),
            skip_unsupported_interfaces: self.skip_unsupported_interfaces,
            ..InstrumentOptions::default()
        }
    }

    /// Destination directory, falling back to `<tmp>/mock4rs`.
    #[must_use]
    pub fn destination_or_default(&self) -> PathBuf {
        self.destination
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("mock4rs"))
    }

    /// Compiled exclude patterns.
    pub fn exclude_patterns(&self) -> Result<Vec<glob::Pattern>, glob::PatternError> {
        self.exclude
            .iter()
            .map(|pattern| glob::Pattern::new(pattern))
            .collect()
    }
}

/// Source of the `mock4rs` dependency added to staged manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeDependency {
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub git: Option<String>,
    pub branch: Option<String>,
    pub rev: Option<String>,
}

impl Default for RuntimeDependency {
    fn default() -> Self {
        Self {
            version: Some(String::from(env!("CARGO_PKG_VERSION"))),
            path: None,
            git: None,
            branch: None,
            rev: None,
        }
    }
}

impl RuntimeDependency {
    /// Resolve a relative `path` against `base`, the directory of the
    /// configuration file.
    #[must_use]
    pub fn resolved(&self, base: &Path) -> Self {
        let mut resolved = self.clone();
        if let Some(path) = &self.path {
            if path.is_relative() {
                resolved.path = Some(base.join(path));
            }
        }
        resolved
    }

    /// Manifest table for `[dependencies] mock4rs = { .. }`.
    ///
    /// The runtime is always pulled without default features, so staged
    /// crates do not compile the transformer.
    #[must_use]
    pub fn to_manifest_entry(&self) -> toml::Table {
        let mut entry = toml::Table::new();
        if let Some(version) = &self.version {
            entry.insert("version".into(), version.clone().into());
        }
        if let Some(path) = &self.path {
            entry.insert("path".into(), path.display().to_string().into());
        }
        if let Some(git) = &self.git {
            entry.insert("git".into(), git.clone().into());
        }
        if let Some(branch) = &self.branch {
            entry.insert("branch".into(), branch.clone().into());
        }
        if let Some(rev) = &self.rev {
            entry.insert("rev".into(), rev.clone().into());
        }
        entry.insert("default-features".into(), false.into());
        entry
    }

    fn validate(&self) -> Result<(), String> {
        if self.version.is_none() && self.path.is_none() && self.git.is_none() {
            return Err(String::from(
                "runtime_dependency needs at least one of `version`, `path` or `git`",
            ));
        }
        if self.git.is_none() && (self.branch.is_some() || self.rev.is_some()) {
            return Err(String::from(
                "runtime_dependency `branch` and `rev` require `git`",
            ));
        }
        Ok(())
    }
}
