use crate::errors::{Mock4rsError, Result};
use glob::{MatchOptions, Pattern};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const MANIFEST_FILE: &str = "Cargo.toml";

/// Files of one crate, split by how staging treats them. Paths are relative
/// to `root` and sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrateLayout {
    pub root: PathBuf,
    pub name: String,
    /// Library and binary sources that are rewritten.
    pub instrumentable: Vec<PathBuf>,
    /// Everything else: manifests, tests, benches, build scripts, assets.
    pub copied: Vec<PathBuf>,
}

impl CrateLayout {
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.instrumentable.len() + self.copied.len()
    }
}

/// Walks a crate root, honoring `.gitignore` and skipping build output.
pub struct CrateWalker {
    root: PathBuf,
    exclude: Vec<Pattern>,
}

impl CrateWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
        }
    }

    /// Sources matching any of `patterns` are copied without rewriting.
    pub fn with_exclude_patterns(mut self, patterns: Vec<Pattern>) -> Self {
        self.exclude = patterns;
        self
    }

    pub fn walk(&self) -> Result<CrateLayout> {
        let manifest = self.root.join(MANIFEST_FILE);
        let name = read_crate_name(&manifest)?;

        let mut instrumentable = Vec::new();
        let mut copied = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .filter_entry(|entry| {
                let file_name = entry.file_name();
                !(entry.depth() == 1 && (file_name == "target" || file_name == ".git"))
            })
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| Mock4rsError::io(e.to_string(), Some(self.root.clone())))?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };

            if self.is_instrumentable(relative) {
                instrumentable.push(relative.to_path_buf());
            } else {
                copied.push(relative.to_path_buf());
            }
        }

        instrumentable.sort();
        copied.sort();
        debug!(
            krate = %name,
            instrumentable = instrumentable.len(),
            copied = copied.len(),
            "discovered crate files"
        );

        Ok(CrateLayout {
            root: self.root.clone(),
            name,
            instrumentable,
            copied,
        })
    }

    fn is_instrumentable(&self, relative: &Path) -> bool {
        let under_src = matches!(
            relative.components().next(),
            Some(Component::Normal(first)) if first == "src"
        );
        let is_rust = relative.extension().is_some_and(|ext| ext == "rs");
        under_src && is_rust && !self.is_excluded(relative)
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        self.exclude
            .iter()
            .any(|pattern| pattern.matches_path_with(relative, options))
    }
}

/// Read `package.name` from a manifest.
pub fn read_crate_name(manifest: &Path) -> Result<String> {
    let contents =
        fs::read_to_string(manifest).map_err(|e| Mock4rsError::from_io_error(e, manifest))?;
    let table: toml::Table = toml::from_str(&contents)
        .map_err(|e| Mock4rsError::manifest(format!("invalid manifest: {e}"), manifest))?;

    table
        .get("package")
        .and_then(|package| package.get("name"))
        .and_then(|name| name.as_str())
        .map(String::from)
        .ok_or_else(|| {
            Mock4rsError::manifest(
                "no `package.name`; point mock4rs at a package, not a virtual workspace",
                manifest,
            )
        })
}
