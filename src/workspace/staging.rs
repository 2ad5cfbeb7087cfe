use super::discovery::{CrateLayout, CrateWalker, MANIFEST_FILE};
use crate::config::{Mock4rsConfig, RuntimeDependency};
use crate::errors::{Mock4rsError, Result};
use crate::instrument::{
    borrowing_types_of, instrument_file_in_place, BorrowingTypes, InstrumentOptions,
};
use crate::observability::{increment_processed, set_current_file, set_phase, set_progress, RunPhase};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, info, warn};

const RUNTIME_CRATE: &str = "mock4rs";
const DEPENDENCY_TABLES: [&str; 3] = ["dependencies", "dev-dependencies", "build-dependencies"];
/// Tables followed when staging the path dependencies of a dependency.
const TRANSITIVE_TABLES: [&str; 2] = ["dependencies", "build-dependencies"];

/// Original crate root, canonicalized when possible, to its staged copy.
pub type Relocations = HashMap<PathBuf, PathBuf>;

/// A rewritten copy of a crate under the destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCrate {
    pub root: PathBuf,
    /// Rewritten copies of the crate's path dependencies, in staging order.
    pub dependencies: Vec<PathBuf>,
    pub files_instrumented: usize,
    pub functions_rewritten: usize,
    pub mocks_synthesized: usize,
}

impl StagedCrate {
    /// Delete the staged tree and the copies of its path dependencies.
    pub fn remove(&self) -> Result<()> {
        remove_tree(&self.root)?;
        let dependencies = dependency_dir(&self.root);
        if dependencies.exists() {
            remove_tree(&dependencies)?;
        }
        Ok(())
    }
}

/// Directories a staging run of crate `name` writes under `destination`:
/// the crate copy and the directory holding its path dependencies.
pub fn staged_paths(destination: &Path, name: &str) -> [PathBuf; 2] {
    let root = destination.join(name);
    [dependency_dir(&root), root]
}

fn dependency_dir(root: &Path) -> PathBuf {
    let mut name = root.file_name().unwrap_or_default().to_os_string();
    name.push(".deps");
    root.with_file_name(name)
}

/// Copy the crate of `layout` to `<destination>/<name>`, rewrite its sources
/// and make its manifest depend on the runtime.
///
/// Path dependencies are user code too: each one is staged and rewritten
/// under `<destination>/<name>.deps/`, once, and the staged manifests point
/// at those copies. Registry and git dependencies are left alone.
///
/// A stale tree from an earlier run is replaced. When staging fails halfway
/// the partial trees are left for the caller to remove.
pub fn stage_crate(
    layout: &CrateLayout,
    destination: &Path,
    config: &Mock4rsConfig,
) -> Result<StagedCrate> {
    let _phase = set_phase(RunPhase::Staging);
    let [dependencies, target] = staged_paths(destination, &layout.name);
    for stale in [&target, &dependencies] {
        if stale.exists() {
            warn!(path = %stale.display(), "replacing stale staged crate");
            remove_tree(stale)?;
        }
    }

    let mut stager = Stager {
        config,
        dependency_dir: dependencies,
        relocations: Relocations::new(),
        names: HashSet::new(),
        staged: StagedCrate {
            root: target.clone(),
            dependencies: Vec::new(),
            files_instrumented: 0,
            functions_rewritten: 0,
            mocks_synthesized: 0,
        },
    };
    stager.stage(layout, &target, &DEPENDENCY_TABLES)?;
    let staged = stager.staged;

    info!(
        krate = %layout.name,
        path = %staged.root.display(),
        dependencies = staged.dependencies.len(),
        files = staged.files_instrumented,
        functions = staged.functions_rewritten,
        mocks = staged.mocks_synthesized,
        "staged instrumented crate"
    );
    Ok(staged)
}

struct Stager<'a> {
    config: &'a Mock4rsConfig,
    dependency_dir: PathBuf,
    relocations: Relocations,
    /// Directory names taken under `dependency_dir`.
    names: HashSet<String>,
    staged: StagedCrate,
}

impl Stager<'_> {
    /// Stage one crate, then the path dependencies listed in its `tables`,
    /// then patch its manifest.
    fn stage(&mut self, layout: &CrateLayout, target: &Path, tables: &[&str]) -> Result<()> {
        self.relocations
            .insert(canonical(&layout.root), target.to_path_buf());

        fs::create_dir_all(target).map_err(|e| Mock4rsError::from_io_error(e, target))?;
        set_progress(0, layout.file_count());
        for relative in layout.copied.iter().chain(&layout.instrumentable) {
            let _file = set_current_file(relative);
            copy_file(&layout.root.join(relative), &target.join(relative))?;
            increment_processed();
        }

        let mut options = self.config.instrument_options();
        options.borrowing_types = crate_borrowing_types(layout, target)?;
        instrument_sources(layout, target, &options, &mut self.staged)?;

        let manifest = target.join(MANIFEST_FILE);
        let contents =
            fs::read_to_string(&manifest).map_err(|e| Mock4rsError::from_io_error(e, &manifest))?;
        let parsed: Table = toml::from_str(&contents)
            .map_err(|e| Mock4rsError::manifest(format!("invalid manifest: {e}"), &manifest))?;
        for dependency in path_dependencies(&parsed, &layout.root, tables) {
            self.stage_dependency(&dependency)?;
        }

        let patched = patch_manifest(
            &contents,
            &layout.root,
            &self.relocations,
            &self.config.runtime_dependency,
        )
        .map_err(|message| Mock4rsError::manifest(message, &manifest))?;
        fs::write(&manifest, patched).map_err(|e| Mock4rsError::from_io_error(e, &manifest))?;
        Ok(())
    }

    fn stage_dependency(&mut self, original: &Path) -> Result<()> {
        let root = canonical(original);
        if self.relocations.contains_key(&root) {
            return Ok(());
        }
        if !root.join(MANIFEST_FILE).is_file() {
            warn!(path = %original.display(), "path dependency not found, leaving it uninstrumented");
            return Ok(());
        }

        let layout = CrateWalker::new(&root).walk()?;
        let claimed = self.claim_name(&layout.name);
        let target = self.dependency_dir.join(claimed);
        debug!(krate = %layout.name, path = %target.display(), "staging path dependency");
        self.stage(&layout, &target, &TRANSITIVE_TABLES)?;
        self.staged.dependencies.push(target);
        Ok(())
    }

    /// `name`, or `name-2`, `name-3`.. when two dependencies share a name.
    fn claim_name(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut suffix = 1;
        while !self.names.insert(candidate.clone()) {
            suffix += 1;
            candidate = format!("{name}-{suffix}");
        }
        candidate
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Lifetime-generic types declared anywhere in the crate's sources.
fn crate_borrowing_types(layout: &CrateLayout, target: &Path) -> Result<BorrowingTypes> {
    let mut found = BorrowingTypes::default();
    for relative in &layout.instrumentable {
        let path = target.join(relative);
        let source = fs::read_to_string(&path).map_err(|e| Mock4rsError::from_io_error(e, &path))?;
        let declared =
            borrowing_types_of(&source).map_err(|err| Mock4rsError::instrument(err, relative))?;
        found.extend(&declared);
    }
    Ok(found)
}

fn instrument_sources(
    layout: &CrateLayout,
    target: &Path,
    options: &InstrumentOptions,
    staged: &mut StagedCrate,
) -> Result<()> {
    let _phase = set_phase(RunPhase::Instrumenting);
    for relative in &layout.instrumentable {
        let _file = set_current_file(relative);
        let instrumented = instrument_file_in_place(&target.join(relative), options)
            .map_err(|err| Mock4rsError::instrument(err, relative))?;

        if instrumented.is_modified() {
            staged.files_instrumented += 1;
        }
        staged.functions_rewritten += instrumented.functions_rewritten;
        staged.mocks_synthesized += instrumented.mocks_synthesized;
        for skipped in &instrumented.skipped {
            debug!(file = %relative.display(), item = %skipped.name, reason = %skipped.reason, "skipped");
        }
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| Mock4rsError::from_io_error(e, parent))?;
    }
    fs::copy(from, to).map_err(|e| Mock4rsError::from_io_error(e, from))?;
    Ok(())
}

fn remove_tree(path: &Path) -> Result<()> {
    debug!(path = %path.display(), "removing directory");
    fs::remove_dir_all(path).map_err(|e| Mock4rsError::from_io_error(e, path))
}

/// Resolved locations of the `path` dependencies in `tables` of a manifest,
/// platform-specific tables included. The runtime itself is never staged.
fn path_dependencies(manifest: &Table, original_root: &Path, tables: &[&str]) -> Vec<PathBuf> {
    let mut scopes = vec![manifest];
    if let Some(Value::Table(targets)) = manifest.get("target") {
        scopes.extend(targets.iter().filter_map(|(_, platform)| platform.as_table()));
    }

    let mut found = Vec::new();
    for scope in scopes {
        for name in tables {
            let Some(Value::Table(dependencies)) = scope.get(*name) else {
                continue;
            };
            for (key, spec) in dependencies.iter() {
                let Value::Table(spec) = spec else {
                    continue;
                };
                let package = spec.get("package").and_then(Value::as_str).unwrap_or(key.as_str());
                if package == RUNTIME_CRATE {
                    continue;
                }
                if let Some(path) = spec.get("path").and_then(Value::as_str) {
                    found.push(original_root.join(path));
                }
            }
        }
    }
    found
}

/// Rewrite a manifest for its staged location.
///
/// - `mock4rs` is added to `[dependencies]` unless the crate already lists it
///   there, since rewritten library code calls the runtime.
/// - `path` dependencies found in `relocations` point at their staged copy;
///   other relative paths are pointed back at `original_root`.
/// - An empty `[workspace]` table keeps cargo from adopting an enclosing
///   workspace at the destination.
pub fn patch_manifest(
    contents: &str,
    original_root: &Path,
    relocations: &Relocations,
    runtime: &RuntimeDependency,
) -> std::result::Result<String, String> {
    let mut manifest: Table =
        toml::from_str(contents).map_err(|e| format!("invalid manifest: {e}"))?;
    let anchor = |dependencies: &mut Table| {
        relocate_path_dependencies(dependencies, original_root, relocations);
    };

    for name in DEPENDENCY_TABLES {
        if let Some(Value::Table(dependencies)) = manifest.get_mut(name) {
            anchor(dependencies);
        }
    }
    if let Some(Value::Table(targets)) = manifest.get_mut("target") {
        for (_, platform) in targets.iter_mut() {
            let Value::Table(platform) = platform else {
                continue;
            };
            for name in DEPENDENCY_TABLES {
                if let Some(Value::Table(dependencies)) = platform.get_mut(name) {
                    anchor(dependencies);
                }
            }
        }
    }
    if let Some(Value::Table(patches)) = manifest.get_mut("patch") {
        for (_, registry) in patches.iter_mut() {
            if let Value::Table(registry) = registry {
                anchor(registry);
            }
        }
    }

    let dependencies = manifest
        .entry("dependencies")
        .or_insert(Value::Table(Table::new()));
    let Value::Table(dependencies) = dependencies else {
        return Err(String::from("`dependencies` is not a table"));
    };
    if !dependencies.contains_key(RUNTIME_CRATE) {
        dependencies.insert(
            RUNTIME_CRATE.into(),
            Value::Table(runtime.to_manifest_entry()),
        );
    }

    manifest
        .entry("workspace")
        .or_insert(Value::Table(Table::new()));

    toml::to_string(&manifest).map_err(|e| format!("cannot serialize manifest: {e}"))
}

fn relocate_path_dependencies(
    dependencies: &mut Table,
    original_root: &Path,
    relocations: &Relocations,
) {
    for (_, spec) in dependencies.iter_mut() {
        let Value::Table(spec) = spec else {
            continue;
        };
        let Some(Value::String(path)) = spec.get_mut("path") else {
            continue;
        };
        let original = original_root.join(path.as_str());
        if let Some(staged) = relocations.get(&canonical(&original)) {
            *path = staged.display().to_string();
        } else if Path::new(path.as_str()).is_relative() {
            *path = original.display().to_string();
        }
    }
}
