//! Crate-level glue around the transformer: find the sources of a crate,
//! stage a rewritten copy of it and run the tests there.

pub mod discovery;
pub mod runner;
pub mod staging;

pub use discovery::{read_crate_name, CrateLayout, CrateWalker};
pub use runner::run_command;
pub use staging::{patch_manifest, stage_crate, staged_paths, Relocations, StagedCrate};

use crate::config::Mock4rsConfig;
use crate::errors::{Mock4rsError, Result};
use crate::observability::{set_phase, RunPhase};
use std::path::Path;

/// Discover the files of the crate at `root` using the configured excludes.
pub fn discover_crate(root: &Path, config: &Mock4rsConfig) -> Result<CrateLayout> {
    let _phase = set_phase(RunPhase::Discovery);
    let patterns = config
        .exclude_patterns()
        .map_err(|e| Mock4rsError::config(format!("invalid `exclude` pattern: {e}")))?;
    CrateWalker::new(root)
        .with_exclude_patterns(patterns)
        .walk()
}
