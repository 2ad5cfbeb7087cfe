use crate::config::load_config;
use crate::errors::Mock4rsError;
use crate::instrument::instrument_file;
use crate::observability::{set_current_file, set_phase, RunPhase};
use anyhow::Result;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Instrument one file and write the result to `out`.
///
/// The configuration is looked up in the current directory unless
/// `config_path` names a file.
pub fn print_instrumented(
    path: &Path,
    config_path: Option<&Path>,
    skip_unsupported: bool,
    out: &mut impl Write,
) -> Result<()> {
    let mut config = load_config(Path::new("."), config_path)?;
    if skip_unsupported {
        config.skip_unsupported_interfaces = true;
    }

    let _phase = set_phase(RunPhase::Instrumenting);
    let _file = set_current_file(path);
    let instrumented = instrument_file(path, &config.instrument_options())
        .map_err(|err| Mock4rsError::instrument(err, path))?;

    info!(
        functions = instrumented.functions_rewritten,
        mocks = instrumented.mocks_synthesized,
        skipped = instrumented.skipped.len(),
        "instrumented {}",
        path.display()
    );
    out.write_all(instrumented.source.as_bytes())?;
    Ok(())
}
