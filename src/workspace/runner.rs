use crate::errors::{Mock4rsError, Result};
use crate::observability::{set_phase, RunPhase};
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::info;

/// Run `command` inside `dir` with inherited stdio and wait for it.
///
/// The program is looked up on `PATH` first so a missing tool is reported
/// as such rather than as a spawn failure.
pub fn run_command(command: &[String], dir: &Path) -> Result<ExitStatus> {
    let _phase = set_phase(RunPhase::Testing);
    let (program, args) = command
        .split_first()
        .ok_or_else(|| Mock4rsError::config("the test command is empty"))?;

    let executable =
        which::which(program).map_err(|_| Mock4rsError::command_not_found(program.as_str()))?;

    info!(command = %command.join(" "), dir = %dir.display(), "running test command");
    Command::new(executable)
        .args(args)
        .current_dir(dir)
        .status()
        .map_err(|e| Mock4rsError::command_failed(program.as_str(), e.to_string()))
}
