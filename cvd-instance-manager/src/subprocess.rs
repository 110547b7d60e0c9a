//! Blocking subprocess execution, grounded on `instance_manager.cpp`'s
//! `RunCommand` (`subprocess.Wait` checked against `CLD_EXITED &&
//! si_status == 0`). This daemon is a synchronous CLI tool invoked once
//! per request, not a long-lived async service (see `DESIGN.md`), so a
//! blocking `std::process::Command::status()` call plays the same role
//! `Wait` does in the original: the handler thread parks until the child
//! exits, with no cooperative suspension in between.

use std::process::Command;

use cvd_error::{Action, Error, ErrorSource, Resource, Result};

/// Runs `command` to completion and succeeds only if it exited with status
/// zero. A non-zero exit or a failure to even start the child both surface
/// as `ExternalTool` failures; callers that tolerate a failing exit (the
/// `--clear_instance_dirs` retry in `issue_stop_command`) inspect the error
/// themselves rather than this function doing anything softer.
pub fn run_to_completion(mut command: Command, tool_name: &str) -> Result<()> {
    let status = command.status().map_err(|e| {
        Error::new(
            ErrorSource::Io(std::sync::Arc::new(e)),
            Action::Starting,
            Resource::Tool {
                name: tool_name.to_string(),
            },
        )
    })?;
    if !status.success() {
        return Err(Error::new(
            ErrorSource::ExternalTool(format!(
                "{tool_name} exited with {}",
                status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "no exit code (terminated by signal)".to_string())
            )),
            Action::Starting,
            Resource::Tool {
                name: tool_name.to_string(),
            },
        ));
    }
    Ok(())
}
