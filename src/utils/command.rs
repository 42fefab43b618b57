//! Local command execution primitives.

use std::process::Command;

/// Run a command, returning None on failure instead of error.
///
/// Useful when command failure is expected/acceptable (e.g., looking up the
/// host name for a deployment record).
pub fn run_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}
