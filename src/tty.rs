//! Terminal I/O for the CLI: TTY detection and confirmation prompts.

use std::io::{self, BufRead, IsTerminal, Write};

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

pub fn prompt(message: &str) -> drydock::Result<String> {
    eprint!("{}", message);
    io::stderr().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).map_err(|e| {
        drydock::Error::new(
            drydock::ErrorCode::InternalIoError,
            format!("Failed to read input: {}", e),
            serde_json::Value::Null,
        )
    })?;

    Ok(line.trim().to_string())
}

/// Ask a yes/no question; anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> drydock::Result<bool> {
    let answer = prompt(&format!("{} (y/N) ", question))?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}
