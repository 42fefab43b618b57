use crate::alias::Alias;
use crate::error::{Error, Result};
use std::process::{Command, Output};

pub struct SshClient {
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the alias has no host or a localhost one.
    pub is_local: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }

    /// Stderr if there is any, otherwise stdout.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(out: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        }
    }
}

impl SshClient {
    pub fn from_alias(alias: &Alias) -> Result<Self> {
        let identity_file = match &alias.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        alias.name.clone(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        Ok(Self {
            host: alias.host.clone().unwrap_or_default(),
            user: alias.user.clone().filter(|u| !u.is_empty()),
            port: alias.port,
            identity_file,
            is_local: alias.is_local(),
        })
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Never prompt; give up on dead links.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        match &self.user {
            Some(user) => args.push(format!("{}@{}", user, self.host)),
            None => args.push(self.host.clone()),
        }

        args.push(command.to_string());
        args
    }

    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command, 3)
    }

    fn execute_with_retry(&self, command: &str, max_attempts: u32) -> CommandOutput {
        let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3

        let mut last = CommandOutput::failed(-1, "SSH retry exhausted");
        for attempt in 0..max_attempts {
            let result = self.execute_once(command);

            // Only retry on transient connection errors, not command failures
            if result.success || attempt + 1 >= max_attempts || !is_transient_ssh_error(&result) {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize + 1).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection failed (attempt {}/{}), retrying in {}s...",
                attempt + 1,
                max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
            last = result;
        }

        last
    }

    fn execute_once(&self, command: &str) -> CommandOutput {
        if self.is_local {
            return execute_local_command(command);
        }

        let args = self.build_ssh_args(command);

        match Command::new("ssh").args(&args).output() {
            Ok(out) => out.into(),
            Err(e) => CommandOutput::failed(-1, format!("SSH error: {}", e)),
        }
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    match cmd.output() {
        Ok(out) => out.into(),
        Err(e) => CommandOutput::failed(-1, format!("Command error: {}", e)),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve hostname",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}
