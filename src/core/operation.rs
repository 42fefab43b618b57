//! The boundary between deploy logic and the outside world.
//!
//! Actions never build transports themselves; they ask a `SiteOperations`
//! implementation to run a site-CLI operation or a raw shell command against
//! an alias and only look at the outcome.

use crate::alias::Alias;
use crate::ssh::{CommandOutput, SshClient};
use crate::utils::shell;

/// A named option passed to a site-CLI operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOption {
    pub name: String,
    pub value: Option<String>,
}

impl CliOption {
    pub fn flag(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
        }
    }

    pub fn value(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.into()),
        }
    }

    pub fn render(&self) -> String {
        match &self.value {
            Some(value) => format!("--{}={}", self.name, shell::quote_arg(value)),
            None => format!("--{}", self.name),
        }
    }
}

pub trait SiteOperations {
    /// Run a site-CLI operation (`variable-get`, `sql-dump`, ...) on the target.
    fn invoke(
        &self,
        target: &Alias,
        operation: &str,
        args: &[String],
        options: &[CliOption],
    ) -> CommandOutput;

    /// Run a shell command in the target's root directory.
    fn exec_shell(&self, target: &Alias, command: &str) -> CommandOutput;
}

/// Runs everything through `sh -c` locally or over SSH.
pub struct ShellOperations {
    site_cli: String,
}

impl ShellOperations {
    pub fn new(site_cli: impl Into<String>) -> Self {
        Self {
            site_cli: site_cli.into(),
        }
    }

    pub fn render_invocation(
        &self,
        target: &Alias,
        operation: &str,
        args: &[String],
        options: &[CliOption],
    ) -> String {
        let mut parts = vec![self.site_cli.clone()];
        if let Some(uri) = target.uri.as_deref().filter(|u| !u.is_empty()) {
            parts.push(CliOption::value("uri", uri).render());
        }
        parts.push(shell::quote_arg(operation));
        if !args.is_empty() {
            parts.push(shell::quote_args(args));
        }
        parts.extend(options.iter().map(CliOption::render));
        parts.join(" ")
    }
}

impl SiteOperations for ShellOperations {
    fn invoke(
        &self,
        target: &Alias,
        operation: &str,
        args: &[String],
        options: &[CliOption],
    ) -> CommandOutput {
        let command = self.render_invocation(target, operation, args, options);
        self.exec_shell(target, &command)
    }

    fn exec_shell(&self, target: &Alias, command: &str) -> CommandOutput {
        let client = match SshClient::from_alias(target) {
            Ok(client) => client,
            Err(err) => return CommandOutput::failed(-1, err.message),
        };

        let full = format!("cd {} && {}", shell::quote_path(&target.root), command);
        client.execute(&full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_render_as_long_flags() {
        assert_eq!(CliOption::flag("yes").render(), "--yes");
        assert_eq!(
            CliOption::value("result-file", "/tmp/a b.sql").render(),
            "--result-file='/tmp/a b.sql'"
        );
    }

    #[test]
    fn invocation_includes_uri_args_and_options() {
        let ops = ShellOperations::new("drush");
        let mut alias = Alias::local("prod", "/var/www");
        alias.uri = Some("example.com".to_string());

        let rendered = ops.render_invocation(
            &alias,
            "variable-set",
            &["maintenance_mode".to_string(), "1".to_string()],
            &[CliOption::flag("exact"), CliOption::flag("yes")],
        );
        assert_eq!(
            rendered,
            "drush --uri=example.com variable-set maintenance_mode 1 --exact --yes"
        );
    }

    #[test]
    fn exec_shell_runs_in_alias_root() {
        let dir = tempfile::tempdir().unwrap();
        let alias = Alias::local("dev", &dir.path().to_string_lossy());
        let ops = ShellOperations::new("drush");

        let output = ops.exec_shell(&alias, "pwd");
        assert!(output.success);
        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn exec_shell_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let alias = Alias::local("dev", &dir.path().to_string_lossy());
        let output = ShellOperations::new("drush").exec_shell(&alias, "exit 3");
        assert!(!output.success);
        assert_eq!(output.exit_code, 3);
    }
}
