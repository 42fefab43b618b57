use clap::Args;
use serde_json::{json, Map, Value};

use drydock::alias::{self, Alias};
use drydock::defaults::{self, Defaults};
use drydock::log::{DeployLog, StderrLog};
use drydock::operation::ShellOperations;

pub type CmdResult<T> = drydock::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// How a command asks before touching the site.
#[derive(Args, Default, Debug)]
pub struct ConfirmArgs {
    /// Answer yes to the confirmation
    #[arg(short = 'y', long, conflicts_with = "no")]
    pub yes: bool,

    /// Answer no to the confirmation (show the plan and stop)
    #[arg(short = 'n', long)]
    pub no: bool,

    /// Do not ask for confirmation
    #[arg(long)]
    pub no_confirm: bool,
}

impl ConfirmArgs {
    /// `Ok(false)` means the user declined; the caller aborts with exit 0.
    pub fn confirmed(&self, question: &str) -> drydock::Result<bool> {
        if self.no {
            return Ok(false);
        }
        if self.yes || self.no_confirm {
            return Ok(true);
        }
        if !crate::tty::is_stdin_tty() {
            return Err(drydock::Error::validation_invalid_argument(
                "confirm",
                "Cannot ask for confirmation without a terminal",
                None,
                None,
            )
            .with_hint("Pass --yes to proceed without a prompt"));
        }
        crate::tty::confirm(question)
    }
}

/// Alias, defaults and transport shared by the site-touching commands.
pub(crate) struct Session {
    pub alias: Alias,
    pub defaults: Defaults,
    pub ops: ShellOperations,
    pub log: StderrLog,
}

impl Session {
    pub fn open(raw_alias: &str, command_line: &Map<String, Value>) -> drydock::Result<Self> {
        let alias = alias::load(raw_alias)?;
        let defaults = defaults::load_defaults();
        let site_cli = drydock::deploy::settings_for(&alias, &defaults, command_line.clone())
            .get_str("site-cli")
            .unwrap_or_else(|| defaults.site_cli.clone());

        Ok(Self {
            alias,
            defaults,
            ops: ShellOperations::new(site_cli),
            log: StderrLog::default(),
        })
    }

    pub fn abort(&self) {
        self.log.info("Aborting.");
    }
}

/// Collects explicit flags into the command-line settings layer.
#[derive(Default)]
pub(crate) struct SettingsBuilder {
    map: Map<String, Value>,
}

impl SettingsBuilder {
    pub fn flag(mut self, key: &str, on: bool) -> Self {
        if on {
            self.map.insert(key.to_string(), json!(true));
        }
        self
    }

    pub fn value<T: Into<Value>>(mut self, key: &str, value: Option<T>) -> Self {
        if let Some(value) = value {
            self.map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Trailing `--key value` pairs override the typed flags.
    pub fn extra(mut self, extra: &[String]) -> drydock::Result<Map<String, Value>> {
        self.map.extend(parse_kv_flags(extra)?);
        Ok(self.map)
    }
}

// ============================================================================
// Dynamic settings (CLI layer)
// ============================================================================

/// Parse `--key value` pairs into a settings map. A flag followed by another
/// flag, or by nothing, is `true`.
fn parse_kv_flags(extra: &[String]) -> drydock::Result<Map<String, Value>> {
    let mut obj = Map::new();
    let mut iter = extra.iter().peekable();

    while let Some(arg) = iter.next() {
        let key = arg.strip_prefix("--").ok_or_else(|| {
            drydock::Error::validation_invalid_argument(
                "extra",
                format!("Expected a --key, got '{}'", arg),
                Some(arg.clone()),
                None,
            )
        })?;

        if let Some((key, value)) = key.split_once('=') {
            obj.insert(key.to_string(), parse_value(value));
            continue;
        }

        let value = match iter.peek() {
            Some(next) if !next.starts_with("--") => {
                parse_value(iter.next().map_or("", String::as_str))
            }
            _ => json!(true),
        };
        obj.insert(key.to_string(), value);
    }

    Ok(obj)
}

/// Parse a string value into appropriate JSON type.
/// Order: JSON literal → bool → number → string
fn parse_value(s: &str) -> Value {
    if let Ok(v) = serde_json::from_str(s) {
        return v;
    }
    if s == "true" {
        return json!(true);
    }
    if s == "false" {
        return json!(false);
    }
    if let Ok(n) = s.parse::<i64>() {
        return json!(n);
    }
    json!(s)
}

pub mod actions;
pub mod deploy;
pub mod restore;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (drydock::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Actions(args) => dispatch!(args, actions),
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Restore(args) => dispatch!(args, global, restore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn kv_flags_become_typed_settings() {
        let map = parse_kv_flags(&args(&[
            "--pre-deploy",
            "drush cr",
            "--num-dumps",
            "3",
            "--no-post-cc-all",
        ]))
        .unwrap();

        assert_eq!(map["pre-deploy"], "drush cr");
        assert_eq!(map["num-dumps"], 3);
        assert_eq!(map["no-post-cc-all"], true);
    }

    #[test]
    fn kv_flags_accept_equals_and_json_lists() {
        let map = parse_kv_flags(&args(&["--post-online=[\"a\",\"b\"]", "--message", "hi"])).unwrap();
        assert_eq!(map["post-online"], json!(["a", "b"]));
        assert_eq!(map["message"], "hi");
    }

    #[test]
    fn bare_value_is_rejected() {
        let err = parse_kv_flags(&args(&["stray"])).unwrap_err();
        assert_eq!(err.code, drydock::ErrorCode::ValidationInvalidArgument);
    }

    #[test]
    fn extras_override_typed_flags() {
        let map = SettingsBuilder::default()
            .flag("no-dump", true)
            .flag("no-updb", false)
            .value("branch", Some("master"))
            .value::<String>("tag", None)
            .extra(&args(&["--branch", "release"]))
            .unwrap();

        assert_eq!(map["no-dump"], true);
        assert!(map.get("no-updb").is_none());
        assert!(map.get("tag").is_none());
        assert_eq!(map["branch"], "release");
    }

    #[test]
    fn explicit_answers_skip_the_prompt() {
        let no = ConfirmArgs {
            no: true,
            ..ConfirmArgs::default()
        };
        assert!(!no.confirmed("Continue?").unwrap());

        let yes = ConfirmArgs {
            no_confirm: true,
            ..ConfirmArgs::default()
        };
        assert!(yes.confirmed("Continue?").unwrap());
    }
}
