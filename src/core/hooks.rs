//! Pre/post shell hooks around each action.
//!
//! Hooks are shell commands from the `pre-<name>` / `post-<name>` settings of
//! the action they wrap. They run in the site root, one after another, and
//! the first failing command stops the rest. `{{alias}}` and `{{root}}` are
//! expanded before a command runs.

use serde::Serialize;

use crate::action::{Action, ActionFailure};
use crate::context::DeployContext;
use crate::log::DeployLog;
use crate::settings::Settings;
use crate::utils::template::{self, TemplateVars};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    Pre,
    Post,
}

impl HookEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            HookEvent::Pre => "pre",
            HookEvent::Post => "post",
        }
    }
}

/// Result of running a single hook command.
#[derive(Debug, Clone, Serialize)]
pub struct HookCommandResult {
    pub command: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// An action together with the hooks configured for it.
#[derive(Debug, Clone)]
pub struct HookedAction {
    pub action: Action,
    enabled: bool,
    pre_commands: Vec<String>,
    post_commands: Vec<String>,
}

impl HookedAction {
    /// Resolve enablement and hooks once, from the settings of this run.
    pub fn new(action: Action, settings: &Settings, log: &dyn DeployLog) -> Self {
        let name = action.name();
        let mut enabled = action.is_enabled(settings);

        if action.short_description().trim().is_empty() {
            log.warning(&format!(
                "Incomplete action, missing short description: {}",
                name
            ));
            enabled = false;
        }

        let hooks = |event: HookEvent| -> Vec<String> {
            let kill_switch = format!("no-{}-{}", event.as_str(), name);
            if !enabled || settings.flag(&kill_switch) {
                return Vec::new();
            }
            settings.get_list(&format!("{}-{}", event.as_str(), name))
        };
        let pre_commands = hooks(HookEvent::Pre);
        let post_commands = hooks(HookEvent::Post);

        Self {
            action,
            enabled,
            pre_commands,
            post_commands,
        }
    }

    pub fn name(&self) -> String {
        self.action.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn pre_commands(&self) -> &[String] {
        &self.pre_commands
    }

    pub fn post_commands(&self) -> &[String] {
        &self.post_commands
    }

    /// Plan lines: pre hooks, the action, post hooks.
    pub fn plan_lines(&self) -> Vec<String> {
        let run = |c: &String| format!("Run command: {}", c);
        let mut lines: Vec<String> = self.pre_commands.iter().map(run).collect();
        lines.push(self.action.plan_line());
        lines.extend(self.post_commands.iter().map(run));
        lines
    }

    pub fn run_pre(&self, ctx: &DeployContext) -> Result<Vec<HookCommandResult>, ActionFailure> {
        run_commands(ctx, &self.pre_commands)
    }

    pub fn run_post(&self, ctx: &DeployContext) -> Result<Vec<HookCommandResult>, ActionFailure> {
        run_commands(ctx, &self.post_commands)
    }
}

/// Run commands in the site root, stopping at the first failure.
pub fn run_commands(
    ctx: &DeployContext,
    commands: &[String],
) -> Result<Vec<HookCommandResult>, ActionFailure> {
    let mut results = Vec::new();

    let vars = [
        (TemplateVars::ALIAS, ctx.alias.name.as_str()),
        (TemplateVars::ROOT, ctx.alias.root.as_str()),
    ];

    for command in commands {
        let command = template::render(command, &vars);
        ctx.log.info(&format!("Running command: {}", command));
        let output = ctx.shell(&command);

        for line in output.stdout.lines().chain(output.stderr.lines()) {
            if !line.trim().is_empty() {
                ctx.log.info(line);
            }
        }

        results.push(HookCommandResult {
            command: command.clone(),
            success: output.success,
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            exit_code: output.exit_code,
        });

        if !output.success {
            let message = format!("Error running command \"{}\"", command);
            ctx.log.error(&message);
            return Err(ActionFailure::from_output(message, &output));
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use crate::action::ServiceRestart;
    use crate::log::{LogLevel, MemoryLog};
    use crate::testing::FakeOperations;
    use serde_json::{json, Map, Value};

    fn settings(alias: Value) -> Settings {
        let alias = match alias {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Settings::new(Map::new(), alias, Map::new())
    }

    #[test]
    fn hooks_come_from_the_action_name() {
        let s = settings(json!({
            "pre-cc-all": "echo before",
            "post-cc-all": ["echo after", "echo again"],
        }));
        let hooked = HookedAction::new(Action::ClearCache, &s, &MemoryLog::new());

        assert_eq!(hooked.pre_commands(), ["echo before"]);
        assert_eq!(hooked.post_commands(), ["echo after", "echo again"]);
        assert_eq!(
            hooked.plan_lines(),
            vec![
                "Run command: echo before",
                "Clear all caches.",
                "Run command: echo after",
                "Run command: echo again",
            ]
        );
    }

    #[test]
    fn pre_and_post_have_independent_kill_switches() {
        let s = settings(json!({
            "pre-updb": "echo pre",
            "post-updb": "echo post",
            "no-post-updb": true,
        }));
        let hooked = HookedAction::new(Action::RunDatabaseUpdates, &s, &MemoryLog::new());
        assert_eq!(hooked.pre_commands(), ["echo pre"]);
        assert!(hooked.post_commands().is_empty());
    }

    #[test]
    fn disabled_action_has_no_hooks() {
        let s = settings(json!({"no-updb": true, "post-updb": "echo post"}));
        let hooked = HookedAction::new(Action::RunDatabaseUpdates, &s, &MemoryLog::new());
        assert!(!hooked.is_enabled());
        assert!(hooked.post_commands().is_empty());
    }

    #[test]
    fn missing_short_description_disables_with_warning() {
        let log = MemoryLog::new();
        let action = Action::RestartService(ServiceRestart {
            service: String::new(),
            command: "true".to_string(),
        });
        let s = settings(json!({"restart-": true}));
        let hooked = HookedAction::new(action, &s, &log);

        assert!(!hooked.is_enabled());
        assert!(log.contains_at(
            LogLevel::Warning,
            "Incomplete action, missing short description: restart-"
        ));
    }

    #[test]
    fn first_failing_command_stops_the_rest() {
        let ops = FakeOperations::new();
        ops.fail("false");
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);

        let commands = vec![
            "echo one".to_string(),
            "false".to_string(),
            "echo three".to_string(),
        ];
        let failure = run_commands(&ctx, &commands).unwrap_err();

        assert_eq!(failure.message, "Error running command \"false\"");
        assert_eq!(ops.calls(), vec!["echo one", "false"]);
        assert!(log.contains("Running command: echo one"));
        assert!(log.contains_at(LogLevel::Error, "Error running command \"false\""));
    }

    #[test]
    fn placeholders_are_expanded() {
        let ops = FakeOperations::new();
        let alias = Alias::local("prod", "/srv/prod");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);

        run_commands(&ctx, &["echo {{alias}} in {{root}}".to_string()]).unwrap();
        assert_eq!(ops.calls(), vec!["echo prod in /srv/prod"]);
    }

    #[test]
    fn command_output_is_logged() {
        let ops = FakeOperations::new();
        ops.on("echo hi", crate::ssh::CommandOutput::ok("hi\n"));
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);

        let results = run_commands(&ctx, &["echo hi".to_string()]).unwrap();
        assert!(results[0].success);
        assert!(log.messages().contains(&"hi".to_string()));
    }
}
