//! The closed set of deployment steps.
//!
//! Each `Action` knows how to describe itself, whether settings enable it,
//! how to run and (for some) how to undo itself. Actions only talk to the
//! site through the `DeployContext` and leave facts for their rollback in
//! `RunState`.

use chrono::{DateTime, Local, TimeDelta};
use serde::Serialize;

use crate::context::{DeployContext, MaintenanceSnapshot, RunState};
use crate::git;
use crate::operation::CliOption;
use crate::retention::DumpName;
use crate::revision::Revision;
use crate::settings::Settings;
use crate::ssh::CommandOutput;
use crate::utils::{command, shell};

const MAINTENANCE_VARIABLE: &str = "maintenance_mode";
const MAX_DUMP_NAME_ATTEMPTS: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: None,
        }
    }

    pub fn from_output(message: impl Into<String>, output: &CommandOutput) -> Self {
        let text = output.error_text().trim();
        Self {
            message: message.into(),
            output: (!text.is_empty()).then(|| text.to_string()),
        }
    }
}

impl std::fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.output {
            Some(output) => write!(f, "{}\n{}", self.message, output),
            None => write!(f, "{}", self.message),
        }
    }
}

/// What running an action amounted to. Only `Failed` stops the pipeline;
/// `Tolerated` is produced by best-effort actions alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(ActionFailure),
    Tolerated(ActionFailure),
}

fn critical(result: Result<(), ActionFailure>) -> Outcome {
    match result {
        Ok(()) => Outcome::Completed,
        Err(failure) => Outcome::Failed(failure),
    }
}

fn best_effort(result: Result<(), ActionFailure>) -> Outcome {
    match result {
        Ok(()) => Outcome::Completed,
        Err(failure) => Outcome::Tolerated(failure),
    }
}

/// Static facts about each kind of action, independent of any deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SanityCheck,
    SetOffline,
    DumpDatabase,
    DeployCode,
    RestartService,
    RunDatabaseUpdates,
    ClearCache,
    SetOnline,
    RestoreDatabase,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::SanityCheck,
        ActionKind::SetOffline,
        ActionKind::DumpDatabase,
        ActionKind::DeployCode,
        ActionKind::RestartService,
        ActionKind::RunDatabaseUpdates,
        ActionKind::ClearCache,
        ActionKind::SetOnline,
        ActionKind::RestoreDatabase,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::SanityCheck => "sanity",
            ActionKind::SetOffline => "offline",
            ActionKind::DumpDatabase => "dump",
            ActionKind::DeployCode => "deploy",
            ActionKind::RestartService => "restart-<service>",
            ActionKind::RunDatabaseUpdates => "updb",
            ActionKind::ClearCache => "cc-all",
            ActionKind::SetOnline => "online",
            ActionKind::RestoreDatabase => "restore-db",
        }
    }

    pub fn short_description(self) -> &'static str {
        match self {
            ActionKind::SanityCheck => "sanity check",
            ActionKind::SetOffline => "set site offline",
            ActionKind::DumpDatabase => "dump database",
            ActionKind::DeployCode => "deploy code",
            ActionKind::RestartService => "restart service",
            ActionKind::RunDatabaseUpdates => "run database updates",
            ActionKind::ClearCache => "clear all caches",
            ActionKind::SetOnline => "set site online",
            ActionKind::RestoreDatabase => "restore database",
        }
    }

    fn long_description(self) -> Option<&'static str> {
        match self {
            ActionKind::SanityCheck => Some(
                "Checks that the site checkout has no uncommitted changes in the working tree or the index.",
            ),
            ActionKind::SetOffline => Some(
                "Turns on maintenance mode. Rolling back restores the previous maintenance mode.",
            ),
            ActionKind::DumpDatabase => Some(
                "Dumps the database to a timestamped file in the dump directory.",
            ),
            ActionKind::DeployCode => Some(
                "Checks out the requested branch, tag or SHA and writes the deployment record. Rolling back checks out the previous HEAD.",
            ),
            ActionKind::RestartService => Some(
                "Restarts a service on the host. Failures are reported but never abort the deployment.",
            ),
            ActionKind::RunDatabaseUpdates => Some("Runs pending database updates."),
            ActionKind::ClearCache => None,
            ActionKind::SetOnline => Some(
                "Turns off maintenance mode. Also runs after a rollback if the site was taken offline.",
            ),
            ActionKind::RestoreDatabase => Some("Loads a database dump into the site database."),
        }
    }

    /// Long description, or the generic one when none is written.
    pub fn description(self) -> String {
        self.long_description()
            .map(String::from)
            .unwrap_or_else(|| format!("Run the {} action.", self.short_description()))
    }

    /// The setting that turns the action on or off.
    pub fn switch(self) -> Option<&'static str> {
        match self {
            ActionKind::SanityCheck | ActionKind::RestoreDatabase => None,
            ActionKind::SetOffline | ActionKind::SetOnline => Some("no-offline"),
            ActionKind::DumpDatabase => Some("no-dump"),
            ActionKind::DeployCode => Some("no-deploy"),
            ActionKind::RestartService => Some("restart-<service>"),
            ActionKind::RunDatabaseUpdates => Some("no-updb"),
            ActionKind::ClearCache => Some("no-cc-all"),
        }
    }

    pub fn has_rollback(self) -> bool {
        matches!(self, ActionKind::SetOffline | ActionKind::DeployCode)
    }

    pub fn is_best_effort(self) -> bool {
        matches!(self, ActionKind::RestartService)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRestart {
    pub service: String,
    pub command: String,
}

impl ServiceRestart {
    /// Restart command from `restart-<service>-command`.
    pub fn from_settings(service: &str, settings: &Settings) -> Self {
        let command = settings
            .get_str(&format!("restart-{}-command", service))
            .unwrap_or_else(|| format!("sudo service {} restart", service));
        Self {
            service: service.to_string(),
            command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SanityCheck,
    SetOffline,
    DumpDatabase { dump_dir: String },
    DeployCode { revision: Revision },
    RestartService(ServiceRestart),
    RunDatabaseUpdates,
    ClearCache,
    SetOnline,
    RestoreDatabase { dump_file: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::SanityCheck => ActionKind::SanityCheck,
            Action::SetOffline => ActionKind::SetOffline,
            Action::DumpDatabase { .. } => ActionKind::DumpDatabase,
            Action::DeployCode { .. } => ActionKind::DeployCode,
            Action::RestartService(_) => ActionKind::RestartService,
            Action::RunDatabaseUpdates => ActionKind::RunDatabaseUpdates,
            Action::ClearCache => ActionKind::ClearCache,
            Action::SetOnline => ActionKind::SetOnline,
            Action::RestoreDatabase { .. } => ActionKind::RestoreDatabase,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Action::RestartService(restart) => format!("restart-{}", restart.service),
            other => other.kind().name().to_string(),
        }
    }

    pub fn short_description(&self) -> String {
        match self {
            Action::RestartService(restart) if restart.service.trim().is_empty() => String::new(),
            Action::RestartService(restart) => format!("restart {}", restart.service),
            other => other.kind().short_description().to_string(),
        }
    }

    pub fn long_description(&self) -> String {
        match self.kind().long_description() {
            Some(text) => text.to_string(),
            None => format!("Run the {} action.", self.short_description()),
        }
    }

    pub fn is_enabled(&self, settings: &Settings) -> bool {
        match self {
            Action::SanityCheck | Action::RestoreDatabase { .. } => true,
            Action::SetOffline | Action::SetOnline => !settings.flag("no-offline"),
            Action::DumpDatabase { .. } => !settings.flag("no-dump"),
            Action::DeployCode { .. } => !settings.flag("no-deploy"),
            Action::RestartService(restart) => {
                settings.flag(&format!("restart-{}", restart.service))
            }
            Action::RunDatabaseUpdates => !settings.flag("no-updb"),
            Action::ClearCache => !settings.flag("no-cc-all"),
        }
    }

    /// One line for the plan shown before confirmation.
    pub fn plan_line(&self) -> String {
        match self {
            Action::SanityCheck => "Check that the site checkout is clean.".to_string(),
            Action::SetOffline => "Set the site offline.".to_string(),
            Action::DumpDatabase { dump_dir } => format!("Dump the database into {}.", dump_dir),
            Action::DeployCode { revision } => format!("Deploy {}.", revision.describe()),
            Action::RestartService(restart) => {
                format!("Restart {} with: {}", restart.service, restart.command)
            }
            Action::RunDatabaseUpdates => "Run database updates.".to_string(),
            Action::ClearCache => "Clear all caches.".to_string(),
            Action::SetOnline => "Set the site online.".to_string(),
            Action::RestoreDatabase { dump_file } => {
                format!("Restore the database from {}.", dump_file)
            }
        }
    }

    pub fn has_rollback(&self) -> bool {
        self.kind().has_rollback()
    }

    /// Name of the action that, once completed, makes this one run even after
    /// a failure further up the pipeline.
    pub fn cleanup_guard(&self) -> Option<&'static str> {
        match self {
            Action::SetOnline => Some(ActionKind::SetOffline.name()),
            _ => None,
        }
    }

    pub fn run(&self, ctx: &DeployContext, state: &mut RunState) -> Outcome {
        match self {
            Action::SanityCheck => critical(sanity_check(ctx)),
            Action::SetOffline => critical(set_offline(ctx, state)),
            Action::DumpDatabase { dump_dir } => critical(dump_database(ctx, state, dump_dir)),
            Action::DeployCode { revision } => critical(deploy_code(ctx, state, revision)),
            Action::RestartService(restart) => best_effort(restart_service(ctx, restart)),
            Action::RunDatabaseUpdates => critical(run_database_updates(ctx)),
            Action::ClearCache => critical(clear_cache(ctx)),
            Action::SetOnline => critical(set_online(ctx)),
            Action::RestoreDatabase { dump_file } => {
                critical(restore_database(ctx, state, dump_file))
            }
        }
    }

    /// Undo a completed run. `None` when the action has nothing to undo.
    pub fn rollback(
        &self,
        ctx: &DeployContext,
        state: &RunState,
    ) -> Option<Result<(), ActionFailure>> {
        match self {
            Action::SetOffline => Some(restore_maintenance(ctx, state)),
            Action::DeployCode { .. } => Some(restore_head(ctx, state)),
            _ => None,
        }
    }
}

fn sanity_check(ctx: &DeployContext) -> Result<(), ActionFailure> {
    let index = git::index_is_clean(ctx.ops, ctx.alias);
    match index.exit_code {
        0 => {}
        1 => return Err(ActionFailure::new("Uncommitted changes in the index.")),
        _ => {
            return Err(ActionFailure::from_output(
                "Could not check the index.",
                &index,
            ))
        }
    }

    let status = git::tracked_changes(ctx.ops, ctx.alias);
    if !status.success {
        return Err(ActionFailure::from_output(
            "Could not check repository status.",
            &status,
        ));
    }
    if !status.stdout.trim().is_empty() {
        return Err(ActionFailure {
            message: "Repository not clean.".to_string(),
            output: Some(status.stdout.trim_end().to_string()),
        });
    }

    ctx.log.success("Site checkout is clean.");
    Ok(())
}

fn set_maintenance(ctx: &DeployContext, value: &str) -> CommandOutput {
    ctx.invoke(
        "variable-set",
        &[MAINTENANCE_VARIABLE, value],
        &[CliOption::flag("exact"), CliOption::flag("yes")],
    )
}

fn set_offline(ctx: &DeployContext, state: &mut RunState) -> Result<(), ActionFailure> {
    let current = ctx.invoke(
        "variable-get",
        &[MAINTENANCE_VARIABLE],
        &[CliOption::flag("exact"), CliOption::value("format", "string")],
    );
    let previous = match current.stdout.trim() {
        value if current.success && !value.is_empty() => {
            MaintenanceSnapshot::Value(value.to_string())
        }
        _ => MaintenanceSnapshot::Unset,
    };
    state.previous_maintenance = Some(previous);

    let set = set_maintenance(ctx, "1");
    if !set.success {
        return Err(ActionFailure::from_output("Error setting site offline.", &set));
    }

    ctx.log.success("Site offline.");
    Ok(())
}

fn restore_maintenance(ctx: &DeployContext, state: &RunState) -> Result<(), ActionFailure> {
    let output = match &state.previous_maintenance {
        Some(MaintenanceSnapshot::Value(value)) => set_maintenance(ctx, value),
        Some(MaintenanceSnapshot::Unset) | None => ctx.invoke(
            "variable-delete",
            &[MAINTENANCE_VARIABLE],
            &[CliOption::flag("exact"), CliOption::flag("yes")],
        ),
    };

    if !output.success {
        return Err(ActionFailure::from_output(
            "Error restoring maintenance mode.",
            &output,
        ));
    }
    Ok(())
}

fn dump_database(
    ctx: &DeployContext,
    state: &mut RunState,
    dump_dir: &str,
) -> Result<(), ActionFailure> {
    let mkdir = ctx.shell(&format!("mkdir -p {}", shell::quote_path(dump_dir)));
    if !mkdir.success {
        return Err(ActionFailure::from_output(
            format!("Could not create dump directory {}.", dump_dir),
            &mkdir,
        ));
    }

    let sha = ctx.head().unwrap_or_else(|| "unknown".to_string());
    let mut name = DumpName::new(&ctx.alias.name, Local::now().naive_local(), &sha);
    let mut path = dump_path(dump_dir, &name);

    // Names only resolve to the second; step past one that is already taken.
    for _ in 0..MAX_DUMP_NAME_ATTEMPTS {
        if !dump_exists(ctx, &path) {
            break;
        }
        name.timestamp += TimeDelta::seconds(1);
        path = dump_path(dump_dir, &name);
    }
    if dump_exists(ctx, &path) {
        return Err(ActionFailure::new(format!(
            "Could not find a free dump file name in {}.",
            dump_dir
        )));
    }

    let dump = ctx.invoke("sql-dump", &[], &[CliOption::value("result-file", &path)]);
    if !dump.success {
        return Err(ActionFailure::from_output("Error dumping database.", &dump));
    }

    ctx.log.success(&format!("Dumped database to {}.", path));
    state.dump_file = Some(path);
    Ok(())
}

fn dump_path(dump_dir: &str, name: &DumpName) -> String {
    format!("{}/{}", dump_dir.trim_end_matches('/'), name.file_name())
}

fn dump_exists(ctx: &DeployContext, path: &str) -> bool {
    let check = ctx.shell(&format!("test -e {} && echo exists", shell::quote_path(path)));
    check.stdout.trim() == "exists"
}

fn deploy_code(
    ctx: &DeployContext,
    state: &mut RunState,
    revision: &Revision,
) -> Result<(), ActionFailure> {
    let Some(previous) = ctx.head() else {
        return Err(ActionFailure::new("Could not determine current HEAD."));
    };
    state.previous_head = Some(previous.clone());

    let checkout = git::checkout(ctx.ops, ctx.alias, &revision.sha);
    if !checkout.success {
        return Err(ActionFailure::from_output("Could not checkout code.", &checkout));
    }

    let now_at = ctx.head().unwrap_or_else(|| revision.sha.clone());
    ctx.log.success(&format!("HEAD now at {}.", now_at));

    let record = VersionRecord {
        branch: revision.branch().map(String::from),
        sha: now_at.clone(),
        tags: git::tags_pointing_at(ctx.ops, ctx.alias, &now_at),
        time: Local::now(),
        deployer: deployer(),
    };

    if let Err(failure) = write_version_record(ctx, &record) {
        // The action won't be rolled back after failing, so undo the checkout here.
        let undo = git::checkout(ctx.ops, ctx.alias, &previous);
        if undo.success {
            ctx.log.notice(&format!("HEAD now at {}.", previous));
        } else {
            ctx.log
                .error(&format!("Could not check out previous HEAD {}.", previous));
        }
        return Err(failure);
    }

    state.deployed_sha = Some(now_at);
    Ok(())
}

fn restore_head(ctx: &DeployContext, state: &RunState) -> Result<(), ActionFailure> {
    let Some(previous) = &state.previous_head else {
        return Err(ActionFailure::new("No previous HEAD recorded."));
    };

    let checkout = git::checkout(ctx.ops, ctx.alias, previous);
    if !checkout.success {
        return Err(ActionFailure::from_output(
            format!("Could not check out previous HEAD {}.", previous),
            &checkout,
        ));
    }

    ctx.log.notice(&format!("HEAD now at {}.", previous));
    Ok(())
}

/// Contents of the deployment record file left in the site root.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    pub branch: Option<String>,
    pub sha: String,
    pub tags: Vec<String>,
    pub time: DateTime<Local>,
    pub deployer: String,
}

impl VersionRecord {
    pub fn render(&self) -> String {
        let mut lines = vec![
            "Deployment info".to_string(),
            "===============".to_string(),
        ];
        if let Some(branch) = &self.branch {
            lines.push(format!("Branch: {}", branch));
        }
        lines.push(format!("SHA: {}", self.sha));
        if !self.tags.is_empty() {
            lines.push(format!("Tags: {}", self.tags.join(", ")));
        }
        lines.push(format!("Time of deployment: {}", self.time.to_rfc3339()));
        lines.push(format!("Deployer: {}", self.deployer));
        lines.join("\n") + "\n"
    }
}

fn write_version_record(ctx: &DeployContext, record: &VersionRecord) -> Result<(), ActionFailure> {
    let file = ctx
        .settings
        .get_str("version-file")
        .unwrap_or_else(|| "VERSION.txt".to_string());

    let write = ctx.shell(&format!(
        "printf '%s' {} > {}",
        shell::quote_path(&record.render()),
        shell::quote_path(&file)
    ));
    if !write.success {
        return Err(ActionFailure::from_output(
            format!("Could not write {}.", file),
            &write,
        ));
    }

    ctx.log.success(&format!("Wrote {}.", file));
    Ok(())
}

/// `user@host` of whoever runs the deployment.
pub fn deployer() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    match command::run_optional("hostname", &[]) {
        Some(host) => format!("{}@{}", user, host),
        None => user,
    }
}

fn restart_service(ctx: &DeployContext, restart: &ServiceRestart) -> Result<(), ActionFailure> {
    let output = ctx.shell(&restart.command);
    if !output.success {
        return Err(ActionFailure::from_output(
            format!("Could not restart {}.", restart.service),
            &output,
        ));
    }

    ctx.log.success(&format!("Restarted {}.", restart.service));
    Ok(())
}

fn run_database_updates(ctx: &DeployContext) -> Result<(), ActionFailure> {
    let output = ctx.invoke("updatedb", &[], &[CliOption::flag("yes")]);
    if !output.success {
        return Err(ActionFailure::from_output(
            "Error running database updates.",
            &output,
        ));
    }

    ctx.log.success("Database updated.");
    Ok(())
}

fn clear_cache(ctx: &DeployContext) -> Result<(), ActionFailure> {
    let output = ctx.invoke("cache-clear", &["all"], &[]);
    if !output.success {
        return Err(ActionFailure::from_output("Error clearing caches.", &output));
    }

    ctx.log.success("Caches cleared.");
    Ok(())
}

fn set_online(ctx: &DeployContext) -> Result<(), ActionFailure> {
    let output = set_maintenance(ctx, "0");
    if !output.success {
        return Err(ActionFailure::from_output(
            "Error setting site online.",
            &output,
        ));
    }

    ctx.log.success("Site online.");
    Ok(())
}

fn restore_database(
    ctx: &DeployContext,
    state: &mut RunState,
    dump_file: &str,
) -> Result<(), ActionFailure> {
    let output = ctx.invoke("sql-query", &[], &[CliOption::value("file", dump_file)]);
    if !output.success {
        return Err(ActionFailure::from_output(
            "Error restoring database.",
            &output,
        ));
    }

    ctx.log
        .success(&format!("Restored database from {}.", dump_file));
    state.restored_dump = Some(dump_file.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use crate::log::MemoryLog;
    use crate::operation::ShellOperations;
    use crate::revision::RevisionSpec;
    use crate::testing::FakeOperations;
    use serde_json::{json, Map, Value};
    use std::process::Command;

    const OLD: &str = "1111111111111111111111111111111111111111";
    const NEW: &str = "2222222222222222222222222222222222222222";

    fn settings(alias: Value) -> Settings {
        let alias = match alias {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Settings::new(Map::new(), alias, Map::new())
    }

    fn revision(sha: &str) -> Revision {
        Revision {
            spec: RevisionSpec::Branch("master".to_string()),
            sha: sha.to_string(),
        }
    }

    #[test]
    fn long_description_falls_back_to_generic_text() {
        assert_eq!(
            Action::ClearCache.long_description(),
            "Run the clear all caches action."
        );
        assert!(Action::SetOffline.long_description().contains("maintenance"));
    }

    #[test]
    fn restart_names_follow_the_service() {
        let restart = Action::RestartService(ServiceRestart {
            service: "varnish".to_string(),
            command: "true".to_string(),
        });
        assert_eq!(restart.name(), "restart-varnish");
        assert_eq!(restart.short_description(), "restart varnish");
    }

    #[test]
    fn kill_switches_disable_actions() {
        let s = settings(json!({"no-dump": true, "no-offline": "1"}));
        assert!(!Action::DumpDatabase { dump_dir: "/tmp".into() }.is_enabled(&s));
        assert!(!Action::SetOffline.is_enabled(&s));
        assert!(!Action::SetOnline.is_enabled(&s));
        assert!(Action::ClearCache.is_enabled(&s));
        assert!(Action::SanityCheck.is_enabled(&s));
    }

    #[test]
    fn restarts_are_opt_in() {
        let apache = Action::RestartService(ServiceRestart::from_settings(
            "apache2",
            &settings(json!({})),
        ));
        assert!(!apache.is_enabled(&settings(json!({}))));
        assert!(apache.is_enabled(&settings(json!({"restart-apache2": true}))));
    }

    #[test]
    fn restart_command_comes_from_settings() {
        let s = settings(json!({"restart-varnish-command": "systemctl reload varnish"}));
        assert_eq!(
            ServiceRestart::from_settings("varnish", &s).command,
            "systemctl reload varnish"
        );
    }

    #[test]
    fn set_offline_remembers_previous_value_for_rollback() {
        let ops = FakeOperations::new();
        ops.on("variable-get", CommandOutput::ok("0\n"));
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);
        let mut state = RunState::default();

        assert_eq!(Action::SetOffline.run(&ctx, &mut state), Outcome::Completed);
        assert_eq!(
            state.previous_maintenance,
            Some(MaintenanceSnapshot::Value("0".to_string()))
        );
        assert!(ops.called("variable-set maintenance_mode 1"));

        assert_eq!(Action::SetOffline.rollback(&ctx, &state), Some(Ok(())));
        assert!(ops.called("variable-set maintenance_mode 0"));
    }

    #[test]
    fn unset_maintenance_is_deleted_on_rollback() {
        let ops = FakeOperations::new();
        ops.fail("variable-get");
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);
        let mut state = RunState::default();

        Action::SetOffline.run(&ctx, &mut state);
        assert_eq!(state.previous_maintenance, Some(MaintenanceSnapshot::Unset));
        Action::SetOffline.rollback(&ctx, &state);
        assert!(ops.called("variable-delete maintenance_mode"));
    }

    #[test]
    fn failed_restart_is_tolerated() {
        let ops = FakeOperations::new();
        ops.fail("service apache2");
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);

        let action = Action::RestartService(ServiceRestart::from_settings("apache2", &s));
        match action.run(&ctx, &mut RunState::default()) {
            Outcome::Tolerated(failure) => assert_eq!(failure.message, "Could not restart apache2."),
            other => panic!("expected tolerated failure, got {:?}", other),
        }
    }

    #[test]
    fn staged_changes_fail_the_sanity_check() {
        let ops = FakeOperations::new();
        ops.on("diff --cached", CommandOutput::failed(1, ""));
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);

        assert_eq!(
            Action::SanityCheck.run(&ctx, &mut RunState::default()),
            Outcome::Failed(ActionFailure::new("Uncommitted changes in the index."))
        );
    }

    #[test]
    fn modified_tracked_file_fails_the_sanity_check() {
        let ops = FakeOperations::new();
        ops.on("status --porcelain", CommandOutput::ok(" M index.php\n"));
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);

        match Action::SanityCheck.run(&ctx, &mut RunState::default()) {
            Outcome::Failed(failure) => {
                assert_eq!(failure.message, "Repository not clean.");
                assert_eq!(failure.output.as_deref(), Some(" M index.php"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn dump_steps_past_a_name_already_taken() {
        let ops = FakeOperations::new();
        ops.on("'HEAD^{commit}'", CommandOutput::ok(OLD));
        ops.on_seq(
            "test -e",
            vec![CommandOutput::ok("exists\n"), CommandOutput::ok("")],
        );
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);
        let mut state = RunState::default();

        let action = Action::DumpDatabase {
            dump_dir: "/var/dumps".to_string(),
        };
        assert_eq!(action.run(&ctx, &mut state), Outcome::Completed);

        let checks: Vec<String> = ops
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("test -e"))
            .collect();
        let taken = checks[0].split('\'').nth(1).unwrap().to_string();
        let written = state.dump_file.clone().unwrap();
        assert_ne!(written, taken);

        let file = |path: &str| path.rsplit('/').next().unwrap().to_string();
        let taken = DumpName::parse("dev", &file(&taken)).unwrap();
        let written = DumpName::parse("dev", &file(&written)).unwrap();
        assert_eq!(written.timestamp - taken.timestamp, TimeDelta::seconds(1));
        assert_eq!(written.sha, OLD);
        assert!(ops.called(&format!("--result-file={}", state.dump_file.unwrap())));
    }

    #[test]
    fn deploy_records_previous_head_and_writes_record() {
        let ops = FakeOperations::new();
        ops.on_seq(
            "'HEAD^{commit}'",
            vec![CommandOutput::ok(OLD), CommandOutput::ok(NEW)],
        );
        ops.on("tag --points-at", CommandOutput::ok("v2\n"));
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);
        let mut state = RunState::default();

        let action = Action::DeployCode {
            revision: revision(NEW),
        };
        assert_eq!(action.run(&ctx, &mut state), Outcome::Completed);
        assert_eq!(state.previous_head.as_deref(), Some(OLD));
        assert_eq!(state.deployed_sha.as_deref(), Some(NEW));
        assert!(log.contains(&format!("HEAD now at {}.", NEW)));

        let write = ops
            .calls()
            .into_iter()
            .find(|c| c.starts_with("printf"))
            .unwrap();
        assert!(write.contains(&format!("SHA: {}", NEW)));
        assert!(write.contains("Branch: master"));
        assert!(write.contains("Tags: v2"));
        assert!(write.ends_with("> 'VERSION.txt'"));

        assert_eq!(action.rollback(&ctx, &state), Some(Ok(())));
        assert!(ops.called(&format!("checkout --quiet {}", OLD)));
    }

    #[test]
    fn failed_checkout_reports_and_records_nothing_deployed() {
        let ops = FakeOperations::new();
        ops.on("'HEAD^{commit}'", CommandOutput::ok(OLD));
        ops.fail("checkout");
        let alias = Alias::local("dev", "/srv");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);
        let mut state = RunState::default();

        let outcome = Action::DeployCode {
            revision: revision(NEW),
        }
        .run(&ctx, &mut state);
        match outcome {
            Outcome::Failed(failure) => assert_eq!(failure.message, "Could not checkout code."),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(state.deployed_sha.is_none());
        assert!(!ops.called("printf"));
    }

    #[test]
    fn version_record_lists_known_fields() {
        let record = VersionRecord {
            branch: None,
            sha: NEW.to_string(),
            tags: vec!["annotated-tag".to_string()],
            time: Local::now(),
            deployer: "deploy@web1".to_string(),
        };
        let text = record.render();
        assert!(text.starts_with("Deployment info\n"));
        assert!(!text.contains("Branch:"));
        assert!(text.contains("Tags: annotated-tag"));
        assert!(text.contains("Deployer: deploy@web1"));
        assert!(text.contains("Time of deployment: "));
    }

    fn git(dir: &std::path::Path, command: &str) -> String {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", command);
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    #[test]
    fn deploying_a_sha_in_a_real_checkout() {
        let dir = tempfile::tempdir().unwrap();
        git(
            dir.path(),
            "git init -q && git config user.email t@example.com && git config user.name T \
             && echo one > a.txt && git add a.txt && git commit -qm one \
             && echo two > a.txt && git commit -qam two",
        );
        let first = git(dir.path(), "git rev-parse HEAD~1");
        let alias = Alias::local("dev", &dir.path().to_string_lossy());
        let ops = ShellOperations::new("drush");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);
        let mut state = RunState::default();

        let action = Action::DeployCode {
            revision: Revision {
                spec: RevisionSpec::Sha(first.clone()),
                sha: first.clone(),
            },
        };
        assert_eq!(action.run(&ctx, &mut state), Outcome::Completed);

        let record = std::fs::read_to_string(dir.path().join("VERSION.txt")).unwrap();
        assert!(record.contains(&format!("SHA: {}", first)));
        assert_eq!(git(dir.path(), "git rev-parse HEAD"), first);
    }

    #[test]
    fn colliding_untracked_file_leaves_head_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        git(
            dir.path(),
            "git init -q && git config user.email t@example.com && git config user.name T \
             && echo one > a.txt && git add a.txt && git commit -qm one \
             && echo new > b.txt && git add b.txt && git commit -qm two \
             && git checkout -q HEAD~1 && echo mine > b.txt",
        );
        let before = git(dir.path(), "git rev-parse HEAD");
        let target = git(dir.path(), "git rev-parse HEAD@{1}");
        let alias = Alias::local("dev", &dir.path().to_string_lossy());
        let ops = ShellOperations::new("drush");
        let s = Settings::default();
        let log = MemoryLog::new();
        let ctx = DeployContext::new(&alias, &s, &ops, &log);

        let outcome = Action::DeployCode {
            revision: revision(&target),
        }
        .run(&ctx, &mut RunState::default());
        assert!(matches!(outcome, Outcome::Failed(ref f) if f.message == "Could not checkout code."));
        assert_eq!(git(dir.path(), "git rev-parse HEAD"), before);
    }
}
