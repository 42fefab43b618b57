//! The `deploy` flow: resolve everything up front, then run the pipeline and
//! the post-deployment chores.

use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::action::{self, Action, ServiceRestart};
use crate::alias::Alias;
use crate::context::{DeployContext, RunState};
use crate::defaults::Defaults;
use crate::error::Result;
use crate::hooks::HookedAction;
use crate::log::DeployLog;
use crate::notify::{self, DeployNotification, NotificationResult};
use crate::operation::SiteOperations;
use crate::pipeline::{Pipeline, PipelineReport};
use crate::retention::{self, PurgeReport};
use crate::revision::{self, Revision, RevisionSpec};
use crate::settings::Settings;

pub const DEFAULT_NUM_DUMPS: u64 = 5;

/// The deploy sequence, in execution order.
pub fn deploy_actions(settings: &Settings, revision: &Revision) -> Vec<Action> {
    vec![
        Action::SanityCheck,
        Action::SetOffline,
        Action::DumpDatabase {
            dump_dir: dump_dir(settings),
        },
        Action::DeployCode {
            revision: revision.clone(),
        },
        Action::RestartService(ServiceRestart::from_settings("apache2", settings)),
        Action::RunDatabaseUpdates,
        Action::ClearCache,
        Action::SetOnline,
        Action::RestartService(ServiceRestart::from_settings("varnish", settings)),
    ]
}

pub fn dump_dir(settings: &Settings) -> String {
    settings
        .get_str("dump-dir")
        .unwrap_or_else(|| "/tmp".to_string())
}

/// Build the layered settings for one run.
pub fn settings_for(alias: &Alias, defaults: &Defaults, command_line: Map<String, Value>) -> Settings {
    Settings::new(defaults.settings_layer(), alias.deploy.clone(), command_line)
}

pub fn hooked(actions: Vec<Action>, settings: &Settings, log: &dyn DeployLog) -> Pipeline {
    Pipeline::new(
        actions
            .into_iter()
            .map(|action| HookedAction::new(action, settings, log))
            .collect(),
    )
}

/// Everything checked and resolved; nothing on the site changed yet.
pub struct PreparedDeploy {
    pub alias: Alias,
    pub settings: Settings,
    pub revision: Revision,
    pub keep_dumps: u64,
    pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployPlan {
    pub alias: String,
    pub revision: Revision,
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployOutput {
    pub alias: String,
    pub revision: Revision,
    pub report: PipelineReport,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dumps: Option<PurgeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationResult>,
}

/// Check preconditions and build the pipeline. Fails before anything on the
/// site is touched.
pub fn prepare(
    alias: Alias,
    defaults: &Defaults,
    command_line: Map<String, Value>,
    ops: &dyn SiteOperations,
    log: &dyn DeployLog,
) -> Result<PreparedDeploy> {
    let settings = settings_for(&alias, defaults, command_line);
    let keep_dumps = settings.get_u64("num-dumps")?.unwrap_or(DEFAULT_NUM_DUMPS);

    let spec = RevisionSpec::from_settings(&settings, log)?;
    let revision = revision::resolve(spec, &alias, ops, log)?;

    let pipeline = hooked(deploy_actions(&settings, &revision), &settings, log);

    Ok(PreparedDeploy {
        alias,
        settings,
        revision,
        keep_dumps,
        pipeline,
    })
}

impl PreparedDeploy {
    pub fn plan(&self) -> DeployPlan {
        DeployPlan {
            alias: self.alias.display_name(),
            revision: self.revision.clone(),
            steps: self.pipeline.plan(),
            confirm_message: self.confirm_message(),
        }
    }

    /// Shown before the confirmation prompt. `message` stands in when no
    /// `confirm_message` is set.
    pub fn confirm_message(&self) -> Option<String> {
        self.settings
            .get_str("confirm_message")
            .or_else(|| self.settings.get_str("message"))
    }

    /// Shown once code was actually deployed. `message` stands in when no
    /// `done_message` is set.
    pub fn done_message(&self) -> Option<String> {
        self.settings
            .get_str("done_message")
            .or_else(|| self.settings.get_str("message"))
    }

    pub fn execute(&self, ops: &dyn SiteOperations, log: &dyn DeployLog) -> DeployOutput {
        let ctx = DeployContext::new(&self.alias, &self.settings, ops, log);
        let mut state = RunState::default();
        let report = self.pipeline.run(&ctx, &mut state);

        let mut output = DeployOutput {
            alias: self.alias.display_name(),
            revision: self.revision.clone(),
            report,
            state,
            dumps: None,
            notification: None,
        };

        if !output.report.success {
            return output;
        }

        if self.settings.flag("no-deploy") {
            log.notice("No version deployed, not creating/updating VERSION.txt.");
        }

        if output.report.has_completed("dump") {
            output.dumps = Some(retention::purge_dumps(
                &ctx,
                &dump_dir(&self.settings),
                self.keep_dumps as usize,
                output.state.dump_file.as_deref(),
            ));
        }

        output.notification = self.notify(&output.state, log);

        if output.state.deployed_sha.is_some() {
            if let Some(done) = self.done_message() {
                log.success(&done);
            }
        }

        output
    }

    fn notify(&self, state: &RunState, log: &dyn DeployLog) -> Option<NotificationResult> {
        let url = self.settings.get_str("notify-url")?;

        let Some(sha) = &state.deployed_sha else {
            log.notice("No version deployed, not sending notification.");
            return None;
        };

        let deployer = action::deployer();
        let notification = DeployNotification {
            alias: self.alias.display_name(),
            sha: sha.clone(),
            branch: self.revision.branch().map(String::from),
            tag: self.revision.tag().map(String::from),
            message: DeployNotification::summary(&self.alias.display_name(), sha, &deployer),
            deployer,
            time: Local::now().to_rfc3339(),
        };

        Some(notify::send(&url, &notification, log))
    }
}
