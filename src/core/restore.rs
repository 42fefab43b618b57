//! The `restore` flow: put a site back to an earlier dump and the code it
//! was taken with.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::action::Action;
use crate::alias::Alias;
use crate::context::{DeployContext, RunState};
use crate::defaults::Defaults;
use crate::deploy::{dump_dir, hooked, settings_for};
use crate::error::{Error, Result};
use crate::log::DeployLog;
use crate::operation::SiteOperations;
use crate::pipeline::{Pipeline, PipelineReport};
use crate::retention::{self, DumpName};
use crate::revision::{self, Revision, RevisionSpec};
use crate::settings::Settings;

/// Dumps available for an alias, newest first.
pub struct RestoreCandidates {
    pub alias: Alias,
    pub settings: Settings,
    pub dump_dir: String,
    pub dumps: Vec<DumpName>,
}

pub struct PreparedRestore {
    pub alias: Alias,
    pub settings: Settings,
    pub dump_file: String,
    pub revision: Option<Revision>,
    pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutput {
    pub alias: String,
    pub dump_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    pub report: PipelineReport,
    pub state: RunState,
}

/// The restore sequence, in execution order. Without a known commit only
/// the database is restored.
pub fn restore_actions(dump_file: &str, revision: Option<&Revision>) -> Vec<Action> {
    let mut actions = vec![
        Action::SanityCheck,
        Action::SetOffline,
        Action::RestoreDatabase {
            dump_file: dump_file.to_string(),
        },
    ];
    if let Some(revision) = revision {
        actions.push(Action::DeployCode {
            revision: revision.clone(),
        });
    }
    actions.push(Action::ClearCache);
    actions.push(Action::SetOnline);
    actions
}

pub fn candidates(
    alias: Alias,
    defaults: &Defaults,
    command_line: Map<String, Value>,
    ops: &dyn SiteOperations,
    log: &dyn DeployLog,
) -> Result<RestoreCandidates> {
    let settings = settings_for(&alias, defaults, command_line);
    let dir = dump_dir(&settings);

    let dumps = {
        let ctx = DeployContext::new(&alias, &settings, ops, log);
        retention::list_dumps(&ctx, &dir)
    };

    if dumps.is_empty() {
        return Err(Error::precondition_failed(
            alias.display_name(),
            "dumps",
            format!("No database dumps found for {} in {}.", alias.display_name(), dir),
            None,
        ));
    }

    Ok(RestoreCandidates {
        alias,
        settings,
        dump_dir: dir,
        dumps,
    })
}

impl RestoreCandidates {
    /// Numbered menu lines, `1` being the newest dump.
    pub fn choices(&self) -> Vec<String> {
        self.dumps
            .iter()
            .enumerate()
            .map(|(i, dump)| {
                format!(
                    "{}. {} ({}, SHA {})",
                    i + 1,
                    dump.file_name(),
                    dump.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    dump.sha
                )
            })
            .collect()
    }

    /// Pick the 1-based `choice` and resolve the commit it was taken at.
    pub fn choose(
        self,
        choice: usize,
        ops: &dyn SiteOperations,
        log: &dyn DeployLog,
    ) -> Result<PreparedRestore> {
        let dump = choice
            .checked_sub(1)
            .and_then(|idx| self.dumps.get(idx))
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    "choice",
                    format!("Choose a dump between 1 and {}.", self.dumps.len()),
                    Some(choice.to_string()),
                    None,
                )
            })?;

        let revision = match dump.commit() {
            Some(sha) => Some(revision::resolve(
                RevisionSpec::Sha(sha.to_string()),
                &self.alias,
                ops,
                log,
            )?),
            None => {
                log.warning(&format!(
                    "{} has no commit recorded, restoring the database only.",
                    dump.file_name()
                ));
                None
            }
        };

        let dump_file = format!(
            "{}/{}",
            self.dump_dir.trim_end_matches('/'),
            dump.file_name()
        );
        let pipeline = hooked(
            restore_actions(&dump_file, revision.as_ref()),
            &self.settings,
            log,
        );

        Ok(PreparedRestore {
            alias: self.alias,
            settings: self.settings,
            dump_file,
            revision,
            pipeline,
        })
    }
}

impl PreparedRestore {
    pub fn plan(&self) -> Vec<String> {
        self.pipeline.plan()
    }

    pub fn execute(&self, ops: &dyn SiteOperations, log: &dyn DeployLog) -> RestoreOutput {
        let ctx = DeployContext::new(&self.alias, &self.settings, ops, log);
        let mut state = RunState::default();
        let report = self.pipeline.run(&ctx, &mut state);

        if report.success {
            if let Some(done) = self.settings.get_str("done_message") {
                log.success(&done);
            }
        }

        RestoreOutput {
            alias: self.alias.display_name(),
            dump_file: self.dump_file.clone(),
            revision: self.revision.clone(),
            report,
            state,
        }
    }
}
