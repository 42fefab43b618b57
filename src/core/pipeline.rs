//! Ordered execution of hooked actions with compensating rollback.
//!
//! Actions run strictly in order. The first critical failure stops forward
//! progress; every completed action is then rolled back newest first, and
//! cleanup actions whose guard completed run last.

use serde::Serialize;

use crate::action::{ActionFailure, Outcome};
use crate::context::{DeployContext, RunState};
use crate::hooks::HookedAction;
use crate::log::{LogEntry, Recording};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    PreCommand,
    Run,
    PostCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Nothing failed.
    NotNeeded,
    /// Every attempted rollback succeeded (possibly none were needed).
    All,
    Partial,
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub action: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionFailure>,
}

impl StepRecord {
    fn from_result(action: String, result: Result<(), ActionFailure>) -> Self {
        Self {
            action,
            success: result.is_ok(),
            error: result.err(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<FailureStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionFailure>,
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tolerated: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rollbacks: Vec<StepRecord>,
    pub rollback_status: RollbackStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanups: Vec<StepRecord>,
}

impl PipelineReport {
    pub fn has_completed(&self, name: &str) -> bool {
        self.completed.iter().any(|c| c == name)
    }
}

pub struct Pipeline {
    actions: Vec<HookedAction>,
}

impl Pipeline {
    pub fn new(actions: Vec<HookedAction>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[HookedAction] {
        &self.actions
    }

    /// Plan lines for every enabled action, in execution order.
    pub fn plan(&self) -> Vec<String> {
        self.actions
            .iter()
            .filter(|a| a.is_enabled())
            .flat_map(HookedAction::plan_lines)
            .collect()
    }

    pub fn run(&self, ctx: &DeployContext, state: &mut RunState) -> PipelineReport {
        let recording = Recording::new(ctx.log);
        let ctx = DeployContext::new(ctx.alias, ctx.settings, ctx.ops, &recording);

        let mut completed: Vec<usize> = Vec::new();
        let mut skipped = Vec::new();
        let mut tolerated = Vec::new();
        let mut failure: Option<(usize, FailureStage, ActionFailure)> = None;

        for (idx, hooked) in self.actions.iter().enumerate() {
            let action = &hooked.action;

            if !hooked.is_enabled() {
                ctx.log
                    .info(&format!("Skipping {}.", action.short_description()));
                skipped.push(hooked.name());
                continue;
            }

            if let Err(err) = hooked.run_pre(&ctx) {
                failure = Some((idx, FailureStage::PreCommand, err));
                break;
            }

            ctx.log.info(&format!("Running {}.", action.short_description()));
            match action.run(&ctx, state) {
                Outcome::Completed => completed.push(idx),
                Outcome::Tolerated(err) => {
                    ctx.log.warning(&format!(
                        "{} failed, continuing: {}",
                        hooked.name(),
                        err.message
                    ));
                    tolerated.push(StepRecord::from_result(hooked.name(), Err(err)));
                    continue;
                }
                Outcome::Failed(err) => {
                    failure = Some((idx, FailureStage::Run, err));
                    break;
                }
            }

            if let Err(err) = hooked.run_post(&ctx) {
                failure = Some((idx, FailureStage::PostCommand, err));
                break;
            }
        }

        let completed_names: Vec<String> =
            completed.iter().map(|&i| self.actions[i].name()).collect();

        let Some((failed_idx, stage, error)) = failure else {
            return PipelineReport {
                success: true,
                failed_action: None,
                failed_stage: None,
                error: None,
                completed: completed_names,
                skipped,
                tolerated,
                warnings: recording.into_kept(),
                rollbacks: Vec::new(),
                rollback_status: RollbackStatus::NotNeeded,
                cleanups: Vec::new(),
            };
        };

        let failed_name = self.actions[failed_idx].name();
        ctx.log.error(&format!("{} failed: {}", failed_name, error.message));
        if let Some(output) = &error.output {
            ctx.log.error(output);
        }
        ctx.log.error("Aborting.");

        let rollbacks = self.roll_back(&ctx, state, &completed);
        let cleanups = self.clean_up(&ctx, state, failed_idx, &completed_names);
        let rollback_status = rollback_status(&rollbacks);

        PipelineReport {
            success: false,
            failed_action: Some(failed_name),
            failed_stage: Some(stage),
            error: Some(error),
            completed: completed_names,
            skipped,
            tolerated,
            warnings: recording.into_kept(),
            rollbacks,
            rollback_status,
            cleanups,
        }
    }

    fn roll_back(
        &self,
        ctx: &DeployContext,
        state: &RunState,
        completed: &[usize],
    ) -> Vec<StepRecord> {
        let mut records = Vec::new();

        for &idx in completed.iter().rev() {
            let action = &self.actions[idx].action;
            let Some(result) = action.rollback(ctx, state) else {
                continue;
            };

            match &result {
                Ok(()) => ctx.log.success(&format!(
                    "Rolled back {}.",
                    action.short_description()
                )),
                Err(err) => ctx.log.error(&format!(
                    "Error rolling back {}: {}",
                    action.short_description(),
                    err.message
                )),
            }
            records.push(StepRecord::from_result(action.name(), result));
        }

        records
    }

    /// Cleanup actions past the failure point whose guard completed.
    fn clean_up(
        &self,
        ctx: &DeployContext,
        state: &mut RunState,
        failed_idx: usize,
        completed: &[String],
    ) -> Vec<StepRecord> {
        let mut records = Vec::new();

        for hooked in self.actions.iter().skip(failed_idx + 1) {
            let action = &hooked.action;
            let Some(guard) = action.cleanup_guard() else {
                continue;
            };
            if !hooked.is_enabled() || !completed.iter().any(|c| c == guard) {
                continue;
            }

            ctx.log.info(&format!("Running {}.", action.short_description()));
            let result = match action.run(ctx, state) {
                Outcome::Completed => Ok(()),
                Outcome::Failed(err) | Outcome::Tolerated(err) => {
                    ctx.log.error(&format!(
                        "Error during cleanup {}: {}",
                        action.short_description(),
                        err.message
                    ));
                    Err(err)
                }
            };
            records.push(StepRecord::from_result(hooked.name(), result));
        }

        records
    }
}

fn rollback_status(records: &[StepRecord]) -> RollbackStatus {
    let succeeded = records.iter().filter(|r| r.success).count();
    if succeeded == records.len() {
        RollbackStatus::All
    } else if succeeded == 0 {
        RollbackStatus::None
    } else {
        RollbackStatus::Partial
    }
}
