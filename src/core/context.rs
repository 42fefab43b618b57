//! What every action can see while a pipeline runs.

use serde::Serialize;

use crate::alias::Alias;
use crate::git;
use crate::log::DeployLog;
use crate::operation::{CliOption, SiteOperations};
use crate::settings::Settings;
use crate::ssh::CommandOutput;

/// Read-only view shared by all actions of one run.
pub struct DeployContext<'a> {
    pub alias: &'a Alias,
    pub settings: &'a Settings,
    pub ops: &'a dyn SiteOperations,
    pub log: &'a dyn DeployLog,
}

impl<'a> DeployContext<'a> {
    pub fn new(
        alias: &'a Alias,
        settings: &'a Settings,
        ops: &'a dyn SiteOperations,
        log: &'a dyn DeployLog,
    ) -> Self {
        Self {
            alias,
            settings,
            ops,
            log,
        }
    }

    pub fn invoke(&self, operation: &str, args: &[&str], options: &[CliOption]) -> CommandOutput {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.ops.invoke(self.alias, operation, &args, options)
    }

    pub fn shell(&self, command: &str) -> CommandOutput {
        self.ops.exec_shell(self.alias, command)
    }

    pub fn head(&self) -> Option<String> {
        git::head(self.ops, self.alias)
    }
}

/// Maintenance mode as it was before the site was taken offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "value")]
pub enum MaintenanceSnapshot {
    Unset,
    Value(String),
}

/// Facts recorded by actions for their own rollback and for reporting.
/// Each field is written once by the action that owns it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_maintenance: Option<MaintenanceSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_head: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_dump: Option<String>,
}
