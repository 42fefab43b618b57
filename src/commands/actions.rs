use clap::Args;
use serde::Serialize;

use drydock::action::ActionKind;

use super::CmdResult;

#[derive(Args)]
pub struct ActionsArgs {
    /// Show a single action by name (e.g. `deploy`, `restart-<service>`)
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionInfo {
    pub name: &'static str,
    pub short_description: &'static str,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch: Option<&'static str>,
    pub rollback: bool,
    pub best_effort: bool,
    pub used_by: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct ActionsOutput {
    pub command: String,
    pub actions: Vec<ActionInfo>,
}

fn used_by(kind: ActionKind) -> Vec<&'static str> {
    match kind {
        ActionKind::DumpDatabase | ActionKind::RestartService | ActionKind::RunDatabaseUpdates => {
            vec!["deploy"]
        }
        ActionKind::RestoreDatabase => vec!["restore"],
        _ => vec!["deploy", "restore"],
    }
}

fn describe(kind: ActionKind) -> ActionInfo {
    ActionInfo {
        name: kind.name(),
        short_description: kind.short_description(),
        description: kind.description(),
        switch: kind.switch(),
        rollback: kind.has_rollback(),
        best_effort: kind.is_best_effort(),
        used_by: used_by(kind),
    }
}

pub fn run(args: ActionsArgs) -> CmdResult<ActionsOutput> {
    let actions: Vec<ActionInfo> = ActionKind::ALL
        .iter()
        .copied()
        .filter(|kind| args.name.as_deref().map_or(true, |name| kind.name() == name))
        .map(describe)
        .collect();

    if let (Some(name), true) = (&args.name, actions.is_empty()) {
        return Err(drydock::Error::validation_invalid_argument(
            "name",
            format!("Unknown action '{}'", name),
            Some(name.clone()),
            Some(ActionKind::ALL.iter().map(|k| k.name().to_string()).collect()),
        ));
    }

    Ok((
        ActionsOutput {
            command: "actions.list".to_string(),
            actions,
        },
        0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_action_in_order() {
        let (output, code) = run(ActionsArgs { name: None }).unwrap();
        assert_eq!(code, 0);
        let names: Vec<&str> = output.actions.iter().map(|a| a.name).collect();
        assert_eq!(names.first(), Some(&"sanity"));
        assert_eq!(names.len(), ActionKind::ALL.len());
    }

    #[test]
    fn single_action_by_name() {
        let (output, _) = run(ActionsArgs {
            name: Some("cc-all".to_string()),
        })
        .unwrap();
        assert_eq!(output.actions.len(), 1);
        assert_eq!(output.actions[0].description, "Run the clear all caches action.");
        assert_eq!(output.actions[0].switch, Some("no-cc-all"));
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(run(ActionsArgs {
            name: Some("reboot".to_string()),
        })
        .is_err());
    }
}
