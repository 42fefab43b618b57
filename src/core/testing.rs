//! Scripted `SiteOperations` for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::alias::Alias;
use crate::operation::{CliOption, SiteOperations};
use crate::ssh::CommandOutput;
use crate::utils::shell;

struct Rule {
    needle: String,
    responses: VecDeque<CommandOutput>,
}

/// Records every command and answers from rules matched by substring.
/// Later rules win. A rule with several responses hands them out in order
/// and then keeps repeating the last one. Unmatched commands succeed with
/// empty output.
#[derive(Default)]
pub(crate) struct FakeOperations {
    calls: RefCell<Vec<String>>,
    rules: RefCell<Vec<Rule>>,
}

impl FakeOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, needle: &str, output: CommandOutput) -> &Self {
        self.on_seq(needle, vec![output])
    }

    pub fn on_seq(&self, needle: &str, outputs: Vec<CommandOutput>) -> &Self {
        self.rules.borrow_mut().push(Rule {
            needle: needle.to_string(),
            responses: outputs.into(),
        });
        self
    }

    pub fn fail(&self, needle: &str) -> &Self {
        self.on(needle, CommandOutput::failed(1, format!("{} failed", needle)))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, needle: &str) -> bool {
        self.position(needle).is_some()
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c.contains(needle))
    }

    fn respond(&self, command: String) -> CommandOutput {
        self.calls.borrow_mut().push(command.clone());

        let mut rules = self.rules.borrow_mut();
        let Some(rule) = rules
            .iter_mut()
            .rev()
            .find(|rule| command.contains(&rule.needle))
        else {
            return CommandOutput::ok("");
        };

        if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or_default()
        } else {
            rule.responses.front().cloned().unwrap_or_default()
        }
    }
}

impl SiteOperations for FakeOperations {
    fn invoke(
        &self,
        _target: &Alias,
        operation: &str,
        args: &[String],
        options: &[CliOption],
    ) -> CommandOutput {
        let mut parts = vec!["site".to_string(), operation.to_string()];
        if !args.is_empty() {
            parts.push(shell::quote_args(args));
        }
        parts.extend(options.iter().map(CliOption::render));
        self.respond(parts.join(" "))
    }

    fn exec_shell(&self, _target: &Alias, command: &str) -> CommandOutput {
        self.respond(command.to_string())
    }
}
