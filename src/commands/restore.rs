use clap::Args;
use serde::Serialize;

use drydock::log::DeployLog;
use drydock::restore::{self, RestoreOutput};

use super::{CmdResult, ConfirmArgs, Session, SettingsBuilder};

#[derive(Args)]
pub struct RestoreArgs {
    /// Site alias (`@name` or `name`)
    pub alias: String,

    /// Dump to restore, as numbered in the listing (1 is the newest)
    #[arg(long, value_name = "N")]
    pub choice: Option<usize>,

    /// Directory the database dumps were written to
    #[arg(long, value_name = "DIR")]
    pub dump_dir: Option<String>,

    /// Keep the site online during the restore
    #[arg(long)]
    pub no_offline: bool,

    /// Skip clearing caches
    #[arg(long)]
    pub no_cc_all: bool,

    #[command(flatten)]
    pub confirm: ConfirmArgs,

    /// Extra settings as `--key value` pairs
    #[arg(last = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,
}

#[derive(Serialize)]
pub struct RestoreCommandOutput {
    pub command: String,
    pub alias: String,
    pub choices: Vec<String>,
    pub dump_file: String,
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RestoreOutput>,
}

pub fn run(args: RestoreArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<RestoreCommandOutput> {
    let command_line = SettingsBuilder::default()
        .value("dump-dir", args.dump_dir)
        .flag("no-offline", args.no_offline)
        .flag("no-cc-all", args.no_cc_all)
        .extra(&args.extra)?;

    let session = Session::open(&args.alias, &command_line)?;
    let found = restore::candidates(
        session.alias.clone(),
        &session.defaults,
        command_line,
        &session.ops,
        &session.log,
    )?;

    let choices = found.choices();
    session
        .log
        .info(&format!("Dumps for {}:", session.alias.display_name()));
    for line in &choices {
        session.log.info(&format!("  {}", line));
    }

    let choice = match args.choice {
        Some(choice) => choice,
        None => ask_choice(choices.len())?,
    };

    let prepared = found.choose(choice, &session.ops, &session.log)?;
    let steps = prepared.plan();
    for step in &steps {
        session.log.info(&format!("  {}", step));
    }

    let mut output = RestoreCommandOutput {
        command: "restore.aborted".to_string(),
        alias: session.alias.display_name(),
        choices,
        dump_file: prepared.dump_file.clone(),
        steps,
        result: None,
    };

    let question = format!("Restore {} from {}?", output.alias, output.dump_file);
    if !args.confirm.confirmed(&question)? {
        session.abort();
        return Ok((output, 0));
    }

    let result = prepared.execute(&session.ops, &session.log);
    let exit_code = if result.report.success { 0 } else { 1 };
    output.command = "restore.run".to_string();
    output.result = Some(result);

    Ok((output, exit_code))
}

fn ask_choice(count: usize) -> drydock::Result<usize> {
    if !crate::tty::is_stdin_tty() {
        return Err(drydock::Error::validation_missing_argument(vec![
            "choice".to_string(),
        ])
        .with_hint("Pass --choice N to pick a dump without a terminal"));
    }

    let answer = crate::tty::prompt(&format!("Restore which dump? [1-{}] ", count))?;
    parse_choice(&answer)
}

fn parse_choice(answer: &str) -> drydock::Result<usize> {
    answer.trim().parse::<usize>().map_err(|_| {
        drydock::Error::validation_invalid_argument(
            "choice",
            "Expected the number of a dump",
            Some(answer.to_string()),
            None,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_must_be_a_number() {
        assert_eq!(parse_choice(" 2 ").unwrap(), 2);
        assert!(parse_choice("latest").is_err());
        assert!(parse_choice("").is_err());
    }
}
