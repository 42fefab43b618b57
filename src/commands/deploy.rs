use clap::Args;
use serde::Serialize;

use drydock::deploy::{self, DeployOutput, DeployPlan};
use drydock::log::DeployLog;

use super::{CmdResult, ConfirmArgs, Session, SettingsBuilder};

#[derive(Args)]
pub struct DeployArgs {
    /// Site alias (`@name` or `name`)
    pub alias: String,

    /// Branch to deploy
    #[arg(long)]
    pub branch: Option<String>,

    /// Tag to deploy
    #[arg(long)]
    pub tag: Option<String>,

    /// Commit SHA to deploy
    #[arg(long)]
    pub sha: Option<String>,

    /// Skip the database dump
    #[arg(long)]
    pub no_dump: bool,

    /// Skip database updates
    #[arg(long)]
    pub no_updb: bool,

    /// Skip clearing caches
    #[arg(long)]
    pub no_cc_all: bool,

    /// Keep the site online during the deployment
    #[arg(long)]
    pub no_offline: bool,

    /// Do not check out any code
    #[arg(long)]
    pub no_deploy: bool,

    /// Number of dumps to keep for this alias (0 keeps all)
    #[arg(long, value_name = "N")]
    pub num_dumps: Option<u64>,

    /// Directory the database dumps are written to
    #[arg(long, value_name = "DIR")]
    pub dump_dir: Option<String>,

    /// Restart apache2 after deploying code
    #[arg(long)]
    pub restart_apache2: bool,

    /// Restart varnish once the site is back online
    #[arg(long)]
    pub restart_varnish: bool,

    /// Webhook to notify after a successful deployment
    #[arg(long, value_name = "URL")]
    pub notify_url: Option<String>,

    #[command(flatten)]
    pub confirm: ConfirmArgs,

    /// Extra settings as `--key value` pairs, e.g. `-- --pre-deploy "drush cr"`
    #[arg(last = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,
}

#[derive(Serialize)]
pub struct DeployCommandOutput {
    pub command: String,
    pub plan: DeployPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DeployOutput>,
}

pub fn run(args: DeployArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DeployCommandOutput> {
    let command_line = SettingsBuilder::default()
        .value("branch", args.branch)
        .value("tag", args.tag)
        .value("sha", args.sha)
        .flag("no-dump", args.no_dump)
        .flag("no-updb", args.no_updb)
        .flag("no-cc-all", args.no_cc_all)
        .flag("no-offline", args.no_offline)
        .flag("no-deploy", args.no_deploy)
        .value("num-dumps", args.num_dumps)
        .value("dump-dir", args.dump_dir)
        .flag("restart-apache2", args.restart_apache2)
        .flag("restart-varnish", args.restart_varnish)
        .value("notify-url", args.notify_url)
        .extra(&args.extra)?;

    let session = Session::open(&args.alias, &command_line)?;
    let prepared = deploy::prepare(
        session.alias.clone(),
        &session.defaults,
        command_line,
        &session.ops,
        &session.log,
    )?;

    let plan = prepared.plan();
    session.log.info(&format!(
        "Deploying {} to {}:",
        prepared.revision.describe(),
        plan.alias
    ));
    for step in &plan.steps {
        session.log.info(&format!("  {}", step));
    }

    if let Some(message) = &plan.confirm_message {
        session.log.notice(message);
    }
    if !args.confirm.confirmed("Continue?")? {
        session.abort();
        return Ok((
            DeployCommandOutput {
                command: "deploy.aborted".to_string(),
                plan,
                result: None,
            },
            0,
        ));
    }

    let result = prepared.execute(&session.ops, &session.log);
    let exit_code = if result.report.success { 0 } else { 1 };

    Ok((
        DeployCommandOutput {
            command: "deploy.run".to_string(),
            plan,
            result: Some(result),
        },
        exit_code,
    ))
}
