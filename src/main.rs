use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{actions, deploy, restore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "drydock")]
#[command(version = VERSION)]
#[command(about = "Deploy sites with automatic rollback")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a branch, tag or SHA to a site
    Deploy(deploy::DeployArgs),
    /// Restore a site from one of its database dumps
    Restore(restore::RestoreArgs),
    /// List the deployment actions
    Actions(actions::ActionsArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
