//! Kiln CLI - execute and build compiled SQL projects

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::common::ExitCode;
use commands::{run, state};
use kiln_run::RunMode;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result: Result<()> = match &cli.command {
        Commands::Execute(args) => run::execute(args, &cli.global, RunMode::Execute).await,
        Commands::Build(args) => run::execute(args, &cli.global, RunMode::Build).await,
        Commands::State(args) => state::execute(args, &cli.global),
    };

    if let Err(err) = result {
        match err.downcast_ref::<ExitCode>() {
            Some(code) => std::process::exit(code.0),
            None => {
                eprintln!("Error: {:#}", err);
                std::process::exit(1);
            }
        }
    }
}

/// `warn` by default, `info` with --verbose; `RUST_LOG` wins over both
fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}
