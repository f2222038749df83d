//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use kiln_core::DriftPolicy;

/// Kiln - materialize a compiled SQL project and track its state
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the database path
    #[arg(short, long, global = true, env = "KILN_TARGET")]
    pub target: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run seeds, functions and every model once, recording all failures
    Execute(RunArgs),

    /// Run models in order with their tests, stopping at the first failure
    Build(RunArgs),

    /// Show the recorded state of every model
    State(StateArgs),
}

/// Arguments shared by `execute` and `build`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Maximum concurrent models (execute only)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Rebuild incremental models from their full query
    #[arg(long)]
    pub full_refresh: bool,

    /// Override the configured drift policy
    #[arg(long, value_enum)]
    pub drift_policy: Option<DriftPolicyArg>,

    /// Skip seed loading
    #[arg(long)]
    pub no_seeds: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the state command
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON on stdout
    Json,
}

/// Drift policy as a command-line value
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftPolicyArg {
    Warn,
    Error,
    Ignore,
}

impl From<DriftPolicyArg> for DriftPolicy {
    fn from(arg: DriftPolicyArg) -> Self {
        match arg {
            DriftPolicyArg::Warn => DriftPolicy::Warn,
            DriftPolicyArg::Error => DriftPolicy::Error,
            DriftPolicyArg::Ignore => DriftPolicy::Ignore,
        }
    }
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
