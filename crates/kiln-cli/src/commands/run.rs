//! `kiln execute` and `kiln build`

use anyhow::{Context, Result};
use kiln_run::{ExecutionResult, Orchestrator, RunMode};
use std::sync::Arc;

use crate::cli::{GlobalArgs, OutputFormat, RunArgs};
use crate::commands::common::{
    config_error, create_database_connection, load_manifest, load_project, open_state, run_options,
    write_json_results, ExitCode,
};
use crate::commands::progress::ProgressObserver;

pub(crate) async fn execute(args: &RunArgs, global: &GlobalArgs, mode: RunMode) -> Result<()> {
    let project = load_project(global)?;
    let manifest = load_manifest(&project)?;
    let state = open_state(&project)?;
    let db = create_database_connection(&project, global)?;
    let options = run_options(&project, args);

    log::info!(
        "Starting {} of {} ({} model(s), {} function(s))",
        mode,
        project.config.name,
        manifest.models.len(),
        manifest.functions.len()
    );

    let mut orchestrator = Orchestrator::new(db, manifest, state, options)
        .context("Failed to plan the run")
        .map_err(config_error)?;
    if args.output == OutputFormat::Text && !args.quiet {
        orchestrator = orchestrator.with_observer(Arc::new(ProgressObserver::new()));
    }

    let result = match mode {
        RunMode::Execute => orchestrator.execute().await,
        RunMode::Build => orchestrator.build().await,
    };

    write_json_results(&project.results_path(), &result)?;

    match args.output {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&result).context("Failed to serialize results")?;
            println!("{}", json);
        }
        OutputFormat::Text => print_summary(&result),
    }

    if result.has_failures() {
        return Err(ExitCode(1).into());
    }
    Ok(())
}

fn print_summary(result: &ExecutionResult) {
    println!();
    if let Some(seeds) = &result.seeds {
        println!(
            "Seeds: {} loaded, {} failed",
            seeds.loaded_tables.len(),
            seeds.failed_tables.len()
        );
        for failed in &seeds.failed_tables {
            println!("  \u{2717} {} - {}", failed.table, failed.error);
        }
    }
    if !result.executed_functions.is_empty() || !result.failed_functions.is_empty() {
        println!(
            "Functions: {} deployed, {} failed",
            result.executed_functions.len(),
            result.failed_functions.len()
        );
    }
    println!(
        "Completed: {} succeeded, {} failed, {} skipped",
        result.executed_tables.len(),
        result.failed_tables.len(),
        result.skipped_tables.len()
    );
    if let Some(summary) = &result.test_results {
        println!(
            "Tests: {} passed, {} failed, {} warning(s)",
            summary.passed, summary.failed, summary.warnings
        );
    }
    if !result.warnings.is_empty() {
        println!("{} warning(s):", result.warnings.len());
        for warning in &result.warnings {
            println!("  ! {}", warning);
        }
    }
    if let Some(reason) = &result.aborted {
        println!("Aborted: {}", reason);
    }
}
