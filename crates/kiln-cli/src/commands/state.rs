//! `kiln state`: show what the state file records

use anyhow::{Context, Result};
use kiln_core::ModelState;

use crate::cli::{GlobalArgs, OutputFormat, StateArgs};
use crate::commands::common::{load_project, open_state, print_table};

pub(crate) fn execute(args: &StateArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let store = open_state(&project)?;
    let records: Vec<&ModelState> = store.models().values().collect();

    match args.output {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&records).context("Failed to serialize state")?;
            println!("{}", json);
        }
        OutputFormat::Text if records.is_empty() => {
            println!("No state recorded at {}", project.state_path().display());
        }
        OutputFormat::Text => {
            let rows: Vec<Vec<String>> = records.iter().map(|r| state_row(r)).collect();
            print_table(
                &["NAME", "MATERIALIZATION", "STRATEGY", "WATERMARK", "UPDATED", "ORIGIN"],
                &rows,
            );
        }
    }
    Ok(())
}

fn state_row(state: &ModelState) -> Vec<String> {
    vec![
        state.name.to_string(),
        state.materialization.to_string(),
        state
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
        state
            .last_processed_value
            .clone()
            .unwrap_or_else(|| "-".to_string()),
        state.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        format!("{:?}", state.origin).to_lowercase(),
    ]
}
