//! Seed loading, once per run and before any function or model.

use kiln_core::{discover_seeds, Seed};
use kiln_db::DatabaseSeed;
use std::path::PathBuf;

use crate::context::RunContext;
use crate::error::RunResult;
use crate::results::{FailedTable, SeedReport};

/// Load every seed under `seed_paths` and record the report on the run
pub async fn load_seeds(ctx: &RunContext, seed_paths: &[PathBuf]) -> SeedReport {
    let mut report = SeedReport::default();

    for seed in discover_seeds(seed_paths) {
        let table = seed.qualified_name();
        match load_seed(ctx, &seed).await {
            Ok(()) => {
                log::info!("Loaded seed {} ({})", table, seed.format);
                report.loaded_tables.push(table);
            }
            Err(e) => {
                log::error!("Seed {} failed: {}", table, e);
                report.failed_tables.push(FailedTable {
                    table,
                    error: e.to_string(),
                });
            }
        }
    }

    ctx.recorder().seeds(report.clone());
    report
}

async fn load_seed(ctx: &RunContext, seed: &Seed) -> RunResult<()> {
    if let Some(schema) = &seed.schema {
        ctx.ensure_schema(schema).await?;
    }
    ctx.db()
        .load_seed(&seed.qualified_name(), &seed.path, seed.format)
        .await?;
    Ok(())
}
