//! Incremental strategies: append, merge and delete-insert.
//!
//! Every strategy writes into an existing target. The source query arrives
//! already qualified against the active schema and generated statements run
//! as built, so models named like the aliases below are never confused with
//! them.

use kiln_core::sql_utils::{quote_ident_if_needed, quote_literal, quote_qualified};
use kiln_core::{IncrementalConfig, IncrementalStrategy, NodeName};
use kiln_db::{DatabaseCore, DatabaseSchema};
use std::collections::HashSet;

use crate::context::RunContext;
use crate::error::{RunError, RunResult};

/// Alias of the source query in generated statements
const SOURCE_ALIAS: &str = "source";

/// Alias of the target relation in generated statements
const TARGET_ALIAS: &str = "target";

/// One incremental step for one model
#[derive(Debug, Clone, Copy)]
pub struct IncrementalRun<'a> {
    pub node: &'a NodeName,
    /// Physical target relation
    pub target: &'a str,
    /// Qualified query producing the new rows
    pub source_sql: &'a str,
    pub config: &'a IncrementalConfig,
}

/// Apply the configured strategy to an existing target
pub async fn materialize_incremental(ctx: &RunContext, run: IncrementalRun<'_>) -> RunResult<()> {
    if !ctx.db().relation_exists(run.target).await? {
        return Err(RunError::Materialization {
            name: run.node.to_string(),
            reason: format!("incremental target {} does not exist", run.target),
        });
    }

    match run.config.strategy {
        IncrementalStrategy::Append => append(ctx, run).await,
        IncrementalStrategy::Merge => merge(ctx, run).await,
        IncrementalStrategy::DeleteInsert => delete_insert(ctx, run).await,
    }
}

fn insert_sql(target: &str, source_sql: &str) -> String {
    format!("INSERT INTO {} {}", quote_qualified(target), source_sql)
}

async fn append(ctx: &RunContext, run: IncrementalRun<'_>) -> RunResult<()> {
    let inserted = ctx
        .db()
        .execute(&insert_sql(run.target, run.source_sql))
        .await?;
    ctx.decide(run.node, format!("append: inserted {} row(s)", inserted));
    Ok(())
}

async fn merge(ctx: &RunContext, run: IncrementalRun<'_>) -> RunResult<()> {
    // Live columns, so columns added out of band are merged too
    let columns: Vec<String> = ctx
        .db()
        .get_table_info(run.target)
        .await?
        .columns
        .into_iter()
        .map(|c| c.name)
        .collect();

    let known: HashSet<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    if let Some(missing) = run
        .config
        .unique_key
        .iter()
        .find(|k| !known.contains(&k.to_lowercase()))
    {
        return Err(RunError::Materialization {
            name: run.node.to_string(),
            reason: format!("unique_key column '{}' not found in {}", missing, run.target),
        });
    }

    let sql = build_merge_sql(run.target, run.source_sql, &run.config.unique_key, &columns)?;
    ctx.db().execute(&sql).await?;
    ctx.decide(
        run.node,
        format!("merge on ({})", run.config.unique_key.join(", ")),
    );
    Ok(())
}

/// Generate the MERGE statement for an upsert of `source_sql` into `target`.
///
/// `columns` are the target's columns in table order. Non-key columns are
/// updated on match; with no non-key columns the first key column is
/// assigned to itself. Output depends only on the arguments.
pub fn build_merge_sql(
    target: &str,
    source_sql: &str,
    unique_key: &[String],
    columns: &[String],
) -> RunResult<String> {
    let Some(first_key) = unique_key.first() else {
        return Err(RunError::Materialization {
            name: target.to_string(),
            reason: "merge requires a non-empty unique_key".to_string(),
        });
    };

    let keys: HashSet<String> = unique_key.iter().map(|k| k.to_lowercase()).collect();

    let on = unique_key
        .iter()
        .map(|k| {
            let k = quote_ident_if_needed(k);
            format!("{TARGET_ALIAS}.{k} = {SOURCE_ALIAS}.{k}")
        })
        .collect::<Vec<_>>()
        .join(" AND ");

    let mut updates: Vec<String> = columns
        .iter()
        .filter(|c| !keys.contains(&c.to_lowercase()))
        .map(|c| {
            let c = quote_ident_if_needed(c);
            format!("{c} = {SOURCE_ALIAS}.{c}")
        })
        .collect();
    if updates.is_empty() {
        let k = quote_ident_if_needed(first_key);
        updates.push(format!("{k} = {TARGET_ALIAS}.{k}"));
    }

    let insert_columns = columns
        .iter()
        .map(|c| quote_ident_if_needed(c))
        .collect::<Vec<_>>();
    let insert_values = insert_columns
        .iter()
        .map(|c| format!("{SOURCE_ALIAS}.{c}"))
        .collect::<Vec<_>>();

    Ok(format!(
        "MERGE INTO {} AS {TARGET_ALIAS}\n\
         USING ({}) AS {SOURCE_ALIAS}\n\
         ON {}\n\
         WHEN MATCHED THEN UPDATE SET {}\n\
         WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        quote_qualified(target),
        source_sql,
        on,
        updates.join(", "),
        insert_columns.join(", "),
        insert_values.join(", ")
    ))
}

/// DELETE predicate matching every target row the source is about to replace
pub fn derive_delete_predicate(unique_key: &[String], source_sql: &str) -> Option<String> {
    match unique_key {
        [] => None,
        [key] => {
            let k = quote_ident_if_needed(key);
            Some(format!(
                "{TARGET_ALIAS}.{k} IN (SELECT {k} FROM ({source_sql}) AS {SOURCE_ALIAS})"
            ))
        }
        keys => {
            let join = keys
                .iter()
                .map(|k| {
                    let k = quote_ident_if_needed(k);
                    format!("{TARGET_ALIAS}.{k} = {SOURCE_ALIAS}.{k}")
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            Some(format!(
                "EXISTS (SELECT 1 FROM ({source_sql}) AS {SOURCE_ALIAS} WHERE {join})"
            ))
        }
    }
}

async fn delete_insert(ctx: &RunContext, run: IncrementalRun<'_>) -> RunResult<()> {
    let predicate = match &run.config.delete_predicate {
        Some(predicate) => ctx.qualify(predicate),
        None => derive_delete_predicate(&run.config.unique_key, run.source_sql).ok_or_else(
            || RunError::Materialization {
                name: run.node.to_string(),
                reason: "delete_insert requires a delete_predicate or a unique_key".to_string(),
            },
        )?,
    };

    let delete = format!(
        "DELETE FROM {} AS {TARGET_ALIAS} WHERE {}",
        quote_qualified(run.target),
        predicate
    );
    let insert = insert_sql(run.target, run.source_sql);
    let db = ctx.db();

    if db.supports_transactions() {
        db.execute_in_transaction(&[delete, insert]).await?;
        ctx.decide(run.node, "delete_insert in one transaction".to_string());
        return Ok(());
    }

    let deleted = db.execute(&delete).await?;
    if let Err(e) = db.execute(&insert).await {
        ctx.warn(format!(
            "partial delete-insert on {}: {} row(s) were deleted but the insert failed: {}",
            run.target, deleted, e
        ));
        return Err(RunError::PartialDeleteInsert {
            table: run.target.to_string(),
            source: e,
        });
    }
    ctx.decide(
        run.node,
        format!("delete_insert without transaction: deleted {} row(s)", deleted),
    );
    Ok(())
}

/// Restrict `sql` to rows past the model's watermark.
///
/// On a first build only `start_value` applies (inclusive). Later runs use
/// the recorded `last_processed_value`, else `start_value`, exclusive, moved
/// back by `lookback` when set. Returns the SQL and a description of the
/// filter, if one was applied.
pub fn apply_watermark(
    sql: &str,
    config: &IncrementalConfig,
    last_processed: Option<&str>,
    first_build: bool,
) -> (String, Option<String>) {
    let Some(column) = config.filter_column.as_deref() else {
        return (sql.to_string(), None);
    };
    let column = quote_ident_if_needed(column);

    let condition = if first_build {
        match config.start_value.as_deref() {
            Some(start) => format!("{} >= {}", column, quote_literal(start)),
            None => return (sql.to_string(), None),
        }
    } else {
        let Some(watermark) = last_processed.or(config.start_value.as_deref()) else {
            return (sql.to_string(), None);
        };
        let bound = match config.lookback.as_deref() {
            Some(lookback) => format!(
                "CAST({} AS TIMESTAMP) - INTERVAL {}",
                quote_literal(watermark),
                quote_literal(lookback)
            ),
            None => quote_literal(watermark),
        };
        format!("{} > {}", column, bound)
    };

    (
        format!("SELECT * FROM ({}) AS kiln_src WHERE {}", sql, condition),
        Some(condition),
    )
}

#[cfg(test)]
#[path = "incremental_test.rs"]
mod tests;
