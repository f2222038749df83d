//! Model execution: one model from its parsed definition to recorded state.

use kiln_core::sql_utils::{quote_ident_if_needed, quote_qualified};
use kiln_core::state::{config_hash, sql_hash};
use kiln_core::{
    collect_tags, resolve_incremental_config, resolve_location, resolve_materialization,
    resolve_metadata, validate_columns, CoreError, IncrementalConfig, Manifest, Materialization,
    NodeName, ParsedModel, RelationDocs, ResolvedMetadata, StateUpdate,
};
use kiln_db::{Database, DatabaseCore, DatabaseSchema};

use crate::context::RunContext;
use crate::error::{RunError, RunResult};
use crate::incremental::{apply_watermark, materialize_incremental, IncrementalRun};
use crate::results::TableSummary;
use crate::state::{check_state, StateCheck};

/// What a successful model execution produced
#[derive(Debug, Clone)]
pub struct ModelOutcome {
    /// Physical relation name
    pub relation: String,
    pub materialization: Materialization,
    /// `None` when introspection failed after the model was built
    pub info: Option<TableSummary>,
    /// Validated documentation, when the model has any
    pub docs: Option<RelationDocs>,
}

/// Materialize one model and persist its new state.
///
/// Errors are returned, never recorded here; the orchestrator decides how
/// a failure propagates.
pub async fn execute_model(
    ctx: &RunContext,
    manifest: &Manifest,
    name: &NodeName,
) -> RunResult<ModelOutcome> {
    let model = manifest
        .models
        .get(name)
        .ok_or_else(|| CoreError::NodeNotFound {
            name: name.to_string(),
        })?;
    let raw_sql = model.sql().ok_or_else(|| CoreError::NoSql {
        name: name.to_string(),
    })?;

    let resolved = resolve_metadata(model);
    let declared =
        resolve_materialization(model, &resolved, ctx.options().default_materialization);
    let materialization = supported_or_table(ctx, name, declared);

    let relation = ctx.relation_name(name);
    if let Some(schema) = name.schema_or(ctx.options().active_schema.as_deref()) {
        ctx.ensure_schema(schema).await?;
    }

    if let StateCheck::Drifted { recorded } =
        check_state(ctx, name, &relation, materialization).await?
    {
        ctx.db().drop_relation(&relation).await?;
        ctx.decide(
            name,
            format!(
                "dropped {} ({}) to rebuild it as {}",
                relation, recorded, materialization
            ),
        );
    }

    let docs = relation_docs(ctx, name, model, &resolved);
    let sql = ctx.qualify(raw_sql);
    let db = ctx.db();

    let mut update = StateUpdate {
        sql_hash: Some(sql_hash(raw_sql)),
        config_hash: Some(config_hash(&resolved)?),
        ..StateUpdate::default()
    };

    match materialization {
        Materialization::Table => db.create_table_as(&relation, &sql, docs.as_ref()).await?,
        Materialization::View => db.create_view_as(&relation, &sql, docs.as_ref()).await?,
        Materialization::MaterializedView => {
            db.create_materialized_view_as(&relation, &sql, docs.as_ref())
                .await?
        }
        Materialization::ExternalTable => {
            let location = resolve_location(model).ok_or_else(|| RunError::Materialization {
                name: name.to_string(),
                reason: "external_table requires a location".to_string(),
            })?;
            db.create_external_table(&relation, &location, docs.as_ref())
                .await?
        }
        Materialization::Incremental => {
            let config = resolve_incremental_config(model, &resolved);
            config.validate(name)?;
            update.last_processed_value =
                run_incremental(ctx, name, &relation, &sql, &config, docs.as_ref()).await?;
            update.strategy = Some(config.strategy);
        }
    }

    attach_object_tags(ctx, model, &relation).await?;

    ctx.state().save(name, materialization, update)?;

    let info = match db.get_table_info(&relation).await {
        Ok(info) => Some(TableSummary::from(info)),
        Err(e) => {
            ctx.warn(format!("Could not introspect {}: {}", relation, e));
            None
        }
    };

    Ok(ModelOutcome {
        relation,
        materialization,
        info,
        docs,
    })
}

/// Downgrade kinds the backend cannot create to `table`
fn supported_or_table(
    ctx: &RunContext,
    name: &NodeName,
    declared: Materialization,
) -> Materialization {
    let db = ctx.db();
    if db.supported_materializations().contains(&declared) {
        return declared;
    }
    ctx.warn(format!(
        "{} does not support {} materialization; building {} as table",
        db.db_type(),
        declared,
        name
    ));
    Materialization::Table
}

/// Validated docs for the relation. Invalid column metadata only costs the
/// documentation, never the build.
fn relation_docs(
    ctx: &RunContext,
    name: &NodeName,
    model: &ParsedModel,
    resolved: &ResolvedMetadata,
) -> Option<RelationDocs> {
    let description = resolved.description().or(model.description.as_deref());
    let no_columns = serde_json::Value::Array(Vec::new());
    let schema = resolved.schema().unwrap_or(&no_columns);

    match validate_columns(name, schema, description) {
        Ok(docs) if docs.description.is_none() && docs.columns.is_empty() => None,
        Ok(docs) => Some(docs),
        Err(e) => {
            ctx.warn(format!("{}; {} is built without documentation", e, name));
            None
        }
    }
}

async fn attach_object_tags(
    ctx: &RunContext,
    model: &ParsedModel,
    relation: &str,
) -> RunResult<()> {
    let tags = collect_tags(model);
    if tags.object_tags.is_empty() {
        return Ok(());
    }
    match ctx.db().as_tag_attacher() {
        Some(attacher) => attacher.attach_object_tags(relation, &tags.object_tags).await?,
        None => log::debug!("Skipping object tags for {}", relation),
    }
    Ok(())
}

/// Build or extend an incremental model. Returns the new watermark.
async fn run_incremental(
    ctx: &RunContext,
    name: &NodeName,
    relation: &str,
    sql: &str,
    config: &IncrementalConfig,
    docs: Option<&RelationDocs>,
) -> RunResult<Option<String>> {
    let db = ctx.db();
    let exists = db.relation_exists(relation).await?;
    let first_build = !exists || ctx.options().full_refresh;

    let previous = if first_build {
        None
    } else {
        ctx.state()
            .get(name)
            .and_then(|s| s.last_processed_value.clone())
    };

    let (source, filter) = apply_watermark(sql, config, previous.as_deref(), first_build);
    if let Some(filter) = filter {
        ctx.decide(name, format!("watermark filter: {}", filter));
    }

    if first_build {
        db.create_table_as(relation, &source, docs).await?;
        let reason = if exists { "full refresh" } else { "first run" };
        ctx.decide(name, format!("{}: created {} from the full query", reason, relation));
    } else {
        materialize_incremental(
            ctx,
            IncrementalRun {
                node: name,
                target: relation,
                source_sql: &source,
                config,
            },
        )
        .await?;
    }

    match &config.filter_column {
        Some(column) => {
            let max = db
                .query_one(&format!(
                    "SELECT CAST(MAX({}) AS VARCHAR) FROM {}",
                    quote_ident_if_needed(column),
                    quote_qualified(relation)
                ))
                .await?;
            Ok(max.or(previous))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
