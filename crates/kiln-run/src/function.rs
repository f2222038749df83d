//! Function deployment.
//!
//! Functions are created or replaced in execution order before any model
//! runs. There is no existence check and no versioning: the adapter's
//! create call is expected to replace whatever is there.

use kiln_core::metadata::MAX_DESCRIPTION_LEN;
use kiln_core::{CoreError, Manifest, NodeName, ParsedFunction};
use kiln_db::{Database, DatabaseFunction};

use crate::context::RunContext;
use crate::error::RunResult;
use crate::orchestrator::NodeStatus;

/// Deploy every function of the manifest. A failure is recorded and the
/// next function still runs.
///
/// Returns the names of the functions that failed.
pub async fn execute_functions(ctx: &RunContext, manifest: &Manifest) -> Vec<NodeName> {
    let mut failed = Vec::new();

    for function in manifest.functions_in_order() {
        let name = &function.name;
        ctx.observer().node_started(name);

        match deploy_function(ctx, function).await {
            Ok(()) => {
                log::info!("Created function {}", function.signature());
                ctx.recorder().function_executed(name);
                ctx.observer()
                    .node_finished(name, NodeStatus::Succeeded, None);
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("Function {} failed: {}", name, message);
                ctx.recorder().function_failed(name, message.clone());
                ctx.observer()
                    .node_finished(name, NodeStatus::Failed, Some(&message));
                failed.push(name.clone());
            }
        }
    }

    failed
}

/// Create or replace one function, with its schema and tags
pub async fn deploy_function(ctx: &RunContext, function: &ParsedFunction) -> RunResult<()> {
    if function.sql.trim().is_empty() {
        return Err(CoreError::NoSql {
            name: function.name.to_string(),
        }
        .into());
    }

    if let Some(schema) = function.name.schema() {
        ctx.ensure_schema(schema).await?;
    }

    let db = ctx.db();
    db.create_function(function, description(ctx, function))
        .await?;

    if !function.object_tags.is_empty() {
        match db.as_tag_attacher() {
            Some(attacher) => {
                attacher
                    .attach_object_tags(&function.name, &function.object_tags)
                    .await?
            }
            None => log::debug!("Skipping object tags for function {}", function.name),
        }
    }
    Ok(())
}

/// Description to attach, dropped with a warning when it is too long
fn description<'a>(ctx: &RunContext, function: &'a ParsedFunction) -> Option<&'a str> {
    let description = function.description.as_deref()?;
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        ctx.warn(format!(
            "Description of function {} is {} characters (limit {}); creating it without one",
            function.name, len, MAX_DESCRIPTION_LEN
        ));
        return None;
    }
    Some(description)
}
