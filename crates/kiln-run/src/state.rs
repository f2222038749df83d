//! State checks against the backend: existence, rebuild and drift.

use kiln_core::{CoreError, DriftPolicy, Materialization, ModelState, NodeName};
use kiln_db::{Database, DatabaseSchema, DbResult, RelationKind};

use crate::context::RunContext;
use crate::error::RunResult;

/// What the pre-materialization check found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateCheck {
    /// Nothing recorded and nothing in the backend
    New,
    /// Recorded kind matches the declared kind
    Consistent,
    /// Kind changed and the policy let the run continue
    Drifted { recorded: Materialization },
}

/// Whether `relation` exists in the backend
pub async fn exists_in_backend(db: &dyn Database, relation: &str) -> DbResult<bool> {
    db.relation_exists(relation).await
}

/// Reconstruct a best-effort state record from backend introspection.
///
/// The physical relation kind is recorded when it cannot have been produced
/// by the declared kind; otherwise the declared kind is kept. Hashes are
/// left empty.
pub async fn rebuild_from_backend(
    db: &dyn Database,
    name: &NodeName,
    relation: &str,
    declared: Materialization,
) -> DbResult<ModelState> {
    let info = db.get_table_info(relation).await?;
    let materialization = match info.kind {
        Some(kind) if !produces(declared, kind) => kind.as_materialization(),
        _ => declared,
    };
    Ok(ModelState::rebuilt(name.clone(), materialization))
}

/// Whether materializing as `kind` leaves a relation of type `relation`
fn produces(kind: Materialization, relation: RelationKind) -> bool {
    match relation {
        RelationKind::Table => kind.is_table_like(),
        RelationKind::View => matches!(
            kind,
            Materialization::View | Materialization::MaterializedView | Materialization::ExternalTable
        ),
    }
}

/// Check recorded state before materializing `name` as `declared`.
///
/// A missing record for an existing relation is rebuilt from the backend
/// with a warning. A kind mismatch is handled by the run's drift policy:
/// `error` fails the node, `warn` records one warning, `ignore` is silent.
pub async fn check_state(
    ctx: &RunContext,
    name: &NodeName,
    relation: &str,
    declared: Materialization,
) -> RunResult<StateCheck> {
    let recorded = ctx.state().get(name).map(|s| s.materialization);

    let recorded = match recorded {
        Some(kind) => kind,
        None => {
            if !exists_in_backend(ctx.db(), relation).await? {
                return Ok(StateCheck::New);
            }
            let rebuilt = rebuild_from_backend(ctx.db(), name, relation, declared).await?;
            ctx.warn(format!(
                "{} exists in the backend but has no recorded state; rebuilt as {}",
                relation, rebuilt.materialization
            ));
            let kind = rebuilt.materialization;
            ctx.state().put(rebuilt)?;
            kind
        }
    };

    if recorded == declared {
        return Ok(StateCheck::Consistent);
    }

    match ctx.options().drift_policy {
        DriftPolicy::Error => Err(CoreError::MaterializationDrift {
            name: name.to_string(),
            recorded: recorded.to_string(),
            declared: declared.to_string(),
        }
        .into()),
        DriftPolicy::Warn => {
            ctx.warn(format!(
                "Materialization of {} changed from {} to {}",
                name, recorded, declared
            ));
            Ok(StateCheck::Drifted { recorded })
        }
        DriftPolicy::Ignore => Ok(StateCheck::Drifted { recorded }),
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
