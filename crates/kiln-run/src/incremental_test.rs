use super::*;
use crate::context::RunOptions;
use crate::results::RunMode;
use kiln_core::StateStore;
use kiln_db::{Database, DuckDbBackend};
use std::sync::Arc;

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

fn context() -> RunContext {
    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
    RunContext::new(
        db,
        StateStore::in_memory(),
        RunOptions::default(),
        std::iter::empty::<&NodeName>(),
    )
}

async fn rows(ctx: &RunContext, sql: &str) -> Vec<Vec<Option<String>>> {
    ctx.db().execute_query(sql).await.unwrap()
}

fn config(strategy: IncrementalStrategy, unique_key: &[&str]) -> IncrementalConfig {
    IncrementalConfig {
        strategy,
        unique_key: keys(unique_key),
        ..IncrementalConfig::default()
    }
}

#[test]
fn test_merge_sql_on_clause_keeps_key_order() {
    let sql = build_merge_sql(
        "orders",
        "SELECT * FROM staged",
        &keys(&["id", "name"]),
        &keys(&["id", "name", "amount"]),
    )
    .unwrap();
    assert!(sql.contains("ON target.id = source.id AND target.name = source.name\n"));
    assert!(sql.contains("WHEN MATCHED THEN UPDATE SET amount = source.amount\n"));
    assert!(sql.ends_with(
        "WHEN NOT MATCHED THEN INSERT (id, name, amount) VALUES (source.id, source.name, source.amount)"
    ));
    assert!(sql.starts_with("MERGE INTO \"orders\" AS target\nUSING (SELECT * FROM staged) AS source\n"));
}

#[test]
fn test_merge_sql_is_deterministic() {
    let args = (
        "analytics.orders",
        "SELECT 1 AS id, 2 AS b, 3 AS a",
        keys(&["id"]),
        keys(&["id", "b", "a"]),
    );
    let first = build_merge_sql(args.0, args.1, &args.2, &args.3).unwrap();
    let second = build_merge_sql(args.0, args.1, &args.2, &args.3).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("UPDATE SET b = source.b, a = source.a"));
}

#[test]
fn test_merge_sql_only_key_columns() {
    let sql = build_merge_sql("t", "SELECT 1 AS id", &keys(&["id"]), &keys(&["id"])).unwrap();
    assert!(sql.contains("WHEN MATCHED THEN UPDATE SET id = target.id\n"));
}

#[test]
fn test_merge_sql_quotes_when_needed() {
    let sql = build_merge_sql(
        "t",
        "SELECT 1",
        &keys(&["Order Id"]),
        &keys(&["Order Id", "total"]),
    )
    .unwrap();
    assert!(sql.contains(r#"ON target."Order Id" = source."Order Id""#));
}

#[test]
fn test_merge_sql_requires_key() {
    assert!(build_merge_sql("t", "SELECT 1", &[], &keys(&["id"])).is_err());
}

#[test]
fn test_derive_delete_predicate() {
    assert_eq!(derive_delete_predicate(&[], "SELECT 1"), None);
    assert_eq!(
        derive_delete_predicate(&keys(&["id"]), "SELECT 1 AS id").unwrap(),
        "target.id IN (SELECT id FROM (SELECT 1 AS id) AS source)"
    );
    assert_eq!(
        derive_delete_predicate(&keys(&["a", "b"]), "S").unwrap(),
        "EXISTS (SELECT 1 FROM (S) AS source WHERE target.a = source.a AND target.b = source.b)"
    );
}

#[test]
fn test_watermark_without_filter_column() {
    let config = IncrementalConfig::default();
    let (sql, applied) = apply_watermark("SELECT 1", &config, Some("5"), false);
    assert_eq!(sql, "SELECT 1");
    assert!(applied.is_none());
}

#[test]
fn test_watermark_first_build_uses_start_value() {
    let config = IncrementalConfig {
        filter_column: Some("updated_at".to_string()),
        start_value: Some("2024-01-01".to_string()),
        ..IncrementalConfig::default()
    };
    let (sql, applied) = apply_watermark("SELECT * FROM src", &config, None, true);
    assert_eq!(
        sql,
        "SELECT * FROM (SELECT * FROM src) AS kiln_src WHERE updated_at >= '2024-01-01'"
    );
    assert_eq!(applied.as_deref(), Some("updated_at >= '2024-01-01'"));
}

#[test]
fn test_watermark_later_run() {
    let config = IncrementalConfig {
        filter_column: Some("updated_at".to_string()),
        start_value: Some("2024-01-01".to_string()),
        ..IncrementalConfig::default()
    };
    let (_, applied) = apply_watermark("S", &config, Some("2024-03-01"), false);
    assert_eq!(applied.as_deref(), Some("updated_at > '2024-03-01'"));

    let (_, applied) = apply_watermark("S", &config, None, false);
    assert_eq!(applied.as_deref(), Some("updated_at > '2024-01-01'"));

    let config = IncrementalConfig {
        lookback: Some("2 days".to_string()),
        ..config
    };
    let (_, applied) = apply_watermark("S", &config, Some("2024-03-01"), false);
    assert_eq!(
        applied.as_deref(),
        Some("updated_at > CAST('2024-03-01' AS TIMESTAMP) - INTERVAL '2 days'")
    );
}

#[test]
fn test_watermark_first_build_without_start_value() {
    let config = IncrementalConfig {
        filter_column: Some("id".to_string()),
        ..IncrementalConfig::default()
    };
    let (sql, applied) = apply_watermark("S", &config, Some("9"), true);
    assert_eq!(sql, "S");
    assert!(applied.is_none());
}

#[tokio::test]
async fn test_append_never_deduplicates() {
    let ctx = context();
    ctx.db()
        .execute("CREATE TABLE events (id INT, v VARCHAR)")
        .await
        .unwrap();
    let node = NodeName::new("events");
    let config = config(IncrementalStrategy::Append, &[]);
    let source = "SELECT * FROM (VALUES (1, 'a'), (2, 'b'), (3, 'c'), (4, 'd')) AS t(id, v)";
    let run = IncrementalRun {
        node: &node,
        target: "events",
        source_sql: source,
        config: &config,
    };

    materialize_incremental(&ctx, run).await.unwrap();
    assert_eq!(ctx.db().query_count("SELECT * FROM events").await.unwrap(), 4);
    materialize_incremental(&ctx, run).await.unwrap();
    assert_eq!(ctx.db().query_count("SELECT * FROM events").await.unwrap(), 8);

    let result = ctx
        .take_recorder()
        .finish(RunMode::Execute, "t".to_string());
    assert_eq!(result.decisions.len(), 2);
    assert_eq!(result.decisions[0].decision, "append: inserted 4 row(s)");
}

#[tokio::test]
async fn test_merge_upserts() {
    let ctx = context();
    ctx.db()
        .execute_batch(
            "CREATE TABLE customers (id INT, name VARCHAR); \
             INSERT INTO customers VALUES (1, 'old'), (2, 'keep');",
        )
        .await
        .unwrap();
    let node = NodeName::new("customers");
    let config = config(IncrementalStrategy::Merge, &["id"]);
    let run = IncrementalRun {
        node: &node,
        target: "customers",
        source_sql: "SELECT * FROM (VALUES (1, 'new'), (3, 'added')) AS t(id, name)",
        config: &config,
    };

    materialize_incremental(&ctx, run).await.unwrap();

    let rows = rows(&ctx, "SELECT id, name FROM customers ORDER BY id").await;
    assert_eq!(
        rows,
        vec![
            vec![Some("1".to_string()), Some("new".to_string())],
            vec![Some("2".to_string()), Some("keep".to_string())],
            vec![Some("3".to_string()), Some("added".to_string())],
        ]
    );
}

#[tokio::test]
async fn test_merge_unknown_key_column() {
    let ctx = context();
    ctx.db().execute("CREATE TABLE t (id INT)").await.unwrap();
    let node = NodeName::new("t");
    let config = config(IncrementalStrategy::Merge, &["missing"]);
    let run = IncrementalRun {
        node: &node,
        target: "t",
        source_sql: "SELECT 1 AS id",
        config: &config,
    };
    let err = materialize_incremental(&ctx, run).await.unwrap_err();
    assert!(matches!(err, RunError::Materialization { .. }));
}

#[tokio::test]
async fn test_delete_insert_by_key() {
    let ctx = context();
    ctx.db()
        .execute_batch(
            "CREATE TABLE daily (day INT, total INT); \
             INSERT INTO daily VALUES (1, 10), (2, 20), (2, 21);",
        )
        .await
        .unwrap();
    let node = NodeName::new("daily");
    let config = config(IncrementalStrategy::DeleteInsert, &["day"]);
    let run = IncrementalRun {
        node: &node,
        target: "daily",
        source_sql: "SELECT * FROM (VALUES (2, 99), (3, 30)) AS t(day, total)",
        config: &config,
    };

    materialize_incremental(&ctx, run).await.unwrap();

    let rows = rows(&ctx, "SELECT day, total FROM daily ORDER BY day").await;
    assert_eq!(
        rows,
        vec![
            vec![Some("1".to_string()), Some("10".to_string())],
            vec![Some("2".to_string()), Some("99".to_string())],
            vec![Some("3".to_string()), Some("30".to_string())],
        ]
    );

    let result = ctx
        .take_recorder()
        .finish(RunMode::Execute, "t".to_string());
    assert_eq!(result.decisions[0].decision, "delete_insert in one transaction");
}

#[tokio::test]
async fn test_delete_insert_explicit_predicate() {
    let ctx = context();
    ctx.db()
        .execute_batch(
            "CREATE TABLE daily (day INT, total INT); \
             INSERT INTO daily VALUES (1, 10), (2, 20), (3, 30);",
        )
        .await
        .unwrap();
    let node = NodeName::new("daily");
    let config = IncrementalConfig {
        strategy: IncrementalStrategy::DeleteInsert,
        delete_predicate: Some("day >= 2".to_string()),
        ..IncrementalConfig::default()
    };
    let run = IncrementalRun {
        node: &node,
        target: "daily",
        source_sql: "SELECT 2 AS day, 200 AS total",
        config: &config,
    };

    materialize_incremental(&ctx, run).await.unwrap();
    let rows = rows(&ctx, "SELECT day, total FROM daily ORDER BY day").await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1], vec![Some("2".to_string()), Some("200".to_string())]);
}

#[tokio::test]
async fn test_delete_insert_failure_rolls_back() {
    let ctx = context();
    ctx.db()
        .execute_batch(
            "CREATE TABLE daily (day INT, total INT); INSERT INTO daily VALUES (1, 10);",
        )
        .await
        .unwrap();
    let node = NodeName::new("daily");
    let config = config(IncrementalStrategy::DeleteInsert, &["day"]);
    let run = IncrementalRun {
        node: &node,
        target: "daily",
        source_sql: "SELECT 1 AS day, 'not a number' AS total",
        config: &config,
    };

    assert!(materialize_incremental(&ctx, run).await.is_err());
    assert_eq!(ctx.db().query_count("SELECT * FROM daily").await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_target() {
    let ctx = context();
    let node = NodeName::new("nope");
    let config = config(IncrementalStrategy::Append, &[]);
    let run = IncrementalRun {
        node: &node,
        target: "nope",
        source_sql: "SELECT 1",
        config: &config,
    };
    let err = materialize_incremental(&ctx, run).await.unwrap_err();
    assert!(matches!(err, RunError::Materialization { .. }));
}

/// Models named `source` and `target` in the active schema
fn context_with_alias_models() -> RunContext {
    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
    let models = [NodeName::new("source"), NodeName::new("target")];
    RunContext::new(
        db,
        StateStore::in_memory(),
        RunOptions {
            active_schema: Some("analytics".to_string()),
            ..RunOptions::default()
        },
        models.iter(),
    )
}

#[tokio::test]
async fn test_models_named_like_aliases() {
    let ctx = context_with_alias_models();
    ctx.db()
        .execute_batch(
            "CREATE SCHEMA analytics; \
             CREATE TABLE analytics.target (id INT, name VARCHAR); \
             INSERT INTO analytics.target VALUES (1, 'old'), (2, 'keep'); \
             CREATE TABLE analytics.source (id INT, name VARCHAR); \
             INSERT INTO analytics.source VALUES (1, 'new'), (3, 'added');",
        )
        .await
        .unwrap();
    let node = NodeName::new("target");
    let source_sql = "SELECT * FROM analytics.source";

    let merge = config(IncrementalStrategy::Merge, &["id"]);
    let run = IncrementalRun {
        node: &node,
        target: "analytics.target",
        source_sql,
        config: &merge,
    };
    materialize_incremental(&ctx, run).await.unwrap();

    let merged = rows(&ctx, "SELECT id, name FROM analytics.target ORDER BY id").await;
    assert_eq!(
        merged,
        vec![
            vec![Some("1".to_string()), Some("new".to_string())],
            vec![Some("2".to_string()), Some("keep".to_string())],
            vec![Some("3".to_string()), Some("added".to_string())],
        ]
    );

    let delete_insert = config(IncrementalStrategy::DeleteInsert, &["id"]);
    let run = IncrementalRun {
        config: &delete_insert,
        ..run
    };
    materialize_incremental(&ctx, run).await.unwrap();
    assert_eq!(
        ctx.db()
            .query_count("SELECT * FROM analytics.target")
            .await
            .unwrap(),
        3
    );
}
