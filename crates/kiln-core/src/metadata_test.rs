use super::*;
use crate::incremental::IncrementalStrategy;
use serde_json::json;

fn block(value: serde_json::Value) -> MetadataBlock {
    serde_json::from_value(value).unwrap()
}

fn model_with(nested: Option<MetadataBlock>, file: Option<MetadataBlock>) -> ParsedModel {
    ParsedModel {
        resolved_sql: Some("SELECT 1 AS id".to_string()),
        description: Some("declared description".to_string()),
        metadata: nested,
        file_metadata: file,
        ..Default::default()
    }
}

#[test]
fn test_nested_incremental_wins() {
    let model = model_with(
        Some(block(json!({
            "materialization": "incremental",
            "schema": [{"name": "id"}],
            "incremental": {"strategy": "merge", "unique_key": ["id"]},
            "tags": ["a"],
            "metadata": {"tags": ["b", "a"]}
        }))),
        Some(block(json!({"schema": [{"name": "other"}]}))),
    );

    let resolved = resolve_metadata(&model);
    let ResolvedMetadata::Incremental(inc) = &resolved else {
        panic!("expected incremental, got {:?}", resolved);
    };
    assert_eq!(inc.config.strategy, IncrementalStrategy::Merge);
    assert_eq!(inc.tags, vec!["a", "b"]);
    assert_eq!(inc.description.as_deref(), Some("declared description"));
    assert_eq!(
        resolve_materialization(&model, &resolved, Materialization::Table),
        Materialization::Incremental
    );
}

#[test]
fn test_nested_schema_with_own_description() {
    let model = model_with(
        Some(block(json!({
            "description": "nested description",
            "schema": [{"name": "id", "description": "pk"}]
        }))),
        None,
    );
    let resolved = resolve_metadata(&model);
    assert!(matches!(resolved, ResolvedMetadata::Columns(_)));
    assert_eq!(resolved.description(), Some("nested description"));
}

#[test]
fn test_inner_schema_uses_outer_description() {
    let model = model_with(
        Some(block(json!({
            "metadata": {"schema": [{"name": "id"}], "object_tags": {"owner": "inner"}},
            "object_tags": {"owner": "nested", "tier": "gold"}
        }))),
        None,
    );
    let ResolvedMetadata::Columns(cols) = resolve_metadata(&model) else {
        panic!("expected columns");
    };
    assert_eq!(cols.description.as_deref(), Some("declared description"));
    assert_eq!(cols.schema, json!([{"name": "id"}]));
    // keys already present win
    assert_eq!(cols.object_tags.get("owner").map(String::as_str), Some("nested"));
    assert_eq!(cols.object_tags.get("tier").map(String::as_str), Some("gold"));
}

#[test]
fn test_file_level_schema() {
    let model = model_with(
        Some(block(json!({"tags": ["nested"]}))),
        Some(block(json!({"schema": [{"name": "id"}], "tags": ["file"]}))),
    );
    let ResolvedMetadata::Columns(cols) = resolve_metadata(&model) else {
        panic!("expected columns");
    };
    assert_eq!(cols.tags, vec!["file", "nested"]);
}

#[test]
fn test_no_metadata_is_none() {
    let model = model_with(None, None);
    assert_eq!(resolve_metadata(&model), ResolvedMetadata::None);
    assert_eq!(
        resolve_materialization(&model, &ResolvedMetadata::None, Materialization::View),
        Materialization::View
    );
}

#[test]
fn test_resolution_is_idempotent() {
    let model = model_with(
        Some(block(json!({
            "schema": [{"name": "id"}],
            "tags": ["x", "y"],
            "metadata": {"tags": ["y", "z"]}
        }))),
        None,
    );
    let first = resolve_metadata(&model);
    let second = resolve_metadata(&model);
    assert_eq!(first, second);
    let ResolvedMetadata::Columns(cols) = second else {
        panic!("expected columns");
    };
    assert_eq!(cols.tags, vec!["x", "y", "z"]);
}

#[test]
fn test_materialization_priority() {
    let mut model = model_with(
        Some(block(json!({"metadata": {"materialization": "view"}}))),
        Some(block(json!({"materialization": "table"}))),
    );
    model.materialization = Some(Materialization::MaterializedView);
    assert_eq!(
        resolve_materialization(&model, &ResolvedMetadata::None, Materialization::Table),
        Materialization::View
    );

    model.metadata = None;
    assert_eq!(
        resolve_materialization(&model, &ResolvedMetadata::None, Materialization::View),
        Materialization::Table
    );

    model.file_metadata = None;
    assert_eq!(
        resolve_materialization(&model, &ResolvedMetadata::None, Materialization::Table),
        Materialization::MaterializedView
    );
}

#[test]
fn test_incremental_config_from_file_block() {
    let mut model = model_with(
        None,
        Some(block(json!({"incremental": {"strategy": "append", "filter_column": "ts"}}))),
    );
    model.materialization = Some(Materialization::Incremental);
    let resolved = resolve_metadata(&model);
    let cfg = resolve_incremental_config(&model, &resolved);
    assert_eq!(cfg.filter_column.as_deref(), Some("ts"));
}

#[test]
fn test_incremental_config_from_inner_block() {
    let model = model_with(
        Some(block(json!({
            "materialization": "incremental",
            "metadata": {"incremental": {"strategy": "merge", "unique_key": ["id"]}}
        }))),
        None,
    );

    let resolved = resolve_metadata(&model);
    let inc = resolved.incremental().unwrap();
    assert_eq!(inc.strategy, IncrementalStrategy::Merge);
    assert_eq!(inc.unique_key, vec!["id"]);

    let cfg = resolve_incremental_config(&model, &resolved);
    assert_eq!(&cfg, inc);
}

#[test]
fn test_inner_merge_without_key_is_rejected() {
    let model = model_with(
        Some(block(json!({
            "materialization": "incremental",
            "metadata": {"incremental": {"strategy": "merge"}}
        }))),
        None,
    );

    let resolved = resolve_metadata(&model);
    let cfg = resolve_incremental_config(&model, &resolved);
    assert_eq!(cfg.strategy, IncrementalStrategy::Merge);
    assert!(cfg.validate("m").is_err());
}

#[test]
fn test_location_and_collected_tags() {
    let model = model_with(
        Some(block(json!({"location": "s3://bucket/x.parquet", "tags": ["a"]}))),
        Some(block(json!({"tags": ["b"], "object_tags": {"k": "v"}}))),
    );
    assert_eq!(resolve_location(&model).as_deref(), Some("s3://bucket/x.parquet"));
    let tags = collect_tags(&model);
    assert_eq!(tags.tags, vec!["a", "b"]);
    assert_eq!(tags.object_tags.len(), 1);
}

#[test]
fn test_validate_columns_ok() {
    let docs = validate_columns(
        "orders",
        &json!([
            {"name": "id", "description": "primary key", "data_type": "INTEGER", "tests": ["unique"]},
            {"name": "amount"}
        ]),
        Some("Orders"),
    )
    .unwrap();
    assert_eq!(docs.columns.len(), 2);
    assert_eq!(docs.columns[0].data_type.as_deref(), Some("INTEGER"));
    assert_eq!(docs.columns[0].tests.len(), 1);
    assert!(!docs.is_empty());
}

#[test]
fn test_validate_columns_not_a_list() {
    let err = validate_columns("orders", &json!({"id": "INTEGER"}), None).unwrap_err();
    assert!(matches!(err, CoreError::MetadataValidation { .. }));
}

#[test]
fn test_validate_columns_missing_name() {
    let err = validate_columns("orders", &json!([{"description": "x"}]), None).unwrap_err();
    assert!(err.to_string().contains("has no string 'name'"));
}

#[test]
fn test_validate_columns_long_description() {
    let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
    let err =
        validate_columns("orders", &json!([{"name": "id", "description": long}]), None)
            .unwrap_err();
    assert!(matches!(err, CoreError::MetadataValidation { .. }));

    let exact = "x".repeat(MAX_DESCRIPTION_LEN);
    assert!(validate_columns("orders", &json!([]), Some(&exact)).is_ok());
}
