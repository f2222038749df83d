use super::*;

fn map(names: &[&str], schema: &str) -> HashMap<String, QualifiedRef> {
    build_qualification_map(names.iter().copied(), schema)
}

#[test]
fn test_qualify_bare_name() {
    let result = qualify_table_references(
        "SELECT id, name FROM stg_customers",
        &map(&["stg_customers"], "analytics"),
    )
    .unwrap();
    assert!(
        result.contains("analytics.stg_customers"),
        "Expected qualified name, got: {}",
        result
    );
}

#[test]
fn test_qualify_join() {
    let sql = "SELECT c.id FROM stg_customers c INNER JOIN stg_orders o ON c.id = o.customer_id";
    let result =
        qualify_table_references(sql, &map(&["stg_customers", "stg_orders"], "analytics")).unwrap();
    assert!(result.contains("analytics.stg_customers"));
    assert!(result.contains("analytics.stg_orders"));
}

#[test]
fn test_already_qualified_unchanged() {
    let sql = "SELECT id FROM staging.stg_customers";
    let result = qualify_table_references(sql, &map(&["stg_customers"], "analytics")).unwrap();
    assert_eq!(result, sql);
}

#[test]
fn test_cte_names_not_qualified() {
    let sql = "WITH orders AS (SELECT * FROM raw_orders) SELECT * FROM orders";
    let result =
        qualify_table_references(sql, &map(&["orders", "raw_orders"], "analytics")).unwrap();
    assert!(
        result.contains("analytics.raw_orders"),
        "Expected raw_orders qualified, got: {}",
        result
    );
    assert!(
        !result.contains("analytics.orders"),
        "CTE reference must stay bare, got: {}",
        result
    );
}

#[test]
fn test_cte_in_subquery_not_qualified() {
    let sql = "SELECT * FROM (WITH recent AS (SELECT 1 AS id) SELECT id FROM recent) AS s";
    let result = qualify_table_references(sql, &map(&["recent"], "analytics")).unwrap();
    assert!(!result.contains("analytics.recent"), "got: {}", result);
}

#[test]
fn test_case_insensitive_matching() {
    let result =
        qualify_table_references("SELECT id FROM STG_CUSTOMERS", &map(&["stg_customers"], "a"))
            .unwrap();
    assert!(result.contains("a.stg_customers"), "got: {}", result);
}

#[test]
fn test_unmatched_sql_returned_verbatim() {
    let sql = "select   id from unknown_table";
    let result = qualify_table_references(sql, &map(&["stg_customers"], "analytics")).unwrap();
    assert_eq!(result, sql);
}

#[test]
fn test_empty_map_returns_original() {
    let sql = "this is not sql";
    let result = qualify_table_references(sql, &HashMap::new()).unwrap();
    assert_eq!(result, sql);
}

#[test]
fn test_parse_error() {
    let err = qualify_table_references("SELEC FROM", &map(&["x"], "analytics")).unwrap_err();
    assert!(matches!(err, SqlError::ParseError(_)));
}

#[test]
fn test_map_skips_qualified_nodes() {
    let m = map(&["orders", "sales.customers"], "analytics");
    assert_eq!(m.len(), 1);
    assert_eq!(
        m.get("orders"),
        Some(&QualifiedRef {
            schema: "analytics".to_string(),
            table: "orders".to_string()
        })
    );
}
