use super::*;

#[test]
fn test_node_name_bare() {
    let name = NodeName::new("orders");
    assert_eq!(name.schema(), None);
    assert_eq!(name.object(), "orders");
    assert!(!name.is_test());
}

#[test]
fn test_node_name_qualified() {
    let name = NodeName::new("staging.orders");
    assert_eq!(name.schema(), Some("staging"));
    assert_eq!(name.object(), "orders");
}

#[test]
fn test_node_name_schema_or_active() {
    let bare = NodeName::new("orders");
    assert_eq!(bare.schema_or(Some("analytics")), Some("analytics"));
    let qualified = NodeName::new("raw.orders");
    assert_eq!(qualified.schema_or(Some("analytics")), Some("raw"));
}

#[test]
fn test_node_name_test_prefix() {
    let name = NodeName::new("test:not_null_orders_id");
    assert!(name.is_test());
}

#[test]
fn test_node_name_rejects_empty() {
    assert!(NodeName::try_new("").is_none());
    assert!(NodeName::try_from("").is_err());
    let parsed: Result<NodeName, _> = serde_json::from_str(r#""""#);
    assert!(parsed.is_err());
}

#[test]
fn test_node_name_borrow_lookup() {
    use std::collections::HashMap;
    let mut map: HashMap<NodeName, i32> = HashMap::new();
    map.insert(NodeName::new("orders"), 1);
    assert_eq!(map.get("orders"), Some(&1));
}

#[test]
fn test_node_name_serde_roundtrip() {
    let name = NodeName::new("staging.orders");
    let json = serde_json::to_string(&name).unwrap();
    assert_eq!(json, r#""staging.orders""#);
    let back: NodeName = serde_json::from_str(&json).unwrap();
    assert_eq!(back, name);
}
