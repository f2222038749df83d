//! Incremental model configuration

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Incremental strategy for incremental models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncrementalStrategy {
    /// INSERT new rows only (default)
    #[default]
    Append,
    /// UPSERT based on unique_key
    Merge,
    /// DELETE matching rows then INSERT
    #[serde(alias = "delete+insert")]
    DeleteInsert,
}

impl std::fmt::Display for IncrementalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncrementalStrategy::Append => write!(f, "append"),
            IncrementalStrategy::Merge => write!(f, "merge"),
            IncrementalStrategy::DeleteInsert => write!(f, "delete_insert"),
        }
    }
}

/// Configuration block of an incremental model
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncrementalConfig {
    #[serde(default)]
    pub strategy: IncrementalStrategy,

    /// Columns identifying a row; order is preserved in generated SQL
    #[serde(default, deserialize_with = "one_or_many")]
    pub unique_key: Vec<String>,

    /// Monotonic column used as a watermark to filter the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_column: Option<String>,

    /// Watermark used when no value has been processed yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_value: Option<String>,

    /// Interval subtracted from the watermark, e.g. `3 days`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback: Option<String>,

    /// Explicit DELETE predicate for `delete_insert`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_predicate: Option<String>,
}

impl IncrementalConfig {
    /// Check the strategy's requirements.
    ///
    /// `merge` needs a unique key. `delete_insert` needs either a predicate
    /// or a unique key to derive one from.
    pub fn validate(&self, model: &str) -> CoreResult<()> {
        let has_key = self.unique_key.iter().any(|k| !k.trim().is_empty());
        if self.unique_key.iter().any(|k| k.trim().is_empty()) {
            return Err(CoreError::IncrementalConfig {
                model: model.to_string(),
                reason: "unique_key contains an empty column name".to_string(),
            });
        }
        match self.strategy {
            IncrementalStrategy::Append => Ok(()),
            IncrementalStrategy::Merge if !has_key => Err(CoreError::IncrementalConfig {
                model: model.to_string(),
                reason: "merge strategy requires a non-empty unique_key".to_string(),
            }),
            IncrementalStrategy::Merge => Ok(()),
            IncrementalStrategy::DeleteInsert => {
                let has_predicate = self
                    .delete_predicate
                    .as_deref()
                    .is_some_and(|p| !p.trim().is_empty());
                if has_predicate || has_key {
                    Ok(())
                } else {
                    Err(CoreError::IncrementalConfig {
                        model: model.to_string(),
                        reason: "delete_insert strategy requires delete_predicate or unique_key"
                            .to_string(),
                    })
                }
            }
        }
    }
}

/// Accept `unique_key: id` as well as `unique_key: [id, name]`
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> IncrementalConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_delete_insert_alias() {
        let cfg = parse(r#"{"strategy": "delete+insert", "unique_key": "id"}"#);
        assert_eq!(cfg.strategy, IncrementalStrategy::DeleteInsert);
        assert_eq!(cfg.unique_key, vec!["id"]);
        assert!(cfg.validate("m").is_ok());
    }

    #[test]
    fn test_merge_requires_key() {
        let cfg = parse(r#"{"strategy": "merge"}"#);
        let err = cfg.validate("orders").unwrap_err();
        assert!(matches!(err, CoreError::IncrementalConfig { ref model, .. } if model == "orders"));
    }

    #[test]
    fn test_merge_key_order_preserved() {
        let cfg = parse(r#"{"strategy": "merge", "unique_key": ["id", "name"]}"#);
        assert_eq!(cfg.unique_key, vec!["id", "name"]);
        assert!(cfg.validate("m").is_ok());
    }

    #[test]
    fn test_delete_insert_with_predicate_only() {
        let cfg = parse(r#"{"strategy": "delete_insert", "delete_predicate": "day = current_date"}"#);
        assert!(cfg.validate("m").is_ok());
    }

    #[test]
    fn test_delete_insert_without_predicate_or_key() {
        let cfg = parse(r#"{"strategy": "delete_insert", "delete_predicate": "  "}"#);
        assert!(cfg.validate("m").is_err());
    }

    #[test]
    fn test_append_default() {
        let cfg = parse("{}");
        assert_eq!(cfg.strategy, IncrementalStrategy::Append);
        assert!(cfg.validate("m").is_ok());
    }

    #[test]
    fn test_blank_key_rejected() {
        let cfg = parse(r#"{"strategy": "append", "unique_key": ["id", ""]}"#);
        assert!(cfg.validate("m").is_err());
    }
}
