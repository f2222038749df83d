//! Parsed model as delivered by the compiler

use serde::{Deserialize, Serialize};

use crate::config::Materialization;
use crate::metadata::MetadataBlock;
use crate::node_name::NodeName;

/// Immutable executor input for one model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedModel {
    /// SQL with references resolved by the compiler (preferred)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_sql: Option<String>,

    /// SQL as written (fallback)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_sql: Option<String>,

    /// Upstream relations referenced by the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<NodeName>,

    /// Declaration-site description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declaration-site materialization override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materialization: Option<Materialization>,

    /// Nested declaration metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataBlock>,

    /// File-level metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_metadata: Option<MetadataBlock>,
}

impl ParsedModel {
    /// SQL to execute: resolved if present, else original. Blank SQL yields `None`.
    pub fn sql(&self) -> Option<&str> {
        self.resolved_sql
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                self.original_sql
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_prefers_resolved() {
        let model = ParsedModel {
            resolved_sql: Some("SELECT 1 AS a".to_string()),
            original_sql: Some("SELECT 2 AS a".to_string()),
            ..Default::default()
        };
        assert_eq!(model.sql(), Some("SELECT 1 AS a"));
    }

    #[test]
    fn test_sql_falls_back_to_original() {
        let model = ParsedModel {
            resolved_sql: Some("   ".to_string()),
            original_sql: Some("SELECT 2 AS a".to_string()),
            ..Default::default()
        };
        assert_eq!(model.sql(), Some("SELECT 2 AS a"));
    }

    #[test]
    fn test_sql_blank() {
        assert_eq!(ParsedModel::default().sql(), None);
    }
}
