//! User-defined function definitions as delivered by the compiler

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::node_name::NodeName;

/// Whether the function is scalar or table-returning
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FunctionType {
    /// Returns a single value
    #[default]
    Scalar,
    /// Returns a table (set of rows)
    Table,
}

impl std::fmt::Display for FunctionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionType::Scalar => write!(f, "scalar"),
            FunctionType::Table => write!(f, "table"),
        }
    }
}

/// A single function argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionArg {
    pub name: String,

    /// SQL data type (e.g. "INTEGER", "VARCHAR")
    pub data_type: String,

    /// Default value expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Return type specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionReturn {
    /// Scalar return: single data type
    Scalar { data_type: String },
    /// Table return: set of named columns
    Table { columns: Vec<FunctionReturnColumn> },
}

/// A column in a table-returning function's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionReturnColumn {
    pub name: String,
    pub data_type: String,
}

/// One function node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFunction {
    /// `schema.function` or bare `function`
    pub name: NodeName,

    /// Routine body
    pub sql: String,

    #[serde(default)]
    pub args: Vec<FunctionArg>,

    pub returns: FunctionReturn,

    #[serde(default)]
    pub function_type: FunctionType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub object_tags: BTreeMap<String, String>,
}

impl ParsedFunction {
    /// Human-readable signature, e.g. `add_one(x INTEGER) -> INTEGER`
    pub fn signature(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|a| format!("{} {}", a.name, a.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        let returns = match &self.returns {
            FunctionReturn::Scalar { data_type } => data_type.clone(),
            FunctionReturn::Table { columns } => format!(
                "TABLE({})",
                columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.data_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        format!("{}({}) -> {}", self.name, args, returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_function() {
        let f: ParsedFunction = serde_json::from_str(
            r#"{
                "name": "util.recent_orders",
                "sql": "SELECT * FROM orders WHERE day > d",
                "args": [{"name": "d", "data_type": "DATE"}],
                "returns": {"columns": [{"name": "id", "data_type": "INTEGER"}]},
                "function_type": "table"
            }"#,
        )
        .unwrap();
        assert_eq!(f.function_type, FunctionType::Table);
        assert_eq!(f.name.schema(), Some("util"));
        assert_eq!(
            f.signature(),
            "util.recent_orders(d DATE) -> TABLE(id INTEGER)"
        );
    }

    #[test]
    fn test_scalar_default() {
        let f: ParsedFunction = serde_json::from_str(
            r#"{"name": "add_one", "sql": "x + 1", "args": [{"name": "x", "data_type": "INTEGER", "default": "0"}], "returns": {"data_type": "INTEGER"}}"#,
        )
        .unwrap();
        assert_eq!(f.function_type, FunctionType::Scalar);
        assert_eq!(f.args[0].default.as_deref(), Some("0"));
    }
}
