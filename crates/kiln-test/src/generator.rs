//! Test SQL generation

use kiln_core::sql_utils::{escape_sql_string, quote_ident, quote_qualified};
use kiln_core::{ColumnDoc, NodeName, ParsedTest, TestSeverity, TestTarget, TEST_NODE_PREFIX};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error type for schema test generation
#[derive(Error, Debug)]
pub enum TestGenError {
    /// Test name is not a known schema test (T001)
    #[error("[T001] Unknown schema test '{test}' on {target}")]
    UnknownTest { target: String, test: String },

    /// Test definition has the wrong shape (T002)
    #[error("[T002] Invalid schema test on {target}: {reason}")]
    InvalidDefinition { target: String, reason: String },
}

/// Result type alias for test generation
pub type TestGenResult<T> = Result<T, TestGenError>;

/// Schema tests that can be declared on a column
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaTestKind {
    Unique,
    NotNull,
    Positive,
    NonNegative,
    AcceptedValues {
        values: Vec<String>,
        /// Render values as string literals
        quote: bool,
    },
}

impl SchemaTestKind {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaTestKind::Unique => "unique",
            SchemaTestKind::NotNull => "not_null",
            SchemaTestKind::Positive => "positive",
            SchemaTestKind::NonNegative => "non_negative",
            SchemaTestKind::AcceptedValues { .. } => "accepted_values",
        }
    }

    /// SQL returning the rows that violate this test
    pub fn sql(&self, table: &str, column: &str) -> String {
        match self {
            SchemaTestKind::Unique => generate_unique_test(table, column),
            SchemaTestKind::NotNull => generate_not_null_test(table, column),
            SchemaTestKind::Positive => generate_positive_test(table, column),
            SchemaTestKind::NonNegative => generate_non_negative_test(table, column),
            SchemaTestKind::AcceptedValues { values, quote } => {
                generate_accepted_values_test(table, column, values, *quote)
            }
        }
    }
}

impl std::fmt::Display for SchemaTestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Generate SQL for a unique test
///
/// Returns one row per duplicated value.
pub fn generate_unique_test(table: &str, column: &str) -> String {
    let qt = quote_qualified(table);
    let qc = quote_ident(column);
    format!("SELECT {qc}, COUNT(*) AS cnt\nFROM {qt}\nWHERE {qc} IS NOT NULL\nGROUP BY {qc}\nHAVING COUNT(*) > 1")
}

/// Generate SQL for a not_null test
pub fn generate_not_null_test(table: &str, column: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {} IS NULL",
        quote_qualified(table),
        quote_ident(column)
    )
}

/// Returns rows where the column value is <= 0.
pub fn generate_positive_test(table: &str, column: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {} <= 0",
        quote_qualified(table),
        quote_ident(column)
    )
}

/// Returns rows where the column value is < 0.
pub fn generate_non_negative_test(table: &str, column: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {} < 0",
        quote_qualified(table),
        quote_ident(column)
    )
}

/// Generate SQL for an accepted_values test
///
/// Returns rows where the column value is not in the allowed list or is NULL.
/// Unquoted values that do not parse as numbers are quoted anyway.
pub fn generate_accepted_values_test(
    table: &str,
    column: &str,
    values: &[String],
    quote: bool,
) -> String {
    let values_list = values
        .iter()
        .map(|v| {
            if !quote && v.parse::<f64>().is_ok() {
                v.clone()
            } else {
                format!("'{}'", escape_sql_string(v))
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let qt = quote_qualified(table);
    let qc = quote_ident(column);

    format!("SELECT * FROM {qt} WHERE {qc} NOT IN ({values_list}) OR {qc} IS NULL")
}

/// Parse one entry of a column's `tests` list.
///
/// Accepted shapes: a bare test name (`"unique"`), or a single-key mapping
/// whose value carries arguments (`{"accepted_values": {"values": [...],
/// "severity": "warning"}}`). `accepted_values` also accepts the value list
/// directly.
pub fn parse_schema_test(target: &str, entry: &Value) -> TestGenResult<(SchemaTestKind, TestSeverity)> {
    match entry {
        Value::String(name) => Ok((kind_from_name(target, name, None)?, TestSeverity::Error)),
        Value::Object(map) => {
            let mut entries = map.iter();
            match (entries.next(), entries.next()) {
                (Some((name, args)), None) => {
                    let severity = match args.as_object() {
                        Some(args) => parse_severity(target, args)?,
                        None => TestSeverity::Error,
                    };
                    Ok((kind_from_name(target, name, Some(args))?, severity))
                }
                _ => Err(invalid(target, "expected a mapping with exactly one test name")),
            }
        }
        _ => Err(invalid(target, "expected a test name or a mapping")),
    }
}

fn kind_from_name(target: &str, name: &str, args: Option<&Value>) -> TestGenResult<SchemaTestKind> {
    match name {
        "unique" => Ok(SchemaTestKind::Unique),
        "not_null" => Ok(SchemaTestKind::NotNull),
        "positive" => Ok(SchemaTestKind::Positive),
        "non_negative" => Ok(SchemaTestKind::NonNegative),
        "accepted_values" => parse_accepted_values(target, args),
        other => Err(TestGenError::UnknownTest {
            target: target.to_string(),
            test: other.to_string(),
        }),
    }
}

fn parse_accepted_values(target: &str, args: Option<&Value>) -> TestGenResult<SchemaTestKind> {
    let list = match args {
        Some(Value::Array(list)) => list,
        Some(Value::Object(map)) => match map.get("values") {
            Some(Value::Array(list)) => list,
            _ => return Err(invalid(target, "accepted_values requires a 'values' list")),
        },
        _ => return Err(invalid(target, "accepted_values requires a 'values' list")),
    };
    if list.is_empty() {
        return Err(invalid(target, "accepted_values requires at least one value"));
    }

    let mut quote = false;
    let mut values = Vec::with_capacity(list.len());
    for value in list {
        match value {
            Value::String(s) => {
                quote = true;
                values.push(s.clone());
            }
            Value::Number(n) => values.push(n.to_string()),
            Value::Bool(b) => values.push(b.to_string()),
            _ => return Err(invalid(target, "accepted_values entries must be scalars")),
        }
    }
    if let Some(explicit) = args.and_then(|a| a.get("quote")).and_then(Value::as_bool) {
        quote = explicit;
    }

    Ok(SchemaTestKind::AcceptedValues { values, quote })
}

fn parse_severity(target: &str, args: &Map<String, Value>) -> TestGenResult<TestSeverity> {
    match args.get("severity").and_then(Value::as_str) {
        None | Some("error") => Ok(TestSeverity::Error),
        Some("warn") | Some("warning") => Ok(TestSeverity::Warning),
        Some(other) => Err(invalid(target, &format!("unknown severity '{}'", other))),
    }
}

fn invalid(target: &str, reason: &str) -> TestGenError {
    TestGenError::InvalidDefinition {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

/// Build test nodes for every schema test declared on `columns`.
///
/// `table` is the physical (schema-qualified) relation the tests query;
/// test names use the logical node name: `test:<kind>_<node>__<column>`.
pub fn generate_column_tests(
    node: &NodeName,
    table: &str,
    columns: &[ColumnDoc],
) -> TestGenResult<Vec<ParsedTest>> {
    let mut tests = Vec::new();
    for column in columns {
        let target = format!("{}.{}", node, column.name);
        for entry in &column.tests {
            let (kind, severity) = parse_schema_test(&target, entry)?;
            tests.push(ParsedTest {
                name: NodeName::new(format!(
                    "{}{}_{}__{}",
                    TEST_NODE_PREFIX,
                    kind.name(),
                    node,
                    column.name
                )),
                target: TestTarget {
                    node: node.clone(),
                    column: Some(column.name.clone()),
                },
                sql: kind.sql(table, &column.name),
                severity,
            });
        }
    }
    Ok(tests)
}

#[cfg(test)]
#[path = "generator_test.rs"]
mod tests;
