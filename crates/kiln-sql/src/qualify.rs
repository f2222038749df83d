//! Table reference qualification
//!
//! Rewrites bare table references to `schema.table` using AST manipulation
//! via `visit_relations_mut`. Only single-part names are qualified; names
//! bound by a `WITH` clause anywhere in the statement are left alone.

use sqlparser::ast::{
    visit_relations_mut, Ident, ObjectName, ObjectNamePart, Query, Statement, Visit, Visitor,
};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use crate::error::{SqlError, SqlResult};

/// Target of a bare table reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedRef {
    pub schema: String,
    pub table: String,
}

/// Map every bare node name to the active schema.
///
/// Names that already carry a schema are not added.
pub fn build_qualification_map<'a, I>(nodes: I, active_schema: &str) -> HashMap<String, QualifiedRef>
where
    I: IntoIterator<Item = &'a str>,
{
    nodes
        .into_iter()
        .filter(|name| !name.contains('.'))
        .map(|name| {
            (
                name.to_lowercase(),
                QualifiedRef {
                    schema: active_schema.to_string(),
                    table: name.to_string(),
                },
            )
        })
        .collect()
}

/// Collects names bound by `WITH` clauses
#[derive(Default)]
struct CteNames {
    names: HashSet<String>,
}

impl Visitor for CteNames {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.names.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }
}

fn parse(sql: &str) -> SqlResult<Vec<Statement>> {
    let dialect = DuckDbDialect {};
    let statements = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::ParseError(e.to_string()))?;
    if statements.is_empty() {
        return Err(SqlError::EmptySql);
    }
    Ok(statements)
}

/// Rewrite bare table references in SQL to qualified names.
///
/// Takes SQL and a map of `lowercase_bare_name -> QualifiedRef`. When no
/// reference is rewritten the input is returned unchanged, byte for byte.
pub fn qualify_table_references(
    sql: &str,
    qualification_map: &HashMap<String, QualifiedRef>,
) -> SqlResult<String> {
    if qualification_map.is_empty() {
        return Ok(sql.to_string());
    }

    let mut statements = parse(sql)?;
    let mut changed = false;

    for stmt in &mut statements {
        let mut ctes = CteNames::default();
        let _ = stmt.visit(&mut ctes);

        let _ = visit_relations_mut(stmt, |name: &mut ObjectName| {
            if name.0.len() == 1 {
                if let Some(ObjectNamePart::Identifier(ident)) = name.0.first() {
                    let bare = ident.value.to_lowercase();
                    if !ctes.names.contains(&bare) {
                        if let Some(qualified) = qualification_map.get(&bare) {
                            name.0 = vec![
                                ObjectNamePart::Identifier(Ident::new(&qualified.schema)),
                                ObjectNamePart::Identifier(Ident::new(&qualified.table)),
                            ];
                            changed = true;
                        }
                    }
                }
            }
            ControlFlow::<()>::Continue(())
        });
    }

    if !changed {
        return Ok(sql.to_string());
    }

    Ok(statements
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(";\n"))
}

#[cfg(test)]
#[path = "qualify_test.rs"]
mod tests;
