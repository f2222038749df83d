//! Adapter contract between the executor and a backend database
//!
//! The contract is split by concern. Every backend implements the four core
//! traits; [`TagAttacher`] is an optional capability discovered through
//! [`Database::as_tag_attacher`].

use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use kiln_core::{Materialization, ParsedFunction, RelationDocs, SeedFormat};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One result row; `None` is SQL NULL
pub type Row = Vec<Option<String>>;

/// Physical kind of an existing relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Table,
    View,
}

impl RelationKind {
    /// Materialization a rebuilt state record should carry for this kind
    pub fn as_materialization(&self) -> Materialization {
        match self {
            RelationKind::Table => Materialization::Table,
            RelationKind::View => Materialization::View,
        }
    }
}

/// A column name and its backend type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Introspected shape of a relation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TableInfo {
    /// `None` when the backend cannot tell
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RelationKind>,
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
}

/// Connection lifecycle and raw statement execution
#[async_trait]
pub trait DatabaseCore: Send + Sync {
    /// Open the connection if it is closed
    async fn connect(&self) -> DbResult<()>;

    /// Close the connection; later calls fail until [`connect`](Self::connect)
    async fn disconnect(&self) -> DbResult<()>;

    /// Execute SQL that modifies data, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple SQL statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Execute a query and return every row as strings
    async fn execute_query(&self, sql: &str) -> DbResult<Vec<Row>>;

    /// Number of rows a query returns
    async fn query_count(&self, sql: &str) -> DbResult<usize>;

    /// First column of the first row, if any
    async fn query_one(&self, sql: &str) -> DbResult<Option<String>> {
        let rows = self.execute_query(sql).await?;
        Ok(rows.into_iter().next().and_then(|r| r.into_iter().next().flatten()))
    }

    /// Whether [`execute_in_transaction`](Self::execute_in_transaction) is available
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Run statements atomically, in order
    async fn execute_in_transaction(&self, _statements: &[String]) -> DbResult<()> {
        Err(DbError::unsupported(self.db_type(), "transactions"))
    }

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;

    /// SQL dialect the backend speaks
    fn default_dialect(&self) -> &'static str;
}

/// Relation DDL and introspection
#[async_trait]
pub trait DatabaseSchema: DatabaseCore {
    /// Create or replace a table from a SELECT, attaching docs when given
    async fn create_table_as(
        &self,
        name: &str,
        select: &str,
        docs: Option<&RelationDocs>,
    ) -> DbResult<()>;

    /// Create or replace a view from a SELECT, attaching docs when given
    async fn create_view_as(
        &self,
        name: &str,
        select: &str,
        docs: Option<&RelationDocs>,
    ) -> DbResult<()>;

    async fn create_materialized_view_as(
        &self,
        _name: &str,
        _select: &str,
        _docs: Option<&RelationDocs>,
    ) -> DbResult<()> {
        Err(DbError::unsupported(self.db_type(), "materialized views"))
    }

    /// Create or replace a relation reading files at `location`
    async fn create_external_table(
        &self,
        _name: &str,
        _location: &str,
        _docs: Option<&RelationDocs>,
    ) -> DbResult<()> {
        Err(DbError::unsupported(self.db_type(), "external tables"))
    }

    /// Check if a table or view exists
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Drop a table or view if it exists
    async fn drop_relation(&self, name: &str) -> DbResult<()>;

    /// Kind, columns and row count of an existing relation
    async fn get_table_info(&self, name: &str) -> DbResult<TableInfo>;

    /// Output columns of a query without running it
    async fn describe_query(&self, sql: &str) -> DbResult<Vec<ColumnInfo>>;

    async fn add_column(&self, table: &str, column: &str, data_type: &str) -> DbResult<()>;

    async fn drop_column(&self, table: &str, column: &str) -> DbResult<()>;

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()>;

    /// Materialization kinds this backend can create
    fn supported_materializations(&self) -> &'static [Materialization];
}

/// User-defined function deployment
#[async_trait]
pub trait DatabaseFunction: DatabaseCore {
    /// Create or replace a function
    async fn create_function(
        &self,
        function: &ParsedFunction,
        description: Option<&str>,
    ) -> DbResult<()>;

    async fn function_exists(&self, name: &str) -> DbResult<bool>;

    async fn drop_function(&self, function: &ParsedFunction) -> DbResult<()>;
}

/// Seed file loading
#[async_trait]
pub trait DatabaseSeed: DatabaseCore {
    /// Replace `table` with the contents of the file at `path`
    async fn load_seed(&self, table: &str, path: &Path, format: SeedFormat) -> DbResult<()>;
}

/// Optional capability: governance tags on schemas and objects
#[async_trait]
pub trait TagAttacher: Send + Sync {
    async fn attach_schema_tags(
        &self,
        schema: &str,
        tags: &BTreeMap<String, String>,
    ) -> DbResult<()>;

    async fn attach_object_tags(
        &self,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> DbResult<()>;
}

/// Full adapter contract
pub trait Database: DatabaseCore + DatabaseSchema + DatabaseFunction + DatabaseSeed {
    /// Tag attachment, when the backend supports it
    fn as_tag_attacher(&self) -> Option<&dyn TagAttacher> {
        None
    }
}
