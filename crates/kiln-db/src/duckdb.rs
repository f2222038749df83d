//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{
    ColumnInfo, Database, DatabaseCore, DatabaseFunction, DatabaseSchema, DatabaseSeed,
    RelationKind, Row, TableInfo,
};
use async_trait::async_trait;
use duckdb::Connection;
use kiln_core::sql_utils::{escape_sql_string, quote_ident, quote_literal, quote_qualified};
use kiln_core::{FunctionType, Materialization, ParsedFunction, RelationDocs, SeedFormat};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SUPPORTED: &[Materialization] = &[
    Materialization::Table,
    Materialization::View,
    Materialization::Incremental,
    Materialization::ExternalTable,
];

/// DuckDB database backend.
///
/// Every statement is serialized through one connection mutex.
pub struct DuckDbBackend {
    path: String,
    conn: Mutex<Option<Connection>>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        Self::new(":memory:")
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        Self::new(&path.display().to_string())
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        let conn = Self::open(path)?;
        Ok(Self {
            path: path.to_string(),
            conn: Mutex::new(Some(conn)),
        })
    }

    fn open(path: &str) -> DbResult<Connection> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        };
        conn.map_err(|e| DbError::ConnectionError(e.to_string()))
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Run `f` against the open connection
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> DbResult<T>) -> DbResult<T> {
        let mut guard = self.lock()?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| DbError::ConnectionError("connection is closed".to_string()))?;
        f(conn)
    }

    fn execute_sync(&self, sql: &str) -> DbResult<usize> {
        log::debug!("duckdb execute: {}", sql);
        self.with_conn(|conn| {
            conn.execute(sql, [])
                .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, sql)))
        })
    }

    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        log::debug!("duckdb execute_batch: {}", sql);
        self.with_conn(|conn| conn.execute_batch(sql).map_err(DbError::from))
    }

    fn query_count_sync(&self, sql: &str) -> DbResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM ({})", sql), [], |row| {
                    row.get(0)
                })
                .map_err(DbError::from)?;
            Ok(count as usize)
        })
    }

    fn query_rows_sync(&self, sql: &str) -> DbResult<Vec<Row>> {
        log::debug!("duckdb query: {}", sql);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(DbError::from)?;
            // DuckDB panics on column_count before execution; read it per row
            let rows = stmt
                .query_map([], |row| {
                    let col_count = row.as_ref().column_count();
                    Ok((0..col_count)
                        .map(|i| column_as_string(row, i))
                        .collect::<Row>())
                })
                .map_err(DbError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(DbError::from)?;
            Ok(rows)
        })
    }

    /// Introspect the relation type from information_schema
    fn relation_kind_sync(&self, name: &str) -> DbResult<Option<RelationKind>> {
        let (schema, table) = split_name(name);
        let sql = format!(
            "SELECT table_type FROM information_schema.tables WHERE table_schema = '{}' AND table_name = '{}'",
            escape_sql_string(schema),
            escape_sql_string(table)
        );
        let rows = self.query_rows_sync(&sql)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.into_iter().next().flatten())
            .map(|t| {
                if t.eq_ignore_ascii_case("VIEW") {
                    RelationKind::View
                } else {
                    RelationKind::Table
                }
            }))
    }

    /// Attach descriptions with COMMENT ON. Failures leave the relation undocumented.
    fn attach_docs(&self, object: &str, name: &str, docs: Option<&RelationDocs>) {
        let Some(docs) = docs else {
            return;
        };
        let quoted = quote_qualified(name);
        if let Some(desc) = &docs.description {
            let sql = format!("COMMENT ON {} {} IS {}", object, quoted, quote_literal(desc));
            if let Err(e) = self.execute_sync(&sql) {
                log::warn!("Could not attach description to {}: {}", name, e);
            }
        }
        for column in &docs.columns {
            let Some(desc) = &column.description else {
                continue;
            };
            let sql = format!(
                "COMMENT ON COLUMN {}.{} IS {}",
                quoted,
                quote_ident(&column.name),
                quote_literal(desc)
            );
            if let Err(e) = self.execute_sync(&sql) {
                log::warn!(
                    "Could not attach description to column {}.{}: {}",
                    name,
                    column.name,
                    e
                );
            }
        }
    }

    fn create_macro_sql(function: &ParsedFunction) -> String {
        let args_sql = function
            .args
            .iter()
            .map(|arg| match &arg.default {
                Some(default) => format!("{} := {}", arg.name, default),
                None => arg.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let body = function.sql.trim().trim_end_matches(';');
        match function.function_type {
            FunctionType::Scalar => format!(
                "CREATE OR REPLACE MACRO {}({}) AS ({})",
                quote_qualified(&function.name),
                args_sql,
                body
            ),
            FunctionType::Table => format!(
                "CREATE OR REPLACE MACRO {}({}) AS TABLE ({})",
                quote_qualified(&function.name),
                args_sql,
                body
            ),
        }
    }

    fn macro_keyword(function_type: FunctionType) -> &'static str {
        match function_type {
            FunctionType::Scalar => "MACRO",
            FunctionType::Table => "MACRO TABLE",
        }
    }
}

/// Split into (schema, object), defaulting to DuckDB's `main` schema
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => ("main", name),
    }
}

/// Read a column value as a string, trying the common DuckDB types.
///
/// `Option<String>` does not read integer columns, so fall back through
/// i64, f64 and bool.
fn column_as_string(row: &duckdb::Row<'_>, idx: usize) -> Option<String> {
    if let Ok(Some(s)) = row.get::<_, Option<String>>(idx) {
        return Some(s);
    }
    if let Ok(Some(n)) = row.get::<_, Option<i64>>(idx) {
        return Some(n.to_string());
    }
    if let Ok(Some(f)) = row.get::<_, Option<f64>>(idx) {
        return Some(f.to_string());
    }
    if let Ok(Some(b)) = row.get::<_, Option<bool>>(idx) {
        return Some(b.to_string());
    }
    None
}

#[async_trait]
impl DatabaseCore for DuckDbBackend {
    async fn connect(&self) -> DbResult<()> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(Self::open(&self.path)?);
        }
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| DbError::ConnectionError(e.to_string()))?;
        }
        Ok(())
    }

    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.execute_sync(sql)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn execute_query(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.query_rows_sync(sql)
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.query_count_sync(sql)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn execute_in_transaction(&self, statements: &[String]) -> DbResult<()> {
        self.with_conn(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| DbError::TransactionError(e.to_string()))?;
            for sql in statements {
                log::debug!("duckdb transaction: {}", sql);
                tx.execute_batch(sql)
                    .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, sql)))?;
            }
            tx.commit()
                .map_err(|e| DbError::TransactionError(e.to_string()))
        })
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }

    fn default_dialect(&self) -> &'static str {
        "duckdb"
    }
}

#[async_trait]
impl DatabaseSchema for DuckDbBackend {
    async fn create_table_as(
        &self,
        name: &str,
        select: &str,
        docs: Option<&RelationDocs>,
    ) -> DbResult<()> {
        let sql = format!("CREATE OR REPLACE TABLE {} AS {}", quote_qualified(name), select);
        self.execute_sync(&sql)?;
        self.attach_docs("TABLE", name, docs);
        Ok(())
    }

    async fn create_view_as(
        &self,
        name: &str,
        select: &str,
        docs: Option<&RelationDocs>,
    ) -> DbResult<()> {
        let sql = format!("CREATE OR REPLACE VIEW {} AS {}", quote_qualified(name), select);
        self.execute_sync(&sql)?;
        self.attach_docs("VIEW", name, docs);
        Ok(())
    }

    async fn create_external_table(
        &self,
        name: &str,
        location: &str,
        docs: Option<&RelationDocs>,
    ) -> DbResult<()> {
        // DuckDB scans files by path; the relation is a view over them
        let sql = format!(
            "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}",
            quote_qualified(name),
            quote_literal(location)
        );
        self.execute_sync(&sql)?;
        self.attach_docs("VIEW", name, docs);
        Ok(())
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        Ok(self.relation_kind_sync(name)?.is_some())
    }

    async fn drop_relation(&self, name: &str) -> DbResult<()> {
        match self.relation_kind_sync(name)? {
            Some(RelationKind::View) => {
                self.execute_sync(&format!("DROP VIEW IF EXISTS {}", quote_qualified(name)))?;
            }
            Some(RelationKind::Table) => {
                self.execute_sync(&format!("DROP TABLE IF EXISTS {}", quote_qualified(name)))?;
            }
            None => {}
        }
        Ok(())
    }

    async fn get_table_info(&self, name: &str) -> DbResult<TableInfo> {
        let kind = self
            .relation_kind_sync(name)?
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

        let (schema, table) = split_name(name);
        let columns = self
            .query_rows_sync(&format!(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = '{}' AND table_name = '{}' ORDER BY ordinal_position",
                escape_sql_string(schema),
                escape_sql_string(table)
            ))?
            .into_iter()
            .filter_map(|row| {
                let mut it = row.into_iter();
                let name = it.next().flatten()?;
                let data_type = it.next().flatten().unwrap_or_default();
                Some(ColumnInfo { name, data_type })
            })
            .collect();

        let row_count =
            self.query_count_sync(&format!("SELECT * FROM {}", quote_qualified(name)))? as u64;

        Ok(TableInfo {
            kind: Some(kind),
            columns,
            row_count,
        })
    }

    async fn describe_query(&self, sql: &str) -> DbResult<Vec<ColumnInfo>> {
        let rows = self.query_rows_sync(&format!("DESCRIBE {}", sql))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let mut it = row.into_iter();
                let name = it.next().flatten()?;
                let data_type = it.next().flatten().unwrap_or_default();
                Some(ColumnInfo { name, data_type })
            })
            .collect())
    }

    async fn add_column(&self, table: &str, column: &str, data_type: &str) -> DbResult<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_qualified(table),
            quote_ident(column),
            data_type
        );
        self.execute_sync(&sql).map(|_| ())
    }

    async fn drop_column(&self, table: &str, column: &str) -> DbResult<()> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_qualified(table),
            quote_ident(column)
        );
        self.execute_sync(&sql).map(|_| ())
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema));
        self.execute_sync(&sql).map(|_| ())
    }

    fn supported_materializations(&self) -> &'static [Materialization] {
        SUPPORTED
    }
}

#[async_trait]
impl DatabaseFunction for DuckDbBackend {
    async fn create_function(
        &self,
        function: &ParsedFunction,
        description: Option<&str>,
    ) -> DbResult<()> {
        self.execute_sync(&Self::create_macro_sql(function))?;
        if let Some(desc) = description {
            let sql = format!(
                "COMMENT ON {} {} IS {}",
                Self::macro_keyword(function.function_type),
                quote_qualified(&function.name),
                quote_literal(desc)
            );
            if let Err(e) = self.execute_sync(&sql) {
                log::warn!("Could not attach description to {}: {}", function.name, e);
            }
        }
        Ok(())
    }

    async fn function_exists(&self, name: &str) -> DbResult<bool> {
        let (schema, function) = split_name(name);
        let sql = format!(
            "SELECT * FROM duckdb_functions() WHERE schema_name = '{}' AND function_name = '{}'",
            escape_sql_string(schema),
            escape_sql_string(function)
        );
        Ok(self.query_count_sync(&sql)? > 0)
    }

    async fn drop_function(&self, function: &ParsedFunction) -> DbResult<()> {
        let sql = format!(
            "DROP {} IF EXISTS {}",
            Self::macro_keyword(function.function_type),
            quote_qualified(&function.name)
        );
        self.execute_sync(&sql).map(|_| ())
    }
}

#[async_trait]
impl DatabaseSeed for DuckDbBackend {
    async fn load_seed(&self, table: &str, path: &Path, format: SeedFormat) -> DbResult<()> {
        let file = quote_literal(&path.display().to_string());
        let reader = match format {
            SeedFormat::Csv => format!("read_csv_auto({})", file),
            SeedFormat::Tsv => format!("read_csv_auto({}, delim = '\\t')", file),
            SeedFormat::Json => format!("read_json_auto({})", file),
        };
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM {}",
            quote_qualified(table),
            reader
        );
        self.execute_sync(&sql)
            .map(|_| ())
            .map_err(|e| DbError::SeedError(format!("{}: {}", path.display(), e)))
    }
}

impl Database for DuckDbBackend {}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
