//! kiln-sql - SQL rewriting for Kiln
//!
//! Qualifies bare table references against the active schema using the
//! sqlparser AST.

pub mod error;
pub mod qualify;

pub use error::{SqlError, SqlResult};
pub use qualify::{build_qualification_map, qualify_table_references, QualifiedRef};
