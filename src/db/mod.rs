//! sqlx-backed [`Database`](crate::Database) implementations.

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDatabase;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

use crate::errors::{ExecutionError, SchemaError};

/// Pool size used by the `connect`/`open` constructors.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Driver error text for correction feedback.
///
/// Database-side errors keep the server's own message; everything else uses
/// sqlx's rendering.
pub(crate) fn driver_error(err: sqlx::Error) -> ExecutionError {
    match err {
        sqlx::Error::Database(db_err) => ExecutionError::new(db_err.to_string()),
        other => ExecutionError::new(other.to_string()),
    }
}

pub(crate) fn lookup_error(err: sqlx::Error) -> SchemaError {
    SchemaError::Lookup(err.to_string())
}

pub(crate) fn unsupported_type(column: &str, type_name: &str) -> ExecutionError {
    ExecutionError::new(format!(
        "column \"{column}\" has unsupported type {type_name}; cast it to text in the query"
    ))
}

/// Split `schema.table` into its parts.
pub(crate) fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => (Some(schema), table),
        _ => (None, name),
    }
}
