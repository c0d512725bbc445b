use std::path::Path;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow},
    Column, Connection, Executor, Row, TypeInfo, ValueRef,
};

use crate::{
    db::{driver_error, lookup_error, unsupported_type, DEFAULT_MAX_CONNECTIONS},
    errors::{Error, ExecutionError, SchemaError},
    executor::Database,
    results::{ResultSet, SqlValue},
    schema::{ColumnInfo, TableDescription, TableIntrospector},
    types::BoxFuture,
};

/// SQLite backend.
///
/// [`open`](Self::open) opens the file read-only. Each query additionally
/// runs with `PRAGMA query_only = ON` inside its own transaction. The pragma
/// is switched back off before the connection returns to the pool, so a
/// writable pool passed to [`new`](Self::new) stays writable for other users.
/// A connection whose reset fails is closed instead of reused.
#[derive(Clone, Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open an existing database file in read-only mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(opts)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let mut conn = self.pool.acquire().await.map_err(driver_error)?;
        sqlx::query("PRAGMA query_only = ON")
            .execute(&mut *conn)
            .await
            .map_err(driver_error)?;

        let result = run_in_transaction(&mut *conn, sql).await;

        if sqlx::query("PRAGMA query_only = OFF")
            .execute(&mut *conn)
            .await
            .is_err()
        {
            conn.close_on_drop();
        }
        result
    }

    async fn describe(&self, tables: &[String]) -> Result<Vec<TableDescription>, SchemaError> {
        let mut out = Vec::with_capacity(tables.len());
        for name in tables {
            let rows: Vec<(String, String, i64)> =
                sqlx::query_as("SELECT name, type, \"notnull\" FROM pragma_table_info(?1)")
                    .bind(name)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(lookup_error)?;
            out.push(TableDescription {
                table: name.clone(),
                columns: rows
                    .into_iter()
                    .map(|(name, column_type, not_null)| ColumnInfo {
                        name,
                        column_type: column_type.to_uppercase(),
                        nullable: Some(not_null == 0),
                    })
                    .collect(),
            });
        }
        Ok(out)
    }
}

impl Database for SqliteDatabase {
    fn run_read_only<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<ResultSet, ExecutionError>> {
        Box::pin(self.run(sql))
    }
}

impl TableIntrospector for SqliteDatabase {
    fn describe_tables<'a>(
        &'a self,
        tables: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<TableDescription>, SchemaError>> {
        Box::pin(self.describe(tables))
    }
}

async fn run_in_transaction(
    conn: &mut SqliteConnection,
    sql: &str,
) -> Result<ResultSet, ExecutionError> {
    let mut tx = conn.begin().await.map_err(driver_error)?;
    let rows = sqlx::query(sql)
        .fetch_all(&mut *tx)
        .await
        .map_err(driver_error)?;

    let columns = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        None => (&mut *tx)
            .describe(sql)
            .await
            .map_err(driver_error)?
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        out.push(decode_row(row)?);
    }

    tx.commit().await.map_err(driver_error)?;
    Ok(ResultSet { columns, rows: out })
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>, ExecutionError> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        values.push(decode_cell(row, idx, column.name())?);
    }
    Ok(values)
}

/// Decode by the value's storage class; SQLite column types are advisory.
fn decode_cell(row: &SqliteRow, idx: usize, column: &str) -> Result<SqlValue, ExecutionError> {
    let raw = row.try_get_raw(idx).map_err(driver_error)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_string();
    let decoded = match storage.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(SqlValue::Int),
        "REAL" => row.try_get_unchecked::<f64, _>(idx).map(SqlValue::Float),
        "TEXT" => row.try_get_unchecked::<String, _>(idx).map(SqlValue::Text),
        "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(idx).map(SqlValue::Bytes),
        _ => return Err(unsupported_type(column, &storage)),
    };
    decoded.map_err(|_| unsupported_type(column, &storage))
}
