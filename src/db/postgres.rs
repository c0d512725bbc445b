use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{
    postgres::{PgDatabaseError, PgPool, PgPoolOptions, PgRow},
    Column, Executor, Row, TypeInfo,
};
use uuid::Uuid;

use crate::{
    db::{driver_error, lookup_error, split_qualified, unsupported_type, DEFAULT_MAX_CONNECTIONS},
    errors::{Error, ExecutionError, SchemaError},
    executor::Database,
    results::{ResultSet, SqlValue},
    schema::{ColumnInfo, TableDescription, TableIntrospector},
    types::BoxFuture,
};

/// Postgres backend.
///
/// Every query runs in its own `READ ONLY` transaction on a pooled
/// connection. The transaction is committed after all rows are read and
/// rolled back if anything fails.
#[derive(Clone, Debug)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let mut tx = self.pool.begin().await.map_err(pg_error)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(pg_error)?;

        let rows = sqlx::query(sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(pg_error)?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            // No rows to read labels from; ask the server for the row description.
            None => (&mut *tx)
                .describe(sql)
                .await
                .map_err(pg_error)?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_row(row)?);
        }

        tx.commit().await.map_err(pg_error)?;
        Ok(ResultSet { columns, rows: out })
    }

    async fn describe(&self, tables: &[String]) -> Result<Vec<TableDescription>, SchemaError> {
        let mut out = Vec::with_capacity(tables.len());
        for name in tables {
            let (schema, table) = split_qualified(name);
            let rows: Vec<(String, String, String)> = match schema {
                Some(schema) => sqlx::query_as(
                    "SELECT column_name::text, data_type::text, is_nullable::text \
                     FROM information_schema.columns \
                     WHERE table_schema = $1 AND table_name = $2 \
                     ORDER BY ordinal_position",
                )
                .bind(schema)
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(lookup_error)?,
                None => sqlx::query_as(
                    "SELECT column_name::text, data_type::text, is_nullable::text \
                     FROM information_schema.columns \
                     WHERE table_schema = ANY(current_schemas(false)) AND table_name = $1 \
                     ORDER BY ordinal_position",
                )
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(lookup_error)?,
            };
            out.push(TableDescription {
                table: name.clone(),
                columns: rows
                    .into_iter()
                    .map(|(name, column_type, nullable)| ColumnInfo {
                        name,
                        column_type: column_type.to_uppercase(),
                        nullable: Some(nullable.eq_ignore_ascii_case("YES")),
                    })
                    .collect(),
            });
        }
        Ok(out)
    }
}

impl Database for PostgresDatabase {
    fn run_read_only<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<ResultSet, ExecutionError>> {
        Box::pin(self.run(sql))
    }
}

impl TableIntrospector for PostgresDatabase {
    fn describe_tables<'a>(
        &'a self,
        tables: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<TableDescription>, SchemaError>> {
        Box::pin(self.describe(tables))
    }
}

/// Server message plus its HINT line when present, as psql prints them.
fn pg_error(err: sqlx::Error) -> ExecutionError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(pg) = db_err.try_downcast_ref::<PgDatabaseError>() {
            let mut message = pg.message().to_string();
            if let Some(detail) = pg.detail() {
                message.push_str("\nDETAIL:  ");
                message.push_str(detail);
            }
            if let Some(hint) = pg.hint() {
                message.push_str("\nHINT:  ");
                message.push_str(hint);
            }
            return ExecutionError::new(message);
        }
    }
    driver_error(err)
}

fn decode_row(row: &PgRow) -> Result<Vec<SqlValue>, ExecutionError> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        values.push(decode_cell(row, idx, column.name(), type_name)?);
    }
    Ok(values)
}

fn decode_cell(
    row: &PgRow,
    idx: usize,
    column: &str,
    type_name: &str,
) -> Result<SqlValue, ExecutionError> {
    let decoded = match type_name {
        "BOOL" => get::<bool>(row, idx).map(|v| v.map(SqlValue::Bool)),
        "INT2" => get::<i16>(row, idx).map(|v| v.map(|n| SqlValue::Int(n.into()))),
        "INT4" => get::<i32>(row, idx).map(|v| v.map(|n| SqlValue::Int(n.into()))),
        "INT8" => get::<i64>(row, idx).map(|v| v.map(SqlValue::Int)),
        "FLOAT4" => get::<f32>(row, idx).map(|v| v.map(|n| SqlValue::Float(n.into()))),
        "FLOAT8" => get::<f64>(row, idx).map(|v| v.map(SqlValue::Float)),
        "NUMERIC" => get::<Decimal>(row, idx).map(|v| v.map(SqlValue::Decimal)),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => {
            get::<String>(row, idx).map(|v| v.map(SqlValue::Text))
        }
        "DATE" => get::<NaiveDate>(row, idx).map(|v| v.map(SqlValue::Date)),
        "TIME" => get::<NaiveTime>(row, idx).map(|v| v.map(SqlValue::Time)),
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx).map(|v| v.map(SqlValue::Timestamp)),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx).map(|v| v.map(SqlValue::TimestampTz)),
        "UUID" => get::<Uuid>(row, idx).map(|v| v.map(SqlValue::Uuid)),
        "JSON" | "JSONB" => get::<serde_json::Value>(row, idx).map(|v| v.map(SqlValue::Json)),
        "BYTEA" => get::<Vec<u8>>(row, idx).map(|v| v.map(SqlValue::Bytes)),
        _ => get::<String>(row, idx).map(|v| v.map(SqlValue::Text)),
    };
    match decoded {
        Ok(value) => Ok(value.unwrap_or(SqlValue::Null)),
        Err(_) => Err(unsupported_type(column, type_name)),
    }
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
}
