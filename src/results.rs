//! Typed result sets returned by a successful query.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{SerializeMap, SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ExecutionError;

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
}

impl SqlValue {
    /// Short tag naming the value's type, as reported in `column_types`.
    pub fn type_tag(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Json(_) => "json",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamptz",
            SqlValue::Uuid(_) => "uuid",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{v}"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Decimal(v) => write!(f, "{v}"),
            SqlValue::Text(v) => write!(f, "{v}"),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Json(v) => write!(f, "{v}"),
            SqlValue::Date(v) => write!(f, "{v}"),
            SqlValue::Time(v) => write!(f, "{v}"),
            SqlValue::Timestamp(v) => write!(f, "{v}"),
            SqlValue::TimestampTz(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_unit(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::Int(v) => serializer.serialize_i64(*v),
            SqlValue::Float(v) => serializer.serialize_f64(*v),
            // Decimals keep their exact digits as strings.
            SqlValue::Decimal(v) => serializer.serialize_str(&v.to_string()),
            SqlValue::Text(v) => serializer.serialize_str(v),
            SqlValue::Bytes(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for b in v {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            SqlValue::Json(v) => v.serialize(serializer),
            SqlValue::Date(v) => serializer.serialize_str(&v.format("%Y-%m-%d").to_string()),
            SqlValue::Time(v) => serializer.serialize_str(&v.format("%H:%M:%S%.f").to_string()),
            SqlValue::Timestamp(v) => {
                serializer.serialize_str(&v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            SqlValue::TimestampTz(v) => serializer.serialize_str(&v.to_rfc3339()),
            SqlValue::Uuid(v) => serializer.serialize_str(&v.to_string()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Raw rows as produced by a database backend, before shaping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Shaped output of a successful query.
///
/// Column names are unique and every row has exactly one cell per column.
/// `column_types` is derived from the first row and is absent when there are
/// no rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    column_names: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    column_types: Option<Vec<String>>,
}

impl ExecutionResult {
    /// Shape a backend result set, disambiguating duplicate column labels.
    ///
    /// Fails when a row's width does not match the column count.
    pub fn from_result_set(set: ResultSet) -> Result<Self, ExecutionError> {
        let column_names = unique_column_names(set.columns);
        for (idx, row) in set.rows.iter().enumerate() {
            if row.len() != column_names.len() {
                return Err(ExecutionError::new(format!(
                    "row {} has {} values but the result has {} columns",
                    idx,
                    row.len(),
                    column_names.len()
                )));
            }
        }
        let column_types = set
            .rows
            .first()
            .map(|row| row.iter().map(|v| v.type_tag().to_string()).collect());
        Ok(Self {
            column_names,
            rows: set.rows,
            column_types,
        })
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    pub fn column_types(&self) -> Option<&[String]> {
        self.column_types.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ordered column-to-value view over each row.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |values| Record {
            columns: &self.column_names,
            values,
        })
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<SqlValue>>, Option<Vec<String>>) {
        (self.column_names, self.rows, self.column_types)
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.column_types.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("ExecutionResult", len)?;
        state.serialize_field("column_names", &self.column_names)?;
        let records: Vec<Record<'_>> = self.records().collect();
        state.serialize_field("results", &records)?;
        match &self.column_types {
            Some(types) => state.serialize_field("column_types", types)?,
            // No rows, no types: the key is left out.
            None => state.skip_field("column_types")?,
        }
        state.end()
    }
}

/// One row viewed as an ordered mapping from column name to value.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

fn unique_column_names(columns: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(columns.len());
    for name in columns {
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            out.push(name);
            continue;
        }
        let mut suffix = *count;
        let mut candidate = format!("{name}_{suffix}");
        while seen.contains_key(&candidate) || out.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}_{suffix}");
        }
        seen.insert(candidate.clone(), 1);
        out.push(candidate);
    }
    out
}
