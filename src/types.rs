//! Values flowing through an execution chain.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::ExecutionFailure;

/// Outcome of one execution: the executor's output or the failure that
/// stopped it.
pub type Outcome = std::result::Result<QueryOutput, ExecutionFailure>;

/// Parameter or column value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Parses a command-line literal: `null`, an integer, a float, or text.
    pub fn parse_literal(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("null") {
            return Value::Null;
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Value::Integer(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Value::Real(v);
        }
        Value::Text(raw.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{v}'"),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        };
        Ok(out)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

/// Parameters of a call: one positional list, or one list per batch entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Params {
    /// Parameters for a single statement.
    Single(Vec<Value>),
    /// Parameter sets for an `executemany` batch.
    Batch(Vec<Vec<Value>>),
}

impl Params {
    /// Number of parameter sets (1 for a single statement).
    pub fn set_count(&self) -> usize {
        match self {
            Params::Single(_) => 1,
            Params::Batch(batches) => batches.len(),
        }
    }

    /// Returns the single parameter list, if this is not a batch.
    pub fn as_single(&self) -> Option<&[Value]> {
        match self {
            Params::Single(values) => Some(values),
            Params::Batch(_) => None,
        }
    }

    /// Returns the batch parameter sets, if this is a batch.
    pub fn as_batch(&self) -> Option<&[Vec<Value>]> {
        match self {
            Params::Single(_) => None,
            Params::Batch(batches) => Some(batches),
        }
    }
}

/// Opaque caller-supplied value threaded unmodified through a call.
#[derive(Clone, Default)]
pub struct Correlation(Option<Arc<dyn Any + Send + Sync>>);

impl Correlation {
    /// No correlation value.
    pub fn none() -> Self {
        Self(None)
    }

    /// Wraps a caller value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Borrows the value as `T` if one was supplied with that type.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns `true` if no value was supplied.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Returns `true` if both handles point at the same value.
    pub fn ptr_eq(&self, other: &Correlation) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Correlation(..)"),
            None => f.write_str("Correlation(None)"),
        }
    }
}

/// Immutable description of one call, handed to every interceptor and to the
/// terminal executor.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    sql: Arc<str>,
    params: Params,
    many: bool,
    connection: Arc<str>,
    correlation: Correlation,
}

impl ExecutionContext {
    /// Context for a single statement.
    pub fn single(
        connection: Arc<str>,
        sql: impl Into<Arc<str>>,
        params: Vec<Value>,
        correlation: Correlation,
    ) -> Self {
        Self {
            sql: sql.into(),
            params: Params::Single(params),
            many: false,
            connection,
            correlation,
        }
    }

    /// Context for an `executemany` batch.
    pub fn batch(
        connection: Arc<str>,
        sql: impl Into<Arc<str>>,
        batches: Vec<Vec<Value>>,
        correlation: Correlation,
    ) -> Self {
        Self {
            sql: sql.into(),
            params: Params::Batch(batches),
            many: true,
            connection,
            correlation,
        }
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Whether this is a batch call.
    pub fn many(&self) -> bool {
        self.many
    }

    /// Name of the connection executing the call.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Caller-supplied correlation value.
    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    /// Derives a context with different SQL text.
    pub fn with_sql(&self, sql: impl Into<Arc<str>>) -> Self {
        Self {
            sql: sql.into(),
            ..self.clone()
        }
    }

    /// Derives a context with different parameters. The batch flag follows
    /// the parameter shape.
    pub fn with_params(&self, params: Params) -> Self {
        let many = matches!(params, Params::Batch(_));
        Self {
            params,
            many,
            ..self.clone()
        }
    }
}

/// Output of a successful execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    /// Column names, empty for statements that return no rows.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a DML statement or batch.
    pub rows_affected: u64,
    /// Rowid of the most recent successful insert on the connection.
    pub last_insert_rowid: Option<i64>,
}

impl QueryOutput {
    /// Output carrying only a rows-affected count.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// Output holding a single scalar row.
    pub fn scalar(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            columns: vec![column.into()],
            rows: vec![vec![value.into()]],
            ..Self::default()
        }
    }

    /// First column of the first row, if any.
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}
