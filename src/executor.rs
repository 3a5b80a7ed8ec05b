//! Terminal executors: the real operation at the innermost end of a chain.

use parking_lot::Mutex;
use rusqlite::{params_from_iter, OpenFlags};
use tracing::debug;

use crate::config::ConnectionSettings;
use crate::error::Result;
use crate::types::{ExecutionContext, Outcome, Params, QueryOutput, Value};

/// The low-level execute primitive interceptors are wrapped around.
pub trait Executor: Send + Sync {
    /// Executes the call described by `ctx`.
    fn execute(&self, ctx: &ExecutionContext) -> Outcome;
}

/// Executor backed by a closure. Built with [`executor_fn`].
pub struct FnExecutor<F>(F);

/// Turns a closure into an [`Executor`]; handy for stubs in tests.
pub fn executor_fn<F>(f: F) -> FnExecutor<F>
where
    F: Fn(&ExecutionContext) -> Outcome + Send + Sync,
{
    FnExecutor(f)
}

impl<F> Executor for FnExecutor<F>
where
    F: Fn(&ExecutionContext) -> Outcome + Send + Sync,
{
    fn execute(&self, ctx: &ExecutionContext) -> Outcome {
        (self.0)(ctx)
    }
}

/// Executes statements on a SQLite database through `rusqlite`.
pub struct SqliteExecutor {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteExecutor {
    /// Opens the database described by `settings`.
    pub fn open(settings: &ConnectionSettings) -> Result<Self> {
        let conn = if settings.is_memory() {
            rusqlite::Connection::open_in_memory()?
        } else if settings.read_only {
            rusqlite::Connection::open_with_flags(
                &settings.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            rusqlite::Connection::open(&settings.path)?
        };
        if let Some(timeout) = settings.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        if let Some(mode) = settings.journal_mode.as_deref() {
            conn.pragma_update(None, "journal_mode", mode)?;
        }
        debug!(
            path = %settings.path.display(),
            read_only = settings.read_only,
            "sqlwrap.sqlite.open"
        );
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(rusqlite::Connection::open_in_memory()?))
    }

    /// Wraps an already open connection.
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Runs `f` with the underlying connection locked, bypassing every
    /// interceptor.
    pub fn with_connection<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> T) -> T {
        let conn = self.conn.lock();
        f(&conn)
    }
}

impl Executor for SqliteExecutor {
    fn execute(&self, ctx: &ExecutionContext) -> Outcome {
        let conn = self.conn.lock();
        match ctx.params() {
            Params::Single(values) => run_single(&conn, ctx.sql(), values),
            Params::Batch(batches) => run_batch(&conn, ctx.sql(), batches),
        }
    }
}

fn run_single(conn: &rusqlite::Connection, sql: &str, values: &[Value]) -> Outcome {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    if columns.is_empty() {
        let affected = stmt.execute(params_from_iter(values.iter()))?;
        return Ok(QueryOutput {
            rows_affected: affected as u64,
            last_insert_rowid: Some(conn.last_insert_rowid()),
            ..QueryOutput::default()
        });
    }
    let width = columns.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.query(params_from_iter(values.iter()))?;
    while let Some(row) = cursor.next()? {
        let mut out = Vec::with_capacity(width);
        for idx in 0..width {
            out.push(Value::from(row.get_ref(idx)?));
        }
        rows.push(out);
    }
    Ok(QueryOutput {
        columns,
        rows,
        ..QueryOutput::default()
    })
}

fn run_batch(conn: &rusqlite::Connection, sql: &str, batches: &[Vec<Value>]) -> Outcome {
    if batches.is_empty() {
        return Ok(QueryOutput::affected(0));
    }
    // Only open a transaction of our own when the caller has none running.
    let tx = if conn.is_autocommit() {
        Some(conn.unchecked_transaction()?)
    } else {
        None
    };
    let mut total = 0u64;
    {
        let mut stmt = conn.prepare(sql)?;
        for values in batches {
            total += stmt.execute(params_from_iter(values.iter()))? as u64;
        }
    }
    if let Some(tx) = tx {
        tx.commit()?;
    }
    Ok(QueryOutput {
        rows_affected: total,
        last_insert_rowid: Some(conn.last_insert_rowid()),
        ..QueryOutput::default()
    })
}
