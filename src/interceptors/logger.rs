use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::chain::Next;
use crate::interceptor::Interceptor;
use crate::types::{ExecutionContext, Outcome, Params};

/// Whether a logged call succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// The chain returned a result.
    Ok,
    /// The chain returned a failure.
    Error,
    /// The chain unwound before returning.
    Panicked,
}

/// One call seen by a [`QueryLogger`].
#[derive(Clone, Debug, Serialize)]
pub struct QueryRecord {
    /// Connection name.
    pub connection: String,
    /// SQL text as the logger received it.
    pub sql: String,
    /// Parameters as the logger received them.
    pub params: Params,
    /// Batch flag.
    pub many: bool,
    /// Outcome of the call.
    pub status: QueryStatus,
    /// Failure message for unsuccessful calls.
    pub error: Option<String>,
    /// Time spent inside the rest of the chain.
    #[serde(rename = "duration_us", serialize_with = "serialize_micros")]
    pub duration: Duration,
}

/// Records every call passing through it, including failed ones.
///
/// Clones share the same record list, so one clone can be installed while
/// another is kept to read the log.
#[derive(Clone, Debug, Default)]
pub struct QueryLogger {
    records: Arc<Mutex<Vec<QueryRecord>>>,
}

impl QueryLogger {
    /// Creates a logger with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the records so far, oldest first.
    pub fn queries(&self) -> Vec<QueryRecord> {
        self.records.lock().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drops all records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Interceptor for QueryLogger {
    fn intercept(&self, next: Next<'_>, ctx: &ExecutionContext) -> Outcome {
        let mut pending = PendingRecord {
            logger: self,
            ctx,
            start: Instant::now(),
            result: None,
        };
        let outcome = next.run(ctx);
        pending.result = Some(match &outcome {
            Ok(_) => Ok(()),
            Err(err) => Err(err.to_string()),
        });
        outcome
    }

    fn name(&self) -> &str {
        "query_logger"
    }
}

// Writes the record on drop so a call that unwinds is still logged.
struct PendingRecord<'a> {
    logger: &'a QueryLogger,
    ctx: &'a ExecutionContext,
    start: Instant,
    result: Option<Result<(), String>>,
}

impl Drop for PendingRecord<'_> {
    fn drop(&mut self) {
        let (status, error) = match self.result.take() {
            Some(Ok(())) => (QueryStatus::Ok, None),
            Some(Err(message)) => (QueryStatus::Error, Some(message)),
            None => (QueryStatus::Panicked, None),
        };
        let record = QueryRecord {
            connection: self.ctx.connection().to_owned(),
            sql: self.ctx.sql().to_owned(),
            params: self.ctx.params().clone(),
            many: self.ctx.many(),
            status,
            error,
            duration: self.start.elapsed(),
        };
        self.logger.records.lock().push(record);
    }
}

fn serialize_micros<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_micros().min(u64::MAX as u128) as u64)
}
