use std::sync::Arc;

use crate::{
    errors::{ExecuteError, ExecutionError},
    guard::ReadOnlyGuard,
    results::{ExecutionResult, ResultSet},
    types::BoxFuture,
};

/// A relational database that can run one statement in read-only mode.
///
/// Implementations own connection acquisition, read-only enforcement and the
/// transaction scope. The connection must be released before the returned
/// future resolves. Driver failures are reported with the driver's message
/// verbatim.
pub trait Database: Send + Sync {
    fn run_read_only<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<ResultSet, ExecutionError>>;
}

impl<D: Database + ?Sized> Database for Arc<D> {
    fn run_read_only<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<ResultSet, ExecutionError>> {
        (**self).run_read_only(sql)
    }
}

/// Validates a candidate query and runs it against a [`Database`].
#[derive(Clone)]
pub struct QueryExecutor {
    database: Arc<dyn Database>,
    guard: ReadOnlyGuard,
}

impl QueryExecutor {
    pub fn new<D: Database + 'static>(database: D) -> Self {
        Self::from_arc(Arc::new(database))
    }

    pub fn from_arc(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            guard: ReadOnlyGuard::new(),
        }
    }

    pub fn with_guard(mut self, guard: ReadOnlyGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Run `sql` if it passes the read-only guard.
    ///
    /// The database is never touched when the guard rejects the query or the
    /// query is blank.
    pub async fn execute(&self, sql: &str) -> Result<ExecutionResult, ExecuteError> {
        self.guard.check(sql)?;
        if sql.trim().is_empty() {
            return Err(ExecutionError::new("query is empty").into());
        }
        let set = self.database.run_read_only(sql).await?;
        Ok(ExecutionResult::from_result_set(set)?)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
