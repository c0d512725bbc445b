use std::future::Future;

use tokio::runtime::{Builder, Runtime};

use crate::{
    errors::{Error, Result},
    orchestrator::{TextToSql, TextToSqlOutcome},
    types::Conversation,
};

/// Synchronous front end for [`TextToSql`].
///
/// Owns a current-thread tokio runtime and drives every call on it. sqlx
/// pools spawn maintenance tasks on the runtime that creates them, so build
/// database handles through [`BlockingTextToSql::build`] rather than on a
/// runtime that will be dropped.
pub struct BlockingTextToSql {
    inner: TextToSql,
    runtime: Runtime,
}

impl BlockingTextToSql {
    /// Wrap an engine whose collaborators do not depend on a runtime.
    pub fn new(inner: TextToSql) -> Result<Self> {
        Ok(Self {
            inner,
            runtime: new_runtime()?,
        })
    }

    /// Construct the engine on the owned runtime.
    ///
    /// ```ignore
    /// let engine = BlockingTextToSql::build(|| async {
    ///     let db = SqliteDatabase::open("nba.db").await?;
    ///     Ok(TextToSql::builder(ChatClient::from_env()?, db)
    ///         .schema_provider(schemas)
    ///         .build())
    /// })?;
    /// ```
    pub fn build<F, Fut>(make: F) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TextToSql>>,
    {
        let runtime = new_runtime()?;
        let inner = runtime.block_on(make())?;
        Ok(Self { inner, runtime })
    }

    pub fn engine(&self) -> &TextToSql {
        &self.inner
    }

    pub fn answer<T: AsRef<str>>(&self, query: &str, tables: &[T]) -> Result<TextToSqlOutcome> {
        self.runtime.block_on(self.inner.answer(query, tables))
    }

    pub fn answer_in<T: AsRef<str>>(
        &self,
        query: &str,
        tables: &[T],
        conversation: &mut Conversation,
    ) -> Result<TextToSqlOutcome> {
        self.runtime
            .block_on(self.inner.answer_in(query, tables, conversation))
    }
}

impl std::fmt::Debug for BlockingTextToSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingTextToSql")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

fn new_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| Error::Config(format!("failed to start runtime: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{fixtures, MockCompletionClient, MockDatabase};

    #[test]
    fn answers_without_an_ambient_runtime() {
        let completion =
            MockCompletionClient::new().with_reply(fixtures::sql_reply("SELECT home_team FROM games"));
        let db = MockDatabase::new().with_result(fixtures::games_result_set());
        let engine = TextToSql::builder(completion, db)
            .schema_provider(fixtures::schema_provider())
            .build();

        let blocking = BlockingTextToSql::new(engine).unwrap();
        let (result, sql) = blocking.answer("teams?", &["games"]).unwrap().into_parts();
        assert_eq!(sql.as_deref(), Some("SELECT home_team FROM games"));
        assert_eq!(result.unwrap().len(), 2);
    }

    #[test]
    fn build_propagates_constructor_errors() {
        let err = BlockingTextToSql::build(|| async { Err(Error::Config("no key".into())) })
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m == "no key"));
    }
}
