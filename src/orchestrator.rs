//! Bounded generate-validate-execute loop with model-guided correction.
//!
//! Each attempt asks the completion service for a reply, extracts one SQL
//! statement from it, checks that the statement is read-only and runs it.
//! A failed attempt appends the rejected reply plus a correction turn
//! describing the failure, and the next attempt sees the grown transcript.
//!
//! # Example
//!
//! ```ignore
//! let engine = TextToSql::builder(ChatClient::from_env()?, SqliteDatabase::open("nba.db").await?)
//!     .schema_provider(StaticSchemaProvider::new().with_table("games", "games(id INTEGER, ...)"))
//!     .build();
//!
//! match engine.answer("Which team scored the most points?", &["games"]).await? {
//!     TextToSqlOutcome::Answered { result, sql, .. } => println!("{sql}\n{}", result.len()),
//!     TextToSqlOutcome::Exhausted { attempts } => eprintln!("gave up after {}", attempts.len()),
//! }
//! ```

use std::{sync::Arc, time::Instant};

use crate::{
    completion::CompletionClient,
    errors::{AttemptFailure, CompletionError, Error, Result, ValidationError},
    executor::{Database, QueryExecutor},
    extract::{MarkdownSqlExtractor, SqlExtractor},
    guard::ReadOnlyGuard,
    prompts::PromptTemplates,
    results::ExecutionResult,
    schema::{FeaturedQueries, FewShotProvider, NoFewShot, SchemaProvider, DEFAULT_FEW_SHOT_MODE},
    telemetry::{AttemptMetrics, MetricsCallbacks, Telemetry},
    types::{Conversation, Message, Model},
};

/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Options
// ============================================================================

/// Per-engine configuration.
#[derive(Debug, Clone)]
pub struct TextToSqlOptions {
    pub model: Model,
    /// Maximum number of attempts (default: 3). Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Mode passed to the few-shot provider.
    pub few_shot_mode: String,
    pub templates: PromptTemplates,
}

impl Default for TextToSqlOptions {
    fn default() -> Self {
        Self {
            model: Model::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            few_shot_mode: DEFAULT_FEW_SHOT_MODE.to_string(),
            templates: PromptTemplates::default(),
        }
    }
}

impl TextToSqlOptions {
    pub fn with_model(mut self, model: impl Into<Model>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_few_shot_mode(mut self, mode: impl Into<String>) -> Self {
        self.few_shot_mode = mode.into();
        self
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// The attempt budget actually used.
    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The query ran; carries the shaped result and the accepted SQL.
    Success(ExecutionResult, String),
    /// The attempt failed in a way the model can be asked to correct.
    Failure(AttemptFailure),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(..))
    }
}

/// Record of one failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// Which attempt (1-based).
    pub attempt: u32,
    /// Raw assistant reply.
    pub reply: String,
    /// Extracted SQL, when extraction succeeded.
    pub sql: Option<String>,
    pub failure: AttemptFailure,
}

/// Terminal state of one [`TextToSql::answer`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum TextToSqlOutcome {
    Answered {
        result: ExecutionResult,
        sql: String,
        /// Attempts that failed before the successful one.
        failed_attempts: Vec<AttemptRecord>,
    },
    /// Every attempt failed. This is a normal outcome, not an error.
    Exhausted { attempts: Vec<AttemptRecord> },
}

impl TextToSqlOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, TextToSqlOutcome::Answered { .. })
    }

    /// Failed attempts, in order.
    pub fn failures(&self) -> &[AttemptRecord] {
        match self {
            TextToSqlOutcome::Answered {
                failed_attempts, ..
            } => failed_attempts,
            TextToSqlOutcome::Exhausted { attempts } => attempts,
        }
    }

    /// `(result, sql)` on success, `(None, None)` when exhausted.
    pub fn into_parts(self) -> (Option<ExecutionResult>, Option<String>) {
        match self {
            TextToSqlOutcome::Answered { result, sql, .. } => (Some(result), Some(sql)),
            TextToSqlOutcome::Exhausted { .. } => (None, None),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Text-to-SQL engine.
///
/// Holds only configuration and shared collaborators, so one instance can
/// serve concurrent calls; each call owns (or borrows) its own conversation.
#[derive(Clone)]
pub struct TextToSql {
    completion: Arc<dyn CompletionClient>,
    executor: QueryExecutor,
    schema: Option<Arc<dyn SchemaProvider>>,
    few_shot: Arc<dyn FewShotProvider>,
    featured: Option<Arc<dyn FeaturedQueries>>,
    extractor: Arc<dyn SqlExtractor>,
    options: TextToSqlOptions,
    telemetry: Telemetry,
}

impl std::fmt::Debug for TextToSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextToSql")
            .field("executor", &self.executor)
            .field("has_schema_provider", &self.schema.is_some())
            .field("has_featured_queries", &self.featured.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TextToSql {
    pub fn builder<C, D>(completion: C, database: D) -> TextToSqlBuilder
    where
        C: CompletionClient + 'static,
        D: Database + 'static,
    {
        TextToSqlBuilder::new(Arc::new(completion), Arc::new(database))
    }

    pub fn options(&self) -> &TextToSqlOptions {
        &self.options
    }

    /// Answer `query` using a fresh conversation.
    pub async fn answer<T: AsRef<str>>(&self, query: &str, tables: &[T]) -> Result<TextToSqlOutcome> {
        let mut conversation = Conversation::new();
        self.answer_in(query, tables, &mut conversation).await
    }

    /// Answer `query`, continuing `conversation`.
    ///
    /// An empty conversation means a fresh question: a featured query for it
    /// is tried first, then the conversation is seeded with few-shot turns and
    /// the instruction message. A non-empty one is used as-is and `query` is
    /// not appended again. Correction turns are appended to it either way, so
    /// the caller sees the full transcript afterwards.
    pub async fn answer_in<T: AsRef<str>>(
        &self,
        query: &str,
        tables: &[T],
        conversation: &mut Conversation,
    ) -> Result<TextToSqlOutcome> {
        if conversation.is_empty() {
            if let Some(outcome) = self.try_featured(query).await {
                return Ok(outcome);
            }
            let seeded = self.build_conversation(query, tables).await?;
            conversation.extend(seeded.into_messages());
        }
        self.run(conversation).await
    }

    /// Build the initial transcript: few-shot turns, then the instruction
    /// message carrying the question and schema text.
    pub async fn build_conversation<T: AsRef<str>>(
        &self,
        query: &str,
        tables: &[T],
    ) -> Result<Conversation> {
        if query.trim().is_empty() {
            return Err(ValidationError::new("natural-language query is required")
                .with_field("query")
                .into());
        }
        let schema = self.schema.as_ref().ok_or_else(|| {
            Error::Config("a schema provider is required to build a conversation".into())
        })?;
        let tables: Vec<String> = tables.iter().map(|t| t.as_ref().to_string()).collect();
        let schemas_str = schema.describe(&tables).await?;

        let mut conversation = Conversation::new();
        conversation.extend(self.few_shot.few_shot_messages(&self.options.few_shot_mode));
        conversation.push(Message::user(
            self.options.templates.render_text_to_sql(query, &schemas_str),
        ));
        Ok(conversation)
    }

    /// Run the stored SQL for a featured question. A miss, or stored SQL that
    /// fails, falls through to generation.
    async fn try_featured(&self, query: &str) -> Option<TextToSqlOutcome> {
        let sql = self.featured.as_ref()?.featured_sql(query)?;
        match self.executor.execute(&sql).await {
            Ok(result) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(sql = %sql, "answered from featured query");
                Some(TextToSqlOutcome::Answered {
                    result,
                    sql,
                    failed_attempts: Vec::new(),
                })
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "featured query failed; generating instead");
                None
            }
        }
    }

    async fn run(&self, conversation: &mut Conversation) -> Result<TextToSqlOutcome> {
        let max_attempts = self.options.effective_max_attempts();
        let mut failures: Vec<AttemptRecord> = Vec::new();

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            let step = self.attempt(conversation);
            #[cfg(feature = "tracing")]
            let step = tracing::Instrument::instrument(
                step,
                tracing::debug_span!("sqlrelay.attempt", attempt, max_attempts),
            );

            let (reply, sql, outcome) = match step.await {
                Ok(step) => step,
                Err(err) => {
                    self.record(attempt, started, "completion_error", Some(err.to_string()));
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %err, "completion failed; aborting");
                    return Err(Error::Completion(err));
                }
            };

            match outcome {
                AttemptOutcome::Success(result, sql) => {
                    self.record(attempt, started, "success", None);
                    return Ok(TextToSqlOutcome::Answered {
                        result,
                        sql,
                        failed_attempts: failures,
                    });
                }
                AttemptOutcome::Failure(failure) => {
                    let description = failure.description();
                    self.record(attempt, started, failure.kind(), Some(description.clone()));
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        kind = failure.kind(),
                        error = %description,
                        "attempt failed"
                    );

                    conversation.push(Message::assistant(reply.clone()));
                    conversation.push(Message::user(
                        self.options.templates.render_error_correction(&description),
                    ));
                    failures.push(AttemptRecord {
                        attempt,
                        reply,
                        sql,
                        failure,
                    });
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(max_attempts, "could not produce a working query");
        Ok(TextToSqlOutcome::Exhausted { attempts: failures })
    }

    /// One attempt against the current transcript. Only a completion failure
    /// is an `Err`; everything else is an [`AttemptOutcome`].
    async fn attempt(
        &self,
        conversation: &Conversation,
    ) -> std::result::Result<(String, Option<String>, AttemptOutcome), CompletionError> {
        let reply = self
            .completion
            .complete(&self.options.model, conversation)
            .await?
            .content;

        let sql = match self.extractor.extract(&reply) {
            Ok(sql) => sql,
            Err(no_sql) => return Ok((reply, None, AttemptOutcome::Failure(no_sql.into()))),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %sql, "extracted query");

        let outcome = match self.executor.execute(&sql).await {
            Ok(result) => AttemptOutcome::Success(result, sql.clone()),
            Err(err) => AttemptOutcome::Failure(err.into()),
        };
        Ok((reply, Some(sql), outcome))
    }

    fn record(&self, attempt: u32, started: Instant, outcome: &'static str, error: Option<String>) {
        if self.telemetry.attempt_enabled() {
            self.telemetry.record_attempt(AttemptMetrics {
                attempt,
                max_attempts: self.options.effective_max_attempts(),
                latency: started.elapsed(),
                outcome,
                error,
            });
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`TextToSql`].
pub struct TextToSqlBuilder {
    completion: Arc<dyn CompletionClient>,
    database: Arc<dyn Database>,
    schema: Option<Arc<dyn SchemaProvider>>,
    few_shot: Arc<dyn FewShotProvider>,
    featured: Option<Arc<dyn FeaturedQueries>>,
    extractor: Arc<dyn SqlExtractor>,
    guard: ReadOnlyGuard,
    options: TextToSqlOptions,
    metrics: Option<MetricsCallbacks>,
}

impl TextToSqlBuilder {
    pub fn new(completion: Arc<dyn CompletionClient>, database: Arc<dyn Database>) -> Self {
        Self {
            completion,
            database,
            schema: None,
            few_shot: Arc::new(NoFewShot),
            featured: None,
            extractor: Arc::new(MarkdownSqlExtractor),
            guard: ReadOnlyGuard::new(),
            options: TextToSqlOptions::default(),
            metrics: None,
        }
    }

    pub fn schema_provider(mut self, provider: impl SchemaProvider + 'static) -> Self {
        self.schema = Some(Arc::new(provider));
        self
    }

    pub fn few_shot(mut self, provider: impl FewShotProvider + 'static) -> Self {
        self.few_shot = Arc::new(provider);
        self
    }

    /// Curated SQL tried before generation for exact-match questions.
    pub fn featured_queries(mut self, featured: impl FeaturedQueries + 'static) -> Self {
        self.featured = Some(Arc::new(featured));
        self
    }

    pub fn extractor(mut self, extractor: impl SqlExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn guard(mut self, guard: ReadOnlyGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn metrics(mut self, metrics: MetricsCallbacks) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(mut self, options: TextToSqlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(mut self, model: impl Into<Model>) -> Self {
        self.options.model = model.into();
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.options.max_attempts = max_attempts;
        self
    }

    pub fn build(self) -> TextToSql {
        TextToSql {
            completion: self.completion,
            executor: QueryExecutor::from_arc(self.database).with_guard(self.guard),
            schema: self.schema,
            few_shot: self.few_shot,
            featured: self.featured,
            extractor: self.extractor,
            options: self.options,
            telemetry: Telemetry::new(self.metrics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SchemaError;
    use crate::mock::{fixtures, MockCompletionClient, MockDatabase};
    use crate::schema::{StaticFeaturedQueries, StaticFewShot};
    use crate::types::MessageRole;
    use std::sync::Mutex;

    fn engine(completion: &MockCompletionClient, db: &MockDatabase, k: u32) -> TextToSql {
        TextToSql::builder(completion.clone(), db.clone())
            .schema_provider(fixtures::schema_provider())
            .max_attempts(k)
            .build()
    }

    #[tokio::test]
    async fn valid_sql_succeeds_after_one_completion() {
        let completion = MockCompletionClient::new()
            .with_reply(fixtures::sql_reply("SELECT home_team, home_score FROM games"));
        let db = MockDatabase::new().with_result(fixtures::games_result_set());

        let outcome = engine(&completion, &db, 3)
            .answer("Show home scores", &["games"])
            .await
            .unwrap();

        assert_eq!(completion.call_count(), 1);
        assert_eq!(db.run_count(), 1);
        let (result, sql) = outcome.into_parts();
        assert_eq!(sql.as_deref(), Some("SELECT home_team, home_score FROM games"));
        let result = result.unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.rows().iter().all(|r| r.len() == result.column_names().len()));
    }

    #[tokio::test]
    async fn mutating_sql_exhausts_budget() {
        let completion =
            MockCompletionClient::new().with_fallback_reply(fixtures::sql_reply("DROP TABLE games"));
        let db = MockDatabase::new();
        let mut convo = Conversation::new();

        let outcome = engine(&completion, &db, 3)
            .answer_in("Delete everything", &["games"], &mut convo)
            .await
            .unwrap();

        assert_eq!(completion.call_count(), 3);
        assert_eq!(db.run_count(), 0);
        // One instruction message plus two turns per failed attempt.
        assert_eq!(convo.len(), 1 + 2 * 3);
        assert_eq!(outcome.failures().len(), 3);
        assert!(outcome
            .failures()
            .iter()
            .all(|r| matches!(r.failure, AttemptFailure::NotReadOnly(_))));
        assert_eq!(outcome.into_parts(), (None, None));
    }

    #[tokio::test]
    async fn transcript_grows_by_two_per_failure() {
        let completion =
            MockCompletionClient::new().with_fallback_reply(fixtures::sql_reply("UPDATE t SET x=1"));
        let db = MockDatabase::new();
        engine(&completion, &db, 3)
            .answer("q", &["games"])
            .await
            .unwrap();

        let lens: Vec<usize> = completion.transcripts().iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn completion_failure_is_fatal_and_appends_nothing() {
        let completion =
            MockCompletionClient::new().with_error(CompletionError::Other("upstream 503".into()));
        let db = MockDatabase::new();
        let mut convo = Conversation::new();

        let err = engine(&completion, &db, 3)
            .answer_in("q", &["games"], &mut convo)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Completion(CompletionError::Other(ref m)) if m == "upstream 503"));
        assert_eq!(completion.call_count(), 1);
        assert_eq!(convo.len(), 1);
    }

    #[tokio::test]
    async fn driver_error_feeds_correction_turn() {
        let msg = "column \"scor\" does not exist";
        let completion = MockCompletionClient::new()
            .with_reply(fixtures::sql_reply("SELECT scor FROM games"))
            .with_reply(fixtures::sql_reply("SELECT home_score FROM games"));
        let db = MockDatabase::new()
            .with_error(msg)
            .with_result(fixtures::games_result_set());
        let mut convo = Conversation::new();

        let outcome = engine(&completion, &db, 3)
            .answer_in("scores?", &["games"], &mut convo)
            .await
            .unwrap();

        assert!(outcome.is_answered());
        assert_eq!(outcome.failures().len(), 1);
        assert_eq!(outcome.failures()[0].sql.as_deref(), Some("SELECT scor FROM games"));
        let messages = convo.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, fixtures::sql_reply("SELECT scor FROM games"));
        assert_eq!(messages[2].role, MessageRole::User);
        assert!(messages[2]
            .content
            .contains(&format!("---------------------\n{msg}\n---------------------")));
    }

    #[tokio::test]
    async fn reply_without_sql_is_recoverable() {
        let completion = MockCompletionClient::new()
            .with_reply("I am not sure what you mean.")
            .with_reply(fixtures::sql_reply("SELECT 1"));
        let db = MockDatabase::new().with_result(fixtures::games_result_set());
        let mut convo = Conversation::new();

        let outcome = engine(&completion, &db, 3)
            .answer_in("q", &["games"], &mut convo)
            .await
            .unwrap();

        assert!(outcome.is_answered());
        assert!(matches!(outcome.failures()[0].failure, AttemptFailure::NoSql(_)));
        assert!(outcome.failures()[0].sql.is_none());
        assert!(convo.messages()[2].content.contains("no SQL found"));
    }

    #[tokio::test]
    async fn zero_budget_means_one_attempt() {
        let completion =
            MockCompletionClient::new().with_fallback_reply(fixtures::sql_reply("DELETE FROM t"));
        let db = MockDatabase::new();
        let outcome = engine(&completion, &db, 0)
            .answer("q", &["games"])
            .await
            .unwrap();
        assert_eq!(completion.call_count(), 1);
        assert!(!outcome.is_answered());
    }

    #[tokio::test]
    async fn supplied_conversation_is_used_as_is() {
        let completion = MockCompletionClient::new().with_reply(fixtures::sql_reply("SELECT 1"));
        let db = MockDatabase::new().with_result(fixtures::games_result_set());
        let mut convo = Conversation::from(vec![
            Message::system("custom system"),
            Message::user("earlier question"),
        ]);

        engine(&completion, &db, 3)
            .answer_in("ignored question", &["games"], &mut convo)
            .await
            .unwrap();

        let sent = &completion.transcripts()[0];
        assert_eq!(sent.len(), 2);
        assert!(sent
            .messages()
            .iter()
            .all(|m| !m.content.contains("ignored question")));
    }

    #[tokio::test]
    async fn seeded_conversation_has_few_shot_then_instruction() {
        let completion = MockCompletionClient::new().with_reply(fixtures::sql_reply("SELECT 1"));
        let db = MockDatabase::new().with_result(fixtures::games_result_set());
        let few = StaticFewShot::new().with_messages(
            DEFAULT_FEW_SHOT_MODE,
            vec![
                Message::user("How many teams?"),
                Message::assistant(fixtures::sql_reply("SELECT count(*) FROM teams")),
            ],
        );
        let engine = TextToSql::builder(completion.clone(), db)
            .schema_provider(fixtures::schema_provider())
            .few_shot(few)
            .build();

        engine.answer("Top scorer?", &["games", "teams"]).await.unwrap();

        let sent = &completion.transcripts()[0];
        assert_eq!(sent.len(), 3);
        let instruction = &sent.messages()[2];
        assert_eq!(instruction.role, MessageRole::User);
        assert!(instruction.content.contains("question/command: Top scorer?"));
        assert!(instruction.content.contains("games(id INTEGER"));
        assert!(instruction.content.contains("teams(id INTEGER, name TEXT, city TEXT)"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_any_call() {
        let completion = MockCompletionClient::new();
        let db = MockDatabase::new();
        let err = engine(&completion, &db, 3)
            .answer("   ", &["games"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref v) if v.field.as_deref() == Some("query")));
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn schema_failure_is_fatal() {
        let completion = MockCompletionClient::new();
        let db = MockDatabase::new();
        let err = engine(&completion, &db, 3)
            .answer("q", &["no_such_table"])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::UnknownTable(ref t)) if t == "no_such_table"
        ));
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_schema_provider_is_config_error() {
        let completion = MockCompletionClient::new();
        let engine = TextToSql::builder(completion.clone(), MockDatabase::new()).build();
        let err = engine.answer("q", &["games"]).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn attempt_metrics_are_reported() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let completion = MockCompletionClient::new()
            .with_reply(fixtures::sql_reply("DROP TABLE games"))
            .with_reply(fixtures::sql_reply("SELECT 1"));
        let db = MockDatabase::new().with_result(fixtures::games_result_set());
        let engine = TextToSql::builder(completion, db)
            .schema_provider(fixtures::schema_provider())
            .metrics(MetricsCallbacks::default().with_attempt(move |m: AttemptMetrics| {
                sink.lock().unwrap().push((m.attempt, m.outcome))
            }))
            .build();

        engine.answer("q", &["games"]).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, "not_read_only"), (2, "success")]
        );
    }

    #[tokio::test]
    async fn featured_query_skips_generation() {
        let completion = MockCompletionClient::new();
        let db = MockDatabase::new().with_result(fixtures::games_result_set());
        let engine = TextToSql::builder(completion.clone(), db.clone())
            .schema_provider(fixtures::schema_provider())
            .featured_queries(
                StaticFeaturedQueries::new()
                    .with_query("Home scores?", "SELECT home_team, home_score FROM games"),
            )
            .build();
        let mut convo = Conversation::new();

        let outcome = engine
            .answer_in("Home scores?", &["games"], &mut convo)
            .await
            .unwrap();

        assert_eq!(completion.call_count(), 0);
        assert!(convo.is_empty());
        assert!(outcome.failures().is_empty());
        assert_eq!(
            outcome.into_parts().1.as_deref(),
            Some("SELECT home_team, home_score FROM games")
        );
    }

    #[tokio::test]
    async fn failing_featured_query_falls_back_to_generation() {
        let completion = MockCompletionClient::new().with_reply(fixtures::sql_reply("SELECT 1"));
        let db = MockDatabase::new()
            .with_error("no such table: old_games")
            .with_result(fixtures::games_result_set());
        let engine = TextToSql::builder(completion.clone(), db.clone())
            .schema_provider(fixtures::schema_provider())
            .featured_queries(StaticFeaturedQueries::new().with_query("q", "SELECT * FROM old_games"))
            .build();

        let outcome = engine.answer("q", &["games"]).await.unwrap();
        assert!(outcome.is_answered());
        assert!(outcome.failures().is_empty());
        assert_eq!(completion.call_count(), 1);
        assert_eq!(db.queries(), vec!["SELECT * FROM old_games", "SELECT 1"]);

        // Stored SQL still goes through the guard.
        let completion = MockCompletionClient::new().with_reply(fixtures::sql_reply("SELECT 1"));
        let db = MockDatabase::new().with_result(fixtures::games_result_set());
        let engine = TextToSql::builder(completion.clone(), db.clone())
            .schema_provider(fixtures::schema_provider())
            .featured_queries(StaticFeaturedQueries::new().with_query("rejected", "DROP TABLE games"))
            .build();
        engine.answer("rejected", &["games"]).await.unwrap();
        assert_eq!(db.queries(), vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn featured_query_ignored_for_continued_conversation() {
        let completion = MockCompletionClient::new().with_reply(fixtures::sql_reply("SELECT 2"));
        let db = MockDatabase::new().with_result(fixtures::games_result_set());
        let engine = TextToSql::builder(completion.clone(), db.clone())
            .schema_provider(fixtures::schema_provider())
            .featured_queries(StaticFeaturedQueries::new().with_query("q", "SELECT 1"))
            .build();
        let mut convo = Conversation::from(vec![Message::user("earlier")]);

        engine.answer_in("q", &["games"], &mut convo).await.unwrap();
        assert_eq!(completion.call_count(), 1);
        assert_eq!(db.queries(), vec!["SELECT 2"]);
    }

    #[test]
    fn options_normalize_budget() {
        assert_eq!(TextToSqlOptions::default().effective_max_attempts(), 3);
        assert_eq!(
            TextToSqlOptions::default()
                .with_max_attempts(0)
                .effective_max_attempts(),
            1
        );
        assert_eq!(TextToSqlOptions::default().model, Model::Gpt4oMini);
    }
}
