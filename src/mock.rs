use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::{
    completion::CompletionClient,
    errors::{CompletionError, ExecutionError, SchemaError},
    executor::Database,
    results::ResultSet,
    schema::{TableDescription, TableIntrospector},
    types::{BoxFuture, Conversation, Message, Model},
};

/// In-memory completion service for offline tests.
///
/// Replies are served in the order they were queued. Once the queue is empty
/// the fallback reply (if any) is returned on every call.
#[derive(Clone, Default)]
pub struct MockCompletionClient {
    inner: Arc<MockCompletionInner>,
}

#[derive(Default)]
struct MockCompletionInner {
    replies: Mutex<VecDeque<Result<Message, CompletionError>>>,
    fallback: Mutex<Option<String>>,
    transcripts: Mutex<Vec<Conversation>>,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.push(Ok(Message::assistant(content)));
        self
    }

    pub fn with_error(self, err: CompletionError) -> Self {
        self.push(Err(err));
        self
    }

    /// Reply returned whenever the queue is empty.
    pub fn with_fallback_reply(self, content: impl Into<String>) -> Self {
        *self.inner.fallback.lock().expect("lock poisoned") = Some(content.into());
        self
    }

    fn push(&self, reply: Result<Message, CompletionError>) {
        self.inner
            .replies
            .lock()
            .expect("lock poisoned")
            .push_back(reply);
    }

    /// Number of completion requests served so far.
    pub fn call_count(&self) -> usize {
        self.inner.transcripts.lock().expect("lock poisoned").len()
    }

    /// Snapshot of the conversation sent with each request.
    pub fn transcripts(&self) -> Vec<Conversation> {
        self.inner.transcripts.lock().expect("lock poisoned").clone()
    }

    fn next_reply(&self, conversation: &Conversation) -> Result<Message, CompletionError> {
        self.inner
            .transcripts
            .lock()
            .expect("lock poisoned")
            .push(conversation.clone());
        if let Some(reply) = self.inner.replies.lock().expect("lock poisoned").pop_front() {
            return reply;
        }
        self.inner
            .fallback
            .lock()
            .expect("lock poisoned")
            .clone()
            .map(Message::assistant)
            .ok_or_else(|| CompletionError::Other("no mock completion queued".into()))
    }
}

impl CompletionClient for MockCompletionClient {
    fn complete<'a>(
        &'a self,
        _model: &'a Model,
        conversation: &'a Conversation,
    ) -> BoxFuture<'a, Result<Message, CompletionError>> {
        let reply = self.next_reply(conversation);
        Box::pin(async move { reply })
    }
}

/// In-memory database for offline tests.
///
/// Queued results are served in order; an empty queue yields an
/// [`ExecutionError`]. Every statement that reaches the database is recorded.
#[derive(Clone, Default)]
pub struct MockDatabase {
    inner: Arc<MockDatabaseInner>,
}

#[derive(Default)]
struct MockDatabaseInner {
    results: Mutex<VecDeque<Result<ResultSet, ExecutionError>>>,
    queries: Mutex<Vec<String>>,
    tables: Mutex<Vec<TableDescription>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, set: ResultSet) -> Self {
        self.inner
            .results
            .lock()
            .expect("lock poisoned")
            .push_back(Ok(set));
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.inner
            .results
            .lock()
            .expect("lock poisoned")
            .push_back(Err(ExecutionError::new(message)));
        self
    }

    pub fn with_table(self, table: TableDescription) -> Self {
        self.inner.tables.lock().expect("lock poisoned").push(table);
        self
    }

    /// Number of statements that reached the database.
    pub fn run_count(&self) -> usize {
        self.inner.queries.lock().expect("lock poisoned").len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.inner.queries.lock().expect("lock poisoned").clone()
    }

    fn next_result(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        self.inner
            .queries
            .lock()
            .expect("lock poisoned")
            .push(sql.to_string());
        self.inner
            .results
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(ExecutionError::new("no mock result queued")))
    }
}

impl Database for MockDatabase {
    fn run_read_only<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<ResultSet, ExecutionError>> {
        let result = self.next_result(sql);
        Box::pin(async move { result })
    }
}

impl TableIntrospector for MockDatabase {
    fn describe_tables<'a>(
        &'a self,
        tables: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<TableDescription>, SchemaError>> {
        let known = self.inner.tables.lock().expect("lock poisoned").clone();
        let out = tables
            .iter()
            .map(|name| {
                known
                    .iter()
                    .find(|t| &t.table == name)
                    .cloned()
                    .unwrap_or_else(|| TableDescription {
                        table: name.clone(),
                        columns: Vec::new(),
                    })
            })
            .collect();
        Box::pin(async move { Ok(out) })
    }
}

pub mod fixtures {
    use super::*;
    use crate::results::SqlValue;
    use crate::schema::{ColumnInfo, StaticSchemaProvider};

    /// Assistant reply in the plan-then-markdown shape the default prompt asks for.
    pub fn sql_reply(sql: &str) -> String {
        format!(
            "-- Paraphrase: answer the question from the games table\n\
             -- Plan: select the relevant columns\n\n\
             ```sql\n{sql}\n```"
        )
    }

    pub fn games_table() -> TableDescription {
        TableDescription {
            table: "games".into(),
            columns: vec![
                ColumnInfo {
                    name: "id".into(),
                    column_type: "INTEGER".into(),
                    nullable: Some(false),
                },
                ColumnInfo {
                    name: "home_team".into(),
                    column_type: "TEXT".into(),
                    nullable: Some(false),
                },
                ColumnInfo {
                    name: "home_score".into(),
                    column_type: "INTEGER".into(),
                    nullable: Some(true),
                },
            ],
        }
    }

    pub fn schema_provider() -> StaticSchemaProvider {
        StaticSchemaProvider::new()
            .with_table("games", games_table().render())
            .with_table("teams", "teams(id INTEGER, name TEXT, city TEXT)")
    }

    pub fn games_result_set() -> ResultSet {
        ResultSet {
            columns: vec!["home_team".into(), "home_score".into()],
            rows: vec![
                vec!["Lakers".into(), SqlValue::Int(112)],
                vec!["Celtics".into(), SqlValue::Null],
            ],
        }
    }
}
