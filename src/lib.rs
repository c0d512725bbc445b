//! Natural-language questions to read-only SQL.
//!
//! [`TextToSql`] asks a chat-completion model for a query, extracts the SQL
//! from its markdown reply, rejects anything that could mutate data, runs the
//! rest against a database and shapes the rows. Failures are fed back to the
//! model as correction turns until the attempt budget runs out.
#![cfg_attr(docsrs, feature(doc_cfg))]
// Allow large error types - boxing every variant buys nothing for callers here
#![allow(clippy::result_large_err)]

/// Default completion API base URL (OpenAI-compatible).
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default User-Agent header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str = concat!("sqlrelay-rust/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// HTTP header carrying the provider's request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Environment variable read by [`Config::from_env`].
pub const API_KEY_ENV: &str = "SQLRELAY_API_KEY";

/// Checked when [`API_KEY_ENV`] is unset.
pub const FALLBACK_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Optional base URL override read by [`Config::from_env`].
pub const BASE_URL_ENV: &str = "SQLRELAY_BASE_URL";

mod completion;
mod errors;
mod executor;
mod extract;
mod guard;
mod orchestrator;
pub mod prompts;
mod results;
mod schema;
mod telemetry;
mod types;

#[cfg(feature = "client")]
mod client;
#[cfg(feature = "client")]
mod http;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod db;

#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "blocking")]
mod blocking;

pub use completion::{sync_completion, CompletionClient, SyncCompletion};
#[cfg(feature = "client")]
pub use errors::TransportError;
pub use errors::{
    APIError, AttemptFailure, CompletionError, Error, ExecuteError, ExecutionError, FieldError,
    NoSqlFound, NotReadOnlyError, Result, SchemaError, TransportErrorKind, ValidationError,
};
pub use executor::{Database, QueryExecutor};
pub use extract::{MarkdownSqlExtractor, SqlExtractor};
pub use guard::{is_read_only, ReadOnlyGuard, DENYLIST};
pub use orchestrator::{
    AttemptOutcome, AttemptRecord, TextToSql, TextToSqlBuilder, TextToSqlOptions,
    TextToSqlOutcome, DEFAULT_MAX_ATTEMPTS,
};
pub use prompts::PromptTemplates;
pub use results::{ExecutionResult, Record, ResultSet, SqlValue};
pub use schema::{
    ColumnInfo, DatabaseSchemaProvider, FeaturedQueries, FewShotProvider, NoFewShot, SchemaProvider,
    StaticFeaturedQueries, StaticFewShot, StaticSchemaProvider, TableDescription, TableIntrospector,
    DEFAULT_FEW_SHOT_MODE,
};
pub use telemetry::{AttemptMetrics, CompletionContext, CompletionMetrics, MetricsCallbacks};
pub use types::{BoxFuture, Conversation, Message, MessageRole, Model};

#[cfg(feature = "client")]
pub use client::{ChatClient, Config};
#[cfg(feature = "client")]
pub use http::{HeaderEntry, HeaderList};

#[cfg(feature = "postgres")]
pub use db::PostgresDatabase;
#[cfg(feature = "sqlite")]
pub use db::SqliteDatabase;

#[cfg(feature = "mock")]
pub use mock::{fixtures, MockCompletionClient, MockDatabase};

#[cfg(feature = "blocking")]
pub use blocking::BlockingTextToSql;
