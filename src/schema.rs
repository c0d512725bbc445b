//! Schema-description and few-shot collaborators.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    errors::SchemaError,
    types::{BoxFuture, Message},
};

/// Few-shot mode used for the initial text-to-SQL request.
pub const DEFAULT_FEW_SHOT_MODE: &str = "text_to_sql";

/// Turns table identifiers into schema text for the generation prompt.
pub trait SchemaProvider: Send + Sync {
    fn describe<'a>(&'a self, tables: &'a [String]) -> BoxFuture<'a, Result<String, SchemaError>>;
}

/// Supplies example turns placed before the instruction message.
pub trait FewShotProvider: Send + Sync {
    fn few_shot_messages(&self, mode: &str) -> Vec<Message>;
}

// ============================================================================
// Introspection
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableDescription {
    /// One-line rendering: `table(col TYPE, col TYPE)`.
    pub fn render(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.column_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.table, cols)
    }
}

/// Backends that can list the columns of named tables.
pub trait TableIntrospector: Send + Sync {
    /// Describe `tables` in the given order. Tables that do not exist come
    /// back with no columns.
    fn describe_tables<'a>(
        &'a self,
        tables: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<TableDescription>, SchemaError>>;
}

// ============================================================================
// Schema providers
// ============================================================================

/// Fixed table-to-text map. Unknown tables are an error.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    tables: HashMap<String, String>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>, schema: impl Into<String>) -> Self {
        self.tables.insert(table.into(), schema.into());
        self
    }

    fn render(&self, tables: &[String]) -> Result<String, SchemaError> {
        let mut parts = Vec::with_capacity(tables.len());
        for table in tables {
            let schema = self
                .tables
                .get(table)
                .ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
            parts.push(schema.trim_end().to_string());
        }
        Ok(parts.join("\n"))
    }
}

impl SchemaProvider for StaticSchemaProvider {
    fn describe<'a>(&'a self, tables: &'a [String]) -> BoxFuture<'a, Result<String, SchemaError>> {
        let result = self.render(tables);
        Box::pin(async move { result })
    }
}

/// Schema text built by introspecting the database.
#[derive(Debug, Clone)]
pub struct DatabaseSchemaProvider<D> {
    introspector: D,
}

impl<D: TableIntrospector> DatabaseSchemaProvider<D> {
    pub fn new(introspector: D) -> Self {
        Self { introspector }
    }
}

impl<D: TableIntrospector> SchemaProvider for DatabaseSchemaProvider<D> {
    fn describe<'a>(&'a self, tables: &'a [String]) -> BoxFuture<'a, Result<String, SchemaError>> {
        Box::pin(async move {
            let descriptions = self.introspector.describe_tables(tables).await?;
            let mut lines = Vec::with_capacity(descriptions.len());
            for desc in descriptions {
                if desc.columns.is_empty() {
                    return Err(SchemaError::UnknownTable(desc.table));
                }
                lines.push(desc.render());
            }
            Ok(lines.join("\n"))
        })
    }
}

// ============================================================================
// Few-shot providers
// ============================================================================

/// Provides no examples.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFewShot;

impl FewShotProvider for NoFewShot {
    fn few_shot_messages(&self, _mode: &str) -> Vec<Message> {
        Vec::new()
    }
}

/// Examples keyed by mode.
#[derive(Debug, Clone, Default)]
pub struct StaticFewShot {
    modes: HashMap<String, Vec<Message>>,
}

impl StaticFewShot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(mut self, mode: impl Into<String>, messages: Vec<Message>) -> Self {
        self.modes.entry(mode.into()).or_default().extend(messages);
        self
    }
}

impl FewShotProvider for StaticFewShot {
    fn few_shot_messages(&self, mode: &str) -> Vec<Message> {
        self.modes.get(mode).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Featured queries
// ============================================================================

/// Curated SQL for known questions, tried before any generation.
pub trait FeaturedQueries: Send + Sync {
    /// Stored SQL for `query`, if this exact question is featured.
    fn featured_sql(&self, query: &str) -> Option<String>;
}

/// Exact-match question-to-SQL map. Surrounding whitespace is ignored.
#[derive(Debug, Clone, Default)]
pub struct StaticFeaturedQueries {
    queries: HashMap<String, String>,
}

impl StaticFeaturedQueries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, question: impl Into<String>, sql: impl Into<String>) -> Self {
        self.queries
            .insert(question.into().trim().to_string(), sql.into());
        self
    }
}

impl FeaturedQueries for StaticFeaturedQueries {
    fn featured_sql(&self, query: &str) -> Option<String> {
        self.queries.get(query.trim()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    struct FixedIntrospector(Vec<TableDescription>);

    impl TableIntrospector for FixedIntrospector {
        fn describe_tables<'a>(
            &'a self,
            tables: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<TableDescription>, SchemaError>> {
            let out = tables
                .iter()
                .map(|t| {
                    self.0
                        .iter()
                        .find(|d| &d.table == t)
                        .cloned()
                        .unwrap_or_else(|| TableDescription {
                            table: t.clone(),
                            columns: Vec::new(),
                        })
                })
                .collect();
            Box::pin(async move { Ok(out) })
        }
    }

    fn games() -> TableDescription {
        TableDescription {
            table: "games".into(),
            columns: vec![
                ColumnInfo {
                    name: "id".into(),
                    column_type: "INTEGER".into(),
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

    #[tokio::test]
    async fn static_provider_joins_in_request_order() {
        let provider = StaticSchemaProvider::new()
            .with_table("teams", "teams(id INT, name TEXT)\n")
            .with_table("games", "games(id INT)");
        let text = provider.describe(&tables(&["games", "teams"])).await.unwrap();
        assert_eq!(text, "games(id INT)\nteams(id INT, name TEXT)");
    }

    #[tokio::test]
    async fn static_provider_rejects_unknown_table() {
        let provider = StaticSchemaProvider::new();
        let err = provider.describe(&tables(&["nope"])).await.unwrap_err();
        assert_eq!(err, SchemaError::UnknownTable("nope".into()));
    }

    #[tokio::test]
    async fn database_provider_renders_columns() {
        let provider = DatabaseSchemaProvider::new(FixedIntrospector(vec![games()]));
        let text = provider.describe(&tables(&["games"])).await.unwrap();
        assert_eq!(text, "games(id INTEGER, home_score INTEGER)");
    }

    #[tokio::test]
    async fn database_provider_reports_missing_table() {
        let provider = DatabaseSchemaProvider::new(FixedIntrospector(vec![games()]));
        let err = provider
            .describe(&tables(&["games", "players"]))
            .await
            .unwrap_err();
        assert_eq!(err, SchemaError::UnknownTable("players".into()));
    }

    #[test]
    fn featured_queries_match_exactly() {
        let featured = StaticFeaturedQueries::new()
            .with_query(" Who won the most games? ", "SELECT 1");
        assert_eq!(
            featured.featured_sql("Who won the most games?").as_deref(),
            Some("SELECT 1")
        );
        assert_eq!(featured.featured_sql("who won the most games?"), None);
        assert_eq!(featured.featured_sql("Who won the most games"), None);
    }

    #[test]
    fn static_few_shot_by_mode() {
        let few = StaticFewShot::new().with_messages(
            DEFAULT_FEW_SHOT_MODE,
            vec![Message::user("q"), Message::assistant("```sql\nSELECT 1\n```")],
        );
        assert_eq!(few.few_shot_messages(DEFAULT_FEW_SHOT_MODE).len(), 2);
        assert!(few.few_shot_messages("rephrase").is_empty());
        assert!(NoFewShot.few_shot_messages(DEFAULT_FEW_SHOT_MODE).is_empty());
    }
}
