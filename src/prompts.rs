//! Prompt templates for generation and correction turns.

/// Placeholder for the user's question in the text-to-SQL template.
pub const QUERY_PLACEHOLDER: &str = "natural_language_query";
/// Placeholder for the schema description in the text-to-SQL template.
pub const SCHEMAS_PLACEHOLDER: &str = "schemas_str";
/// Placeholder for the failure description in the correction template.
pub const ERROR_PLACEHOLDER: &str = "error_message";

pub const DEFAULT_TEXT_TO_SQL_TEMPLATE: &str = "\
Generate syntactically correct read-only SQL to answer the following question/command: {natural_language_query}
The following are schemas of tables you can query:
---------------------
{schemas_str}
---------------------

Instructions:

Walk through the following information in your response:
    -- Paraphrase what the query should result in
    -- A quick list of the types of information that will be in the response (1 line)
    -- A list of the table.columns that will be relevant to both the input and the output (1 line)
    -- Note any uniqueness/null/other things to account for in the plan based on any tables/columns being used (e.g. MAX or DISTINCT required)
    -- A plan for how to get that information from the schema above (up to 3 lines). You can use any of the tables/columns above and only the tables/columns above.

    ```
    The SQL query in MARKDOWN format, including readable names where possible.
    ```

Notes:
> All tables and columns must be present in the above schema.
> Include any tables needed to do the human-readable conversions relevant to the query.
> Make sure to write your answer in markdown format. Before the markdown provide a plan for what query to run.
> Each column must include the table name (e.g. table.column) to avoid ambiguity.
> Include nothing after the markdown.
> Warning: Some values may be null so watch out for those. Also make sure to always sort with NULLS LAST.
> Use CTE if joins are needed, but keep it simple if possible.
";

pub const DEFAULT_ERROR_CORRECTION_TEMPLATE: &str = "
The SQL query you just generated resulted in the following error message:
---------------------
{error_message}
---------------------

Provide an explanation of what went wrong, how to fix it, and the sql in the following format:
```
-- <explanation of what went wrong>
<SQL>
```
";

/// Templates used to build the initial request and each correction turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub text_to_sql: String,
    pub error_correction: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            text_to_sql: DEFAULT_TEXT_TO_SQL_TEMPLATE.to_string(),
            error_correction: DEFAULT_ERROR_CORRECTION_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn with_text_to_sql(mut self, template: impl Into<String>) -> Self {
        self.text_to_sql = template.into();
        self
    }

    pub fn with_error_correction(mut self, template: impl Into<String>) -> Self {
        self.error_correction = template.into();
        self
    }

    pub fn render_text_to_sql(&self, natural_language_query: &str, schemas_str: &str) -> String {
        render(
            &self.text_to_sql,
            &[
                (QUERY_PLACEHOLDER, natural_language_query),
                (SCHEMAS_PLACEHOLDER, schemas_str),
            ],
        )
    }

    pub fn render_error_correction(&self, error_message: &str) -> String {
        render(&self.error_correction, &[(ERROR_PLACEHOLDER, error_message)])
    }
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Substituted values are never rescanned, so braces inside a driver error
/// message or a question stay literal. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let replaced = tail.find('}').and_then(|close| {
            let name = &tail[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match replaced {
            Some((close, value)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
