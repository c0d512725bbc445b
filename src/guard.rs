//! Lexical read-only classification of SQL text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::NotReadOnlyError;

/// Statement keywords that mark a query as mutating.
pub const DENYLIST: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "DROP",
    "CREATE",
    "ALTER",
    "GRANT",
    "TRUNCATE",
    "LOCK TABLES",
    "UNLOCK TABLES",
];

static DENY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = DENYLIST
        .iter()
        .map(|kw| kw.replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
        .unwrap_or_else(|err| panic!("invalid denylist pattern: {err}"))
});

/// Keyword-denylist guard.
///
/// This is a heuristic: a denylisted word anywhere in the text rejects the
/// query, including inside string literals, quoted identifiers and comments.
/// Whole-word matching means `updated_at` does not trip `UPDATE`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOnlyGuard;

impl ReadOnlyGuard {
    pub fn new() -> Self {
        Self
    }

    /// Whether `sql` contains none of the denylisted keywords.
    pub fn is_read_only(&self, sql: &str) -> bool {
        !DENY_PATTERN.is_match(sql)
    }

    /// Like [`is_read_only`](Self::is_read_only) but names the first keyword found.
    pub fn check(&self, sql: &str) -> Result<(), NotReadOnlyError> {
        match DENY_PATTERN.find(sql) {
            None => Ok(()),
            Some(m) => Err(NotReadOnlyError {
                keyword: normalize_keyword(m.as_str()),
            }),
        }
    }
}

/// Free-function form of [`ReadOnlyGuard::is_read_only`].
pub fn is_read_only(sql: &str) -> bool {
    ReadOnlyGuard.is_read_only(sql)
}

fn normalize_keyword(matched: &str) -> String {
    matched
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
