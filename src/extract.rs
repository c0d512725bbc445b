use crate::errors::NoSqlFound;

const FENCE: &str = "```";

/// Pulls a single SQL statement out of free-form assistant text.
pub trait SqlExtractor: Send + Sync {
    fn extract(&self, reply: &str) -> Result<String, NoSqlFound>;
}

/// Returns the contents of the first fenced code block.
///
/// Anything after the opening fence on the same line (an info string such as
/// `sql`) is skipped. A block that closes on its opening line only loses a
/// leading `sql` word. The block contents are trimmed; an unterminated fence
/// yields [`NoSqlFound`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownSqlExtractor;

impl SqlExtractor for MarkdownSqlExtractor {
    fn extract(&self, reply: &str) -> Result<String, NoSqlFound> {
        let open = reply.find(FENCE).ok_or(NoSqlFound)?;
        let after_open = &reply[open + FENCE.len()..];
        let first_line = after_open.find('\n').unwrap_or(after_open.len());
        if after_open[..first_line].contains(FENCE) {
            // Single-line block: ```SELECT 1``` or ```sql SELECT 1```
            let close = after_open.find(FENCE).ok_or(NoSqlFound)?;
            return Ok(strip_sql_tag(after_open[..close].trim()).to_string());
        }
        let body = after_open.get(first_line + 1..).unwrap_or("");
        let close = body.find(FENCE).ok_or(NoSqlFound)?;
        Ok(body[..close].trim().to_string())
    }
}

/// Drop a leading `sql` info word from a one-line block.
fn strip_sql_tag(block: &str) -> &str {
    match block.split_once(char::is_whitespace) {
        Some((tag, rest)) if tag.eq_ignore_ascii_case("sql") => rest.trim_start(),
        _ if block.eq_ignore_ascii_case("sql") => "",
        _ => block,
    }
}

impl<F> SqlExtractor for F
where
    F: Fn(&str) -> Result<String, NoSqlFound> + Send + Sync,
{
    fn extract(&self, reply: &str) -> Result<String, NoSqlFound> {
        self(reply)
    }
}
