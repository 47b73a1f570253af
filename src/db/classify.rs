//! Leading-keyword read/write classification of SQL text.
//!
//! Only the first keyword is inspected. Anything that is not a known
//! read-only statement counts as a write.

use std::sync::OnceLock;

use regex::Regex;

/// Statements that may be served by a replica.
pub const READ_KEYWORDS: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

fn for_update() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bFOR\s+UPDATE\b").expect("static pattern"))
}

/// True when `query` is a read a replica may answer.
///
/// Leading whitespace and opening parentheses are skipped. `SELECT … FOR
/// UPDATE` takes row locks and is a write.
pub fn is_read_query(query: &str) -> bool {
    let stripped = query.trim_start_matches(|c: char| c.is_whitespace() || c == '(');

    let keyword_len = stripped
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(stripped.len());
    let keyword = &stripped[..keyword_len];

    if keyword.eq_ignore_ascii_case("SELECT") {
        return !for_update().is_match(stripped);
    }

    READ_KEYWORDS
        .iter()
        .any(|read| read.eq_ignore_ascii_case(keyword))
}
