//! Query Validation for Read-Only Scalar Reads
//!
//! Every configured query passes through [`validate_query`] before it can
//! reach the database. The guard is lexical only: it never parses SQL, it
//! enforces a perimeter.
//!
//! # Validation Strategy
//! Three checks, run in a fixed order, first failure wins:
//! 1. Statement shape: starts with `SELECT`, has a `FROM`
//! 2. Forbidden commands: no denylisted verb as a whole word anywhere in the
//!    text (this also catches `SELECT ...; DROP ...` stacking)
//! 3. Single column: no comma at parenthesis depth zero in the select list
//!
//! # Known limitation
//! A `SELECT` that calls a function with side effects passes all three
//! checks. Use a read-only database role for the connection.

pub mod connection;

use crate::error::QueryError;

/// SQL verbs that are never allowed, matched as whole words
pub const FORBIDDEN_COMMANDS: &[&str] =
    &["insert", "update", "delete", "drop", "alter", "truncate", "create", "replace"];

const SELECT: &str = "select";
const FROM: &str = "from";

/// Validate that `query` is a single-column, read-only `SELECT`
///
/// # Returns
/// * `Ok(())` if the query may be executed
/// * `Err(QueryError)` naming the first check that failed
pub fn validate_query(query: &str) -> Result<(), QueryError> {
    let clean = query.trim_matches(is_space);
    // ASCII lowering keeps byte offsets aligned with `clean`
    let lower = clean.to_ascii_lowercase();

    check_statement_shape(&lower)?;
    check_forbidden_commands(&lower)?;
    check_single_column(clean)?;

    Ok(())
}

/// Starts with `select` and mentions `from` as a separate word
fn check_statement_shape(lower: &str) -> Result<(), QueryError> {
    if !lower.starts_with(SELECT) {
        return Err(QueryError::NotASelect);
    }

    if find_keyword(lower, SELECT.len(), FROM, false).is_none() {
        return Err(QueryError::MissingFromClause);
    }

    Ok(())
}

/// Reject any whole-word occurrence of a denylisted verb
fn check_forbidden_commands(lower: &str) -> Result<(), QueryError> {
    match words(lower).find(|word| FORBIDDEN_COMMANDS.contains(word)) {
        Some(keyword) => Err(QueryError::ForbiddenCommand {
            keyword: keyword.to_string(),
        }),
        None => Ok(()),
    }
}

/// Exactly one expression between `select` and the first top-level `from`
fn check_single_column(clean: &str) -> Result<(), QueryError> {
    let columns = column_list(clean).ok_or_else(|| QueryError::UnparsableColumnList {
        query: clean.to_string(),
    })?;

    let mut depth = 0usize;
    for ch in columns.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                return Err(QueryError::MultipleColumns {
                    columns: columns.to_string(),
                });
            }
            _ => {}
        }
    }

    Ok(())
}

/// Slice of `clean` holding the select list, without surrounding whitespace
///
/// `None` when `select` is not followed by whitespace, when no `from` sits at
/// parenthesis depth zero, or when the list is empty.
fn column_list(clean: &str) -> Option<&str> {
    let head = clean.get(..SELECT.len())?;
    if !head.eq_ignore_ascii_case(SELECT) {
        return None;
    }

    let rest = &clean[SELECT.len()..];
    if !rest.starts_with(is_space) {
        return None;
    }

    let end = find_keyword(clean, SELECT.len(), FROM, true)?;
    let columns = clean[SELECT.len()..end].trim_matches(is_space);
    (!columns.is_empty()).then_some(columns)
}

/// Byte offset of the first `keyword` at or after `start` that has ASCII
/// whitespace on both sides, compared ASCII case-insensitively.
///
/// With `top_level` set, occurrences inside parentheses are skipped.
fn find_keyword(text: &str, start: usize, keyword: &str, top_level: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut prev_ws = false;

    for (idx, ch) in text.char_indices() {
        if idx < start {
            prev_ws = is_space(ch);
            continue;
        }

        if prev_ws && (!top_level || depth == 0) {
            let end = idx + keyword.len();
            let matches = bytes
                .get(idx..end)
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(keyword.as_bytes()));
            if matches && text[end..].starts_with(is_space) {
                return Some(idx);
            }
        }

        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        prev_ws = is_space(ch);
    }

    None
}

/// Separator between keywords; Unicode spaces such as NBSP do not count
fn is_space(c: char) -> bool {
    c.is_ascii_whitespace()
}

/// Maximal runs of ASCII word characters (`[A-Za-z0-9_]`)
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}
