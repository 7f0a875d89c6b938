use crate::types::CapturedError;
use chrono::{DateTime, Utc};

/// Maximum number of message characters kept in an issue title.
pub const TITLE_MESSAGE_LIMIT: usize = 80;

const ELLIPSIS: &str = "...";

/// Cut `s` to at most `limit` characters, trimming trailing whitespace and
/// appending `...` when anything was removed.
pub fn truncate(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}{}", s[..cut].trim_end(), ELLIPSIS),
    }
}

/// `[status] message`, message truncated to 80 characters.
pub fn issue_title(error: &CapturedError) -> String {
    format!(
        "[{}] {}",
        error.status_code,
        truncate(&error.message, TITLE_MESSAGE_LIMIT)
    )
}

/// Markdown body of a newly opened issue, including the full stack trace.
pub fn issue_body(error: &CapturedError, occurrence_count: u64) -> String {
    format!(
        "**Status:** {status}\n\n\
         **Error Message:** {message}\n\n\
         **Location:** {file} : {line}\n\n\
         **Occurrences:** {count}\n\n\
         **Stack Trace:**\n\
         ```\n\
         {trace}\n\
         ```",
        status = error.status_code,
        message = error.message,
        file = error.source_file,
        line = error.source_line,
        count = occurrence_count,
        trace = error.stack_trace,
    )
}

/// Comment posted for a repeat occurrence. Carries no stack trace.
pub fn occurrence_comment(occurrence_count: u64, observed_at: DateTime<Utc>) -> String {
    format!(
        "> This error has occurred **{}×** so far.\n\nTimestamp: {}",
        occurrence_count,
        observed_at.format("%Y-%m-%d %H:%M:%S")
    )
}
