//! Shared utility functions used across multiple modules.

use chrono::{DateTime, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Timestamp for a mutation of a record last stamped at `previous`.
///
/// Never returns a value earlier than `previous`, so `updated_at` stays
/// non-decreasing when the wall clock steps backwards.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}
