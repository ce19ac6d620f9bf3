//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

/// Truncate text to at most `max_chars` characters, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
