// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Keyword matching against prompt text

use crate::{Result, SortError};

/// Keywords found in `text`, in the order they were supplied.
///
/// Matching is a case-insensitive substring test with no word boundaries,
/// so `cat` also matches `catgirl`.
pub fn match_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .filter(|kw| haystack.contains(&kw.to_lowercase()))
        .cloned()
        .collect()
}

/// Split a comma-separated keyword list, trimming entries and dropping empty ones
pub fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|kw| !kw.is_empty())
        .map(String::from)
        .collect()
}

/// Check that a name can be used as a single folder under the destination root
pub fn validate_keyword(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        "must not be empty"
    } else if name == "." || name == ".." {
        "must not be a relative path component"
    } else if name.contains(['/', '\\', '\0']) {
        "must not contain path separators"
    } else {
        return Ok(());
    };
    Err(SortError::InvalidKeyword(format!("{:?} {}", name, reason)))
}
