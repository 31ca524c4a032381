// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Embedded text metadata and prompt derivation
//!
//! Generators embed their prompt in one of two shapes: a structured
//! `parameters` block (one setting per line) or a raw `prompt` field.
//! [`extract`] reads every text field from the file and normalises both
//! shapes into a single `Prompt` entry.

pub mod chunks;

use serde::ser::{Serialize, Serializer};
use std::path::Path;
use tracing::{debug, warn};

use crate::Result;

/// Key holding the derived prompt
pub const PROMPT_KEY: &str = "Prompt";

/// Structured generator settings block
pub const PARAMETERS_KEY: &str = "parameters";

/// Raw prompt field
pub const RAW_PROMPT_KEY: &str = "prompt";

/// Free-form image description
pub const DESCRIPTION_KEY: &str = "description";

/// Ordered string-to-string metadata extracted from one file.
///
/// Keys keep their original case and insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataMap {
    entries: Vec<(String, String)>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by exact key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert a value, replacing any existing value for the key in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert a value only when the key is not already present.
    ///
    /// Returns `true` if the value was inserted.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for MetadataMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Read a file's metadata, failing if it cannot be opened or decoded.
pub fn try_extract(path: &Path) -> Result<MetadataMap> {
    let mut map = chunks::read_text_metadata(path)?;
    derive_prompt(&mut map);
    debug!("Extracted {} metadata field(s) from {:?}", map.len(), path);
    Ok(map)
}

/// Read a file's metadata. Failures are logged and yield an empty map.
pub fn extract(path: &Path) -> MetadataMap {
    match try_extract(path) {
        Ok(map) => map,
        Err(e) => {
            warn!("Cannot open {:?}: {}", path, e);
            MetadataMap::new()
        }
    }
}

/// Fill in `Prompt` from `parameters` or `prompt` unless it is already set
pub fn derive_prompt(map: &mut MetadataMap) {
    if map.contains_key(PROMPT_KEY) {
        return;
    }
    let derived = if let Some(params) = map.get(PARAMETERS_KEY) {
        parse_prompt_from_parameters(params)
    } else if let Some(raw) = map.get(RAW_PROMPT_KEY) {
        raw.to_string()
    } else {
        return;
    };
    map.insert(PROMPT_KEY, derived);
}

/// Pull the prompt out of a `parameters` block.
///
/// The first line starting with `prompt:` (any case, surrounding
/// whitespace ignored) wins; otherwise the first line of the block.
pub fn parse_prompt_from_parameters(block: &str) -> String {
    if block.is_empty() {
        return String::new();
    }
    for line in block.lines() {
        let line = line.trim();
        if line.get(..7).is_some_and(|head| head.eq_ignore_ascii_case("prompt:")) {
            return line[7..].trim().to_string();
        }
    }
    block.lines().next().unwrap_or("").trim().to_string()
}

/// Text the keywords are matched against: `Prompt`, then `prompt`, then
/// `description`, skipping empty values.
pub fn prompt_text(map: &MetadataMap) -> &str {
    [PROMPT_KEY, RAW_PROMPT_KEY, DESCRIPTION_KEY]
        .iter()
        .filter_map(|key| map.get(key))
        .find(|value| !value.is_empty())
        .unwrap_or("")
}
