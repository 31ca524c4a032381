// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for promptsort

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dispatch::{ActionMode, MultiMatchMode};
use crate::runner::SortRequest;
use crate::{Result, SortError};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Sorting defaults, overridable from the command line
    #[serde(default)]
    pub sort: SortConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SortConfig {
    /// Directory scanned for PNG files
    #[serde(default)]
    pub source_dir: Option<String>,

    /// Root under which keyword folders are created
    #[serde(default)]
    pub dest_dir: Option<String>,

    /// Keywords in priority order
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub action: ActionMode,

    #[serde(default)]
    pub multi_match: MultiMatchMode,

    /// Folder for files with no match
    #[serde(default = "default_fallback_folder")]
    pub fallback_folder: String,
}

fn default_fallback_folder() -> String { "no_match".to_string() }

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            dest_dir: None,
            keywords: Vec::new(),
            action: ActionMode::default(),
            multi_match: MultiMatchMode::default(),
            fallback_folder: default_fallback_folder(),
        }
    }
}

impl SortConfig {
    /// Build a validated request from these settings.
    ///
    /// Sorting without keywords would send everything to the fallback
    /// folder, so an empty list is refused here.
    pub fn to_request(&self) -> Result<SortRequest> {
        if self.keywords.is_empty() {
            return Err(SortError::Config("At least one keyword is required".to_string()));
        }
        let source = self
            .source_dir
            .as_deref()
            .ok_or_else(|| SortError::Config("No source directory given".to_string()))?;
        let dest = self
            .dest_dir
            .as_deref()
            .ok_or_else(|| SortError::Config("No destination directory given".to_string()))?;

        SortRequest::new(
            PathBuf::from(source),
            self.keywords.clone(),
            PathBuf::from(dest),
            self.action,
            self.multi_match,
        )?
        .with_fallback_folder(self.fallback_folder.clone())
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| SortError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load(Path::new("/no/such/promptsort.json")).unwrap();
        assert_eq!(config.sort.fallback_folder, "no_match");
        assert_eq!(config.sort.action, ActionMode::Copy);
        assert_eq!(config.sort.multi_match, MultiMatchMode::Duplicate);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("promptsort.json");
        std::fs::write(&path, r#"{"sort": {"keywords": ["cat"], "action": "move"}}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.sort.keywords, vec!["cat".to_string()]);
        assert_eq!(config.sort.action, ActionMode::Move);
        assert_eq!(config.sort.fallback_folder, "no_match");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("promptsort.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(SortError::Config(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("promptsort.json");
        let mut config = AppConfig::default();
        config.sort.multi_match = MultiMatchMode::Skip;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.sort.multi_match, MultiMatchMode::Skip);
    }

    #[test]
    fn test_to_request_needs_keywords() {
        let sort = SortConfig {
            source_dir: Some("in".to_string()),
            dest_dir: Some("out".to_string()),
            ..SortConfig::default()
        };
        assert!(matches!(sort.to_request(), Err(SortError::Config(_))));
    }

    #[test]
    fn test_to_request_needs_directories() {
        let mut sort = SortConfig {
            keywords: vec!["cat".to_string()],
            ..SortConfig::default()
        };
        assert!(sort.to_request().is_err());

        sort.source_dir = Some("in".to_string());
        sort.dest_dir = Some("out".to_string());
        let request = sort.to_request().unwrap();
        assert_eq!(request.fallback_folder(), "no_match");
    }
}
