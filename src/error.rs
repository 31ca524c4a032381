// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for promptsort

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for promptsort operations
pub type Result<T> = std::result::Result<T, SortError>;

/// promptsort error types
#[derive(Error, Debug)]
pub enum SortError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PNG decoding error: {0}")]
    Png(#[from] png::DecodingError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Invalid keyword: {0}")]
    InvalidKeyword(String),

    #[error("Not a PNG image: {}", .0.display())]
    NotPng(PathBuf),

    #[error("Sort failed: {0}")]
    RunFailed(String),
}
