// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! promptsort: keyword-driven PNG sorter
//!
//! Reads the prompt text that image generators embed in PNG metadata,
//! matches it against a keyword list and copies or moves each image into
//! a folder named after the keyword(s) it matched.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod matcher;
pub mod metadata;
pub mod runner;
pub mod watcher;

pub use config::AppConfig;
pub use dispatch::{ActionMode, DispatchPair, MultiMatchMode, Operation};
pub use error::{Result, SortError};
pub use runner::{RunEvent, RunOutcome, SortRequest, SortRunner, SortSummary};
