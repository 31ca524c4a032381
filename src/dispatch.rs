// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Destination resolution and copy/move execution

use clap::ValueEnum;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Result, SortError};

/// What happens to the original file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    /// Leave the original in place
    #[default]
    Copy,
    /// Relocate the original
    Move,
}

/// How a file matching several keywords is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MultiMatchMode {
    /// Only the first matched keyword receives the file
    First,
    /// Every matched keyword receives the file
    #[default]
    Duplicate,
    /// Ambiguous files go to the fallback folder
    Skip,
}

/// A single physical placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Copy,
    Move,
}

impl From<ActionMode> for Operation {
    fn from(action: ActionMode) -> Self {
        match action {
            ActionMode::Copy => Operation::Copy,
            ActionMode::Move => Operation::Move,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Copy => write!(f, "copy"),
            Operation::Move => write!(f, "move"),
        }
    }
}

/// Destination folder (relative to the destination root) and the operation to perform there
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchPair {
    pub folder: String,
    pub operation: Operation,
}

impl DispatchPair {
    pub fn new(folder: impl Into<String>, operation: Operation) -> Self {
        Self {
            folder: folder.into(),
            operation,
        }
    }
}

/// Decide where a file goes.
///
/// Never returns an empty list and contains at most one `Move`, always last.
pub fn resolve(
    matched: &[String],
    action: ActionMode,
    multi: MultiMatchMode,
    fallback_folder: &str,
) -> Vec<DispatchPair> {
    let op = Operation::from(action);
    match (matched, multi) {
        ([], _) => vec![DispatchPair::new(fallback_folder, op)],
        ([only], _) => vec![DispatchPair::new(only.as_str(), op)],
        ([first, ..], MultiMatchMode::First) => vec![DispatchPair::new(first.as_str(), op)],
        ([..], MultiMatchMode::Skip) => vec![DispatchPair::new(fallback_folder, op)],
        ([rest @ .., last], MultiMatchMode::Duplicate) => {
            // Only the last folder may take the original
            let mut pairs: Vec<DispatchPair> = rest
                .iter()
                .map(|kw| DispatchPair::new(kw.as_str(), Operation::Copy))
                .collect();
            pairs.push(DispatchPair::new(last.as_str(), op));
            pairs
        }
    }
}

/// Place `source` according to `pair`, creating the folder if needed.
///
/// Returns the path the file now has under `dest_root`.
pub fn execute_pair(source: &Path, dest_root: &Path, pair: &DispatchPair) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| SortError::Config(format!("No file name in {:?}", source)))?;

    let target_dir = dest_root.join(&pair.folder);
    fs::create_dir_all(&target_dir)?;
    let target = target_dir.join(file_name);

    if is_same_file(source, &target) {
        return Err(SortError::FileSystem(io::Error::new(
            io::ErrorKind::InvalidInput,
            "source and target are the same file",
        )));
    }

    match pair.operation {
        Operation::Copy => copy_preserving_times(source, &target)?,
        Operation::Move => move_file(source, &target)?,
    }
    debug!("{} {:?} -> {:?}", pair.operation, source, target);

    Ok(target)
}

/// Copy a file, carrying over its access and modification times.
///
/// An existing target is overwritten.
pub fn copy_preserving_times(source: &Path, target: &Path) -> Result<()> {
    let meta = fs::metadata(source)?;
    fs::copy(source, target)?;
    filetime::set_file_times(
        target,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )?;
    Ok(())
}

/// Move a file, falling back to copy + remove across filesystems
pub fn move_file(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("Rename across devices, copying {:?} instead", source);
            copy_preserving_times(source, target)?;
            fs::remove_file(source)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(18) // EXDEV
}

#[cfg(windows)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(17) // ERROR_NOT_SAME_DEVICE
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}
