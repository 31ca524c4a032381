// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sort runs over a source directory
//!
//! [`SortRunner::run`] processes every PNG in the source directory in
//! sequence and reports through a [`LogSink`]. [`spawn`] and
//! [`spawn_with_callbacks`] move the same loop onto a background worker so
//! the caller's event loop stays free; the caller then receives log lines
//! followed by exactly one terminal [`RunOutcome`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::fs;
use std::panic;
use std::path::{Path, PathBuf};
use std::thread;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatch::{execute_pair, resolve, ActionMode, DispatchPair, MultiMatchMode, Operation};
use crate::matcher::{match_keywords, validate_keyword};
use crate::metadata::{self, prompt_text, MetadataMap};
use crate::{Result, SortError};

/// File extension of the only container format that is sorted
pub const PNG_EXTENSION: &str = "png";

/// Default folder for files that match nothing
pub const DEFAULT_FALLBACK_FOLDER: &str = "no_match";

/// Append-only receiver of user-facing run log lines
pub trait LogSink {
    fn log(&mut self, line: &str);
}

impl<F: FnMut(&str)> LogSink for F {
    fn log(&mut self, line: &str) {
        self(line)
    }
}

/// Everything one sort run needs
#[derive(Debug, Clone)]
pub struct SortRequest {
    source_dir: PathBuf,
    keywords: Vec<String>,
    dest_dir: PathBuf,
    action: ActionMode,
    multi_match: MultiMatchMode,
    fallback_folder: String,
}

impl SortRequest {
    /// Create a request, rejecting keywords that are not usable as folder names.
    ///
    /// An empty keyword list is accepted and sends every file to the fallback folder.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        keywords: Vec<String>,
        dest_dir: impl Into<PathBuf>,
        action: ActionMode,
        multi_match: MultiMatchMode,
    ) -> Result<Self> {
        for kw in &keywords {
            validate_keyword(kw)?;
        }
        Ok(Self {
            source_dir: source_dir.into(),
            keywords,
            dest_dir: dest_dir.into(),
            action,
            multi_match,
            fallback_folder: DEFAULT_FALLBACK_FOLDER.to_string(),
        })
    }

    /// Use a different fallback folder name
    pub fn with_fallback_folder(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_keyword(&name)?;
        self.fallback_folder = name;
        Ok(self)
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn action(&self) -> ActionMode {
        self.action
    }

    pub fn multi_match(&self) -> MultiMatchMode {
        self.multi_match
    }

    pub fn fallback_folder(&self) -> &str {
        &self.fallback_folder
    }
}

/// Files placed in one destination folder
#[derive(Debug, Clone, Serialize)]
pub struct FolderTally {
    pub folder: String,
    pub count: usize,
    pub files: Vec<String>,
}

/// Per-folder placement counts for one run
#[derive(Debug, Clone, Serialize)]
pub struct SortSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub folders: Vec<FolderTally>,
    pub failures: usize,
}

impl SortSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            folders: Vec::new(),
            failures: 0,
        }
    }

    /// Record a successful placement; folders keep first-placement order
    pub fn record(&mut self, folder: &str, file_name: &str) {
        let tally = match self.folders.iter().position(|t| t.folder == folder) {
            Some(idx) => &mut self.folders[idx],
            None => {
                self.folders.push(FolderTally {
                    folder: folder.to_string(),
                    count: 0,
                    files: Vec::new(),
                });
                let last = self.folders.len() - 1;
                &mut self.folders[last]
            }
        };
        tally.count += 1;
        tally.files.push(file_name.to_string());
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Number of files placed in `folder`
    pub fn count(&self, folder: &str) -> usize {
        self.folders
            .iter()
            .find(|t| t.folder == folder)
            .map_or(0, |t| t.count)
    }

    pub fn total_placements(&self) -> usize {
        self.folders.iter().map(|t| t.count).sum()
    }

    fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Log lines for the end-of-run report
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![String::new(), "Summary:".to_string()];
        for tally in &self.folders {
            lines.push(format!("  {}: {} file(s)", tally.folder, tally.count));
        }
        if self.failures > 0 {
            lines.push(format!("  failed: {} placement(s)", self.failures));
        }
        lines
    }
}

impl Default for SortSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub error: bool,
    pub message: String,
    pub summary: Option<SortSummary>,
}

impl RunOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            summary: None,
        }
    }

    fn finished(message: impl Into<String>, summary: Option<SortSummary>) -> Self {
        Self {
            error: false,
            message: message.into(),
            summary,
        }
    }
}

/// Messages posted by a background run
#[derive(Debug, Clone)]
pub enum RunEvent {
    Log(String),
    Done(RunOutcome),
}

/// Placements actually performed for one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub file: PathBuf,
    pub matched: Vec<String>,
    pub performed: Vec<DispatchPair>,
    /// Set when classification failed and the file was copied to the fallback folder
    pub forced_fallback: bool,
}

/// Reads a file's metadata for classification
pub type Extractor = fn(&Path) -> Result<MetadataMap>;

/// Executes sort runs for one request
pub struct SortRunner {
    request: SortRequest,
    extractor: Extractor,
}

impl SortRunner {
    pub fn new(request: SortRequest) -> Self {
        Self {
            request,
            extractor: metadata::try_extract,
        }
    }

    /// Replace the metadata reader used to classify files
    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn request(&self) -> &SortRequest {
        &self.request
    }

    /// Sort every PNG in the source directory.
    ///
    /// Only a missing source directory (or an unusable destination root)
    /// fails the run; per-file problems are logged and the run continues.
    pub fn run(&self, sink: &mut dyn LogSink) -> RunOutcome {
        if let Err(e) = self.check_source() {
            sink.log(&format!("[ERROR] {}", e));
            return RunOutcome::failed(e.to_string());
        }

        if let Err(e) = self.ensure_destination() {
            let message = format!("Cannot create destination directory {}: {}", self.request.dest_dir.display(), e);
            sink.log(&format!("[ERROR] {}", message));
            return RunOutcome::failed(message);
        }

        let images = match list_candidates(&self.request.source_dir) {
            Ok(images) => images,
            Err(e) => {
                let message = format!("Cannot read source directory {}: {}", self.request.source_dir.display(), e);
                sink.log(&format!("[ERROR] {}", message));
                return RunOutcome::failed(message);
            }
        };

        if images.is_empty() {
            sink.log("No PNG images found in the selected folder.");
            return RunOutcome::finished("No PNG images found.", None);
        }

        info!("Sorting {} PNG file(s) from {:?}", images.len(), self.request.source_dir);

        let mut summary = SortSummary::new();
        for path in &images {
            self.process_file(path, &mut summary, sink);
        }
        summary.finish();

        for line in summary.report_lines() {
            sink.log(&line);
        }
        info!(
            "Sort complete: {} placement(s), {} failure(s)",
            summary.total_placements(),
            summary.failures
        );

        RunOutcome::finished("Sorting complete.", Some(summary))
    }

    /// Fail with [`SortError::SourceNotFound`] unless the source directory exists
    pub fn check_source(&self) -> Result<()> {
        if self.request.source_dir.is_dir() {
            Ok(())
        } else {
            Err(SortError::SourceNotFound(self.request.source_dir.clone()))
        }
    }

    /// Create the destination root if missing
    pub fn ensure_destination(&self) -> Result<()> {
        fs::create_dir_all(&self.request.dest_dir)?;
        Ok(())
    }

    /// Classify and place a single file
    pub fn process_file(
        &self,
        path: &Path,
        summary: &mut SortSummary,
        sink: &mut dyn LogSink,
    ) -> DispatchOutcome {
        let name = display_name(path);

        let matched = match self.classify(path, &name, sink) {
            Ok(matched) => matched,
            Err(reason) => {
                error!("Classification failed for {:?}: {}", path, reason);
                sink.log(&format!("ERROR extracting/matching for {}: {}", name, reason));
                let pairs = [DispatchPair::new(self.request.fallback_folder.as_str(), Operation::Copy)];
                let performed = self.place(path, &name, &pairs, summary, sink);
                return DispatchOutcome {
                    file: path.to_path_buf(),
                    matched: Vec::new(),
                    performed,
                    forced_fallback: true,
                };
            }
        };

        let pairs = resolve(
            &matched,
            self.request.action,
            self.request.multi_match,
            &self.request.fallback_folder,
        );
        let performed = self.place(path, &name, &pairs, summary, sink);
        if let Some(line) = self.describe(&matched, &performed, &name) {
            sink.log(&line);
        }

        DispatchOutcome {
            file: path.to_path_buf(),
            matched,
            performed,
            forced_fallback: false,
        }
    }

    /// Extract metadata and match keywords.
    ///
    /// Unreadable files yield no match; a panic is reported as `Err`.
    fn classify(&self, path: &Path, name: &str, sink: &mut dyn LogSink) -> std::result::Result<Vec<String>, String> {
        let extractor = self.extractor;
        let metadata = match panic::catch_unwind(|| extractor(path)) {
            Ok(Ok(map)) => map,
            Ok(Err(e)) => {
                warn!("Cannot open {:?}: {}", path, e);
                sink.log(&format!("[ERROR] Cannot open {}: {}", name, e));
                MetadataMap::new()
            }
            Err(payload) => return Err(panic_message(payload)),
        };

        let keywords = &self.request.keywords;
        let matched = panic::catch_unwind(|| match_keywords(prompt_text(&metadata), keywords))
            .map_err(panic_message)?;
        debug!("{:?} matched {:?}", path, matched);
        Ok(matched)
    }

    /// Execute pairs in order; failures are logged and counted, never fatal
    fn place(
        &self,
        path: &Path,
        name: &str,
        pairs: &[DispatchPair],
        summary: &mut SortSummary,
        sink: &mut dyn LogSink,
    ) -> Vec<DispatchPair> {
        let mut performed = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match execute_pair(path, &self.request.dest_dir, pair) {
                Ok(_) => {
                    summary.record(&pair.folder, name);
                    performed.push(pair.clone());
                }
                Err(e) => {
                    error!("Failed to {} {:?} to {}: {}", pair.operation, path, pair.folder, e);
                    sink.log(&format!(
                        "[ERROR] Failed to {} {} to {}: {}",
                        pair.operation, name, pair.folder, e
                    ));
                    summary.record_failure();
                }
            }
        }
        performed
    }

    /// One-line log entry naming the folders that actually received the file.
    ///
    /// `None` when every placement failed; those failures are logged already.
    fn describe(&self, matched: &[String], performed: &[DispatchPair], name: &str) -> Option<String> {
        if performed.is_empty() {
            return None;
        }
        let line = match (matched, self.request.multi_match) {
            ([], _) => format!("No match: {}", name),
            ([_, _, ..], MultiMatchMode::Skip) => format!("Multi-match skipped: {}", name),
            _ => {
                let folders: Vec<&str> = performed.iter().map(|p| p.folder.as_str()).collect();
                format!("{}: {}", folders.join(","), name)
            }
        };
        Some(line)
    }
}

/// Whether a path names a PNG file (extension compared case-insensitively)
pub fn is_png_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PNG_EXTENSION))
}

/// Immediate children of `dir` named `*.png`, in directory listing order
pub fn list_candidates(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_png_name(&path) {
            images.push(path);
        }
    }
    Ok(images)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected failure".to_string()
    }
}

/// Handle to a run executing on a background worker
pub struct SortHandle {
    events: mpsc::UnboundedReceiver<RunEvent>,
    worker: JoinHandle<()>,
}

impl SortHandle {
    /// Next log line or the terminal outcome; `None` once the run has ended
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Drain the run, forwarding log lines, and return its outcome
    pub async fn finish(mut self, mut on_log: impl FnMut(&str)) -> RunOutcome {
        while let Some(event) = self.events.recv().await {
            match event {
                RunEvent::Log(line) => on_log(&line),
                RunEvent::Done(outcome) => return outcome,
            }
        }
        let reason = match self.worker.await {
            Err(e) => e.to_string(),
            Ok(()) => "no outcome reported".to_string(),
        };
        RunOutcome::failed(format!("Sort worker stopped unexpectedly: {}", reason))
    }
}

/// Start a run on tokio's blocking pool. Must be called within a tokio runtime.
pub fn spawn(request: SortRequest) -> SortHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = tokio::task::spawn_blocking(move || {
        let runner = SortRunner::new(request);
        let mut sink = |line: &str| {
            let _ = tx.send(RunEvent::Log(line.to_string()));
        };
        let outcome = runner.run(&mut sink);
        let _ = tx.send(RunEvent::Done(outcome));
    });
    SortHandle { events: rx, worker }
}

/// Start a run on a dedicated thread, reporting through callbacks.
///
/// Both callbacks run on the worker thread; `on_done` is called exactly once.
pub fn spawn_with_callbacks<L, D>(
    request: SortRequest,
    mut on_log: L,
    on_done: D,
) -> std::io::Result<thread::JoinHandle<()>>
where
    L: FnMut(&str) + Send + 'static,
    D: FnOnce(bool, String) + Send + 'static,
{
    thread::Builder::new()
        .name("promptsort-worker".to_string())
        .spawn(move || {
            let outcome = SortRunner::new(request).run(&mut on_log);
            on_done(outcome.error, outcome.message);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::chunks::{write_test_png, write_truncated_test_png};
    use std::sync::mpsc as std_mpsc;
    use tempfile::tempdir;

    fn kws(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn request(src: &Path, dst: &Path, keywords: &[&str], action: ActionMode, multi: MultiMatchMode) -> SortRequest {
        SortRequest::new(src, kws(keywords), dst, action, multi).unwrap()
    }

    fn run_collecting(req: SortRequest) -> (RunOutcome, Vec<String>) {
        let mut lines = Vec::new();
        let outcome = SortRunner::new(req).run(&mut |line: &str| lines.push(line.to_string()));
        (outcome, lines)
    }

    fn prompt_png(dir: &Path, name: &str, prompt: &str) -> PathBuf {
        let path = dir.join(name);
        write_test_png(&path, &[("tEXt", "prompt", prompt)]);
        path
    }

    #[test]
    fn test_single_match_scenario() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        write_test_png(&src.join("a.png"), &[("tEXt", "parameters", "a cat sitting, parameters: ...")]);

        let (outcome, lines) = run_collecting(request(&src, &dst, &["cat", "dog"], ActionMode::Copy, MultiMatchMode::Duplicate));

        assert!(!outcome.error);
        assert_eq!(outcome.message, "Sorting complete.");
        assert!(lines.contains(&"cat: a.png".to_string()));
        assert!(dst.join("cat").join("a.png").exists());
        assert!(src.join("a.png").exists());
        assert!(!dst.join("no_match").exists());
        assert_eq!(outcome.summary.unwrap().count("cat"), 1);
    }

    #[test]
    fn test_missing_source_creates_nothing() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("missing");
        let dst = dir.path().join("dst");

        let (outcome, lines) = run_collecting(request(&src, &dst, &["cat"], ActionMode::Copy, MultiMatchMode::First));

        assert!(outcome.error);
        assert_eq!(outcome.message, format!("Source directory not found: {}", src.display()));
        assert_eq!(lines, vec![format!("[ERROR] Source directory not found: {}", src.display())]);
        assert!(!dst.exists());
    }

    #[test]
    fn test_no_png_files() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("notes.txt"), "cat").unwrap();
        fs::create_dir(src.join("folder.png")).unwrap();

        let (outcome, lines) = run_collecting(request(&src, &dst, &["cat"], ActionMode::Copy, MultiMatchMode::First));

        assert!(!outcome.error);
        assert_eq!(outcome.message, "No PNG images found.");
        assert_eq!(lines, vec!["No PNG images found in the selected folder.".to_string()]);
        assert!(dst.is_dir());
        assert_eq!(fs::read_dir(&dst).unwrap().count(), 0);
    }

    #[test]
    fn test_uppercase_extension_is_sorted_and_others_ignored() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        prompt_png(&src, "B.PNG", "a dog");
        fs::write(src.join("c.jpg"), "dog").unwrap();

        let (outcome, _) = run_collecting(request(&src, &dst, &["dog"], ActionMode::Copy, MultiMatchMode::First));

        let summary = outcome.summary.unwrap();
        assert_eq!(summary.total_placements(), 1);
        assert!(dst.join("dog").join("B.PNG").exists());
        assert!(!dst.join("dog").join("c.jpg").exists());
    }

    #[test]
    fn test_duplicate_move_copies_then_moves_last() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        prompt_png(&src, "x.png", "sky, sea and rock");

        let (outcome, lines) =
            run_collecting(request(&src, &dst, &["rock", "sea", "sky"], ActionMode::Move, MultiMatchMode::Duplicate));

        assert!(!src.join("x.png").exists());
        for folder in ["rock", "sea", "sky"] {
            assert!(dst.join(folder).join("x.png").exists(), "missing in {}", folder);
        }
        assert!(lines.contains(&"rock,sea,sky: x.png".to_string()));
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.total_placements(), 3);
        assert_eq!(summary.failures, 0);
    }

    #[test]
    fn test_first_mode_uses_keyword_order() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        prompt_png(&src, "x.png", "dog chasing a cat");

        let (_, lines) = run_collecting(request(&src, &dst, &["cat", "dog"], ActionMode::Move, MultiMatchMode::First));

        assert!(lines.contains(&"cat: x.png".to_string()));
        assert!(dst.join("cat").join("x.png").exists());
        assert!(!dst.join("dog").exists());
    }

    #[test]
    fn test_skip_mode_routes_ambiguous_to_fallback() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        prompt_png(&src, "x.png", "cat and dog");

        let req = request(&src, &dst, &["cat", "dog"], ActionMode::Copy, MultiMatchMode::Skip)
            .with_fallback_folder("unsorted")
            .unwrap();
        let (outcome, lines) = run_collecting(req);

        assert!(lines.contains(&"Multi-match skipped: x.png".to_string()));
        assert!(dst.join("unsorted").join("x.png").exists());
        assert_eq!(outcome.summary.unwrap().count("unsorted"), 1);
    }

    #[test]
    fn test_corrupt_file_is_moved_to_fallback() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("broken.png"), b"\x89PNG not really").unwrap();

        let (outcome, lines) = run_collecting(request(&src, &dst, &["cat"], ActionMode::Move, MultiMatchMode::First));

        assert!(!outcome.error);
        assert!(lines.iter().any(|l| l.starts_with("[ERROR] Cannot open broken.png")));
        assert!(lines.contains(&"No match: broken.png".to_string()));
        assert!(dst.join("no_match").join("broken.png").exists());
        assert!(!src.join("broken.png").exists());
    }

    #[test]
    fn test_placement_failure_is_logged_and_run_completes() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        // A plain file where the keyword folder should go
        fs::write(dst.join("cat"), "blocker").unwrap();
        prompt_png(&src, "a.png", "a cat");
        prompt_png(&src, "b.png", "a dog");

        let (outcome, lines) = run_collecting(request(&src, &dst, &["cat", "dog"], ActionMode::Move, MultiMatchMode::First));

        assert!(!outcome.error);
        assert_eq!(outcome.message, "Sorting complete.");
        assert!(lines.iter().any(|l| l.starts_with("[ERROR] Failed to move a.png to cat")));
        assert!(!lines.contains(&"cat: a.png".to_string()));
        assert!(lines.contains(&"dog: b.png".to_string()));
        assert!(src.join("a.png").exists());
        assert!(dst.join("dog").join("b.png").exists());
        let summary = outcome.summary.unwrap();
        assert_eq!(summary.failures, 1);
        assert!(lines.contains(&"  failed: 1 placement(s)".to_string()));
    }

    #[test]
    fn test_duplicate_line_lists_only_folders_that_received_the_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        fs::write(dst.join("cat"), "blocker").unwrap();
        prompt_png(&src, "a.png", "cat and dog");

        let (outcome, lines) =
            run_collecting(request(&src, &dst, &["cat", "dog"], ActionMode::Copy, MultiMatchMode::Duplicate));

        assert!(lines.contains(&"dog: a.png".to_string()));
        assert!(!lines.iter().any(|l| l == "cat,dog: a.png"));
        assert_eq!(outcome.summary.unwrap().failures, 1);
    }

    #[test]
    fn test_truncated_png_goes_to_fallback_with_configured_action() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        write_truncated_test_png(&src.join("t.png"), &[("tEXt", "parameters", "a cat")]);

        let (outcome, lines) = run_collecting(request(&src, &dst, &["cat"], ActionMode::Move, MultiMatchMode::First));

        assert!(!outcome.error);
        assert!(lines.iter().any(|l| l.starts_with("[ERROR] Cannot open t.png")));
        assert!(lines.contains(&"No match: t.png".to_string()));
        assert!(!lines.contains(&"cat: t.png".to_string()));
        assert!(dst.join("no_match").join("t.png").exists());
        assert!(!dst.join("cat").exists());
        assert!(!src.join("t.png").exists());
    }

    fn exploding_extractor(_: &Path) -> Result<MetadataMap> {
        panic!("decoder blew up")
    }

    fn failing_extractor(path: &Path) -> Result<MetadataMap> {
        Err(SortError::NotPng(path.to_path_buf()))
    }

    #[test]
    fn test_classification_failure_forces_copy_to_fallback() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        let path = prompt_png(&src, "a.png", "a cat");

        let runner = SortRunner::new(request(&src, &dst, &["cat"], ActionMode::Move, MultiMatchMode::First))
            .with_extractor(exploding_extractor);
        let mut summary = SortSummary::new();
        let mut lines = Vec::new();
        let outcome = runner.process_file(&path, &mut summary, &mut |line: &str| lines.push(line.to_string()));

        assert!(outcome.forced_fallback);
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.performed, vec![DispatchPair::new("no_match", Operation::Copy)]);
        assert!(path.exists());
        assert!(dst.join("no_match").join("a.png").exists());
        assert!(!dst.join("cat").exists());
        assert_eq!(lines, vec!["ERROR extracting/matching for a.png: decoder blew up".to_string()]);
        assert_eq!(summary.count("no_match"), 1);
    }

    #[test]
    fn test_extraction_error_uses_configured_action() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        let path = prompt_png(&src, "a.png", "a cat");

        let runner = SortRunner::new(request(&src, &dst, &["cat"], ActionMode::Move, MultiMatchMode::First))
            .with_extractor(failing_extractor);
        let mut summary = SortSummary::new();
        let outcome = runner.process_file(&path, &mut summary, &mut |_: &str| {});

        assert!(!outcome.forced_fallback);
        assert_eq!(outcome.performed, vec![DispatchPair::new("no_match", Operation::Move)]);
        assert!(!path.exists());
        assert!(dst.join("no_match").join("a.png").exists());
    }

    #[test]
    fn test_empty_keyword_list_routes_everything_to_fallback() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        prompt_png(&src, "a.png", "a cat");

        let (outcome, lines) = run_collecting(request(&src, &dst, &[], ActionMode::Copy, MultiMatchMode::First));

        assert!(lines.contains(&"No match: a.png".to_string()));
        assert_eq!(outcome.summary.unwrap().count("no_match"), 1);
    }

    #[test]
    fn test_copy_runs_are_repeatable() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        prompt_png(&src, "a.png", "a cat");
        prompt_png(&src, "b.png", "nothing");

        let req = request(&src, &dst, &["cat"], ActionMode::Copy, MultiMatchMode::Duplicate);
        let (first, _) = run_collecting(req.clone());
        let (second, _) = run_collecting(req);

        let first = first.summary.unwrap();
        let second = second.summary.unwrap();
        assert_eq!(first.count("cat"), second.count("cat"));
        assert_eq!(first.count("no_match"), second.count("no_match"));
        assert_eq!(fs::read_dir(dst.join("cat")).unwrap().count(), 1);
        assert_eq!(fs::read_dir(dst.join("no_match")).unwrap().count(), 1);
        assert!(src.join("a.png").exists());
    }

    #[test]
    fn test_summary_report_lines() {
        let mut summary = SortSummary::new();
        summary.record("dog", "1.png");
        summary.record("cat", "2.png");
        summary.record("dog", "3.png");

        assert_eq!(
            summary.report_lines(),
            vec![
                String::new(),
                "Summary:".to_string(),
                "  dog: 2 file(s)".to_string(),
                "  cat: 1 file(s)".to_string(),
            ]
        );
    }

    #[test]
    fn test_request_validation() {
        let ok = SortRequest::new("in", kws(&["cat"]), "out", ActionMode::Copy, MultiMatchMode::First);
        assert!(ok.is_ok());
        assert!(SortRequest::new("in", Vec::new(), "out", ActionMode::Copy, MultiMatchMode::First).is_ok());
        assert!(SortRequest::new("in", kws(&["../escape"]), "out", ActionMode::Copy, MultiMatchMode::First).is_err());
        assert!(ok.unwrap().with_fallback_folder("").is_err());
    }

    #[test]
    fn test_callbacks_report_done_once() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        prompt_png(&src, "a.png", "cat");

        let (tx, rx) = std_mpsc::channel();
        let log_tx = tx.clone();
        let handle = spawn_with_callbacks(
            request(&src, &dst, &["cat"], ActionMode::Copy, MultiMatchMode::First),
            move |line: &str| {
                let _ = log_tx.send(format!("log:{}", line));
            },
            move |error, message| {
                let _ = tx.send(format!("done:{}:{}", error, message));
            },
        )
        .unwrap();
        handle.join().unwrap();

        let events: Vec<String> = rx.try_iter().collect();
        let done: Vec<&String> = events.iter().filter(|e| e.starts_with("done:")).collect();
        assert_eq!(done, vec!["done:false:Sorting complete."]);
        assert_eq!(events.last().unwrap(), "done:false:Sorting complete.");
        assert!(events.contains(&"log:cat: a.png".to_string()));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "unexpected failure");
    }
}
