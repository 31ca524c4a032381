// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! promptsort: keyword-driven PNG sorter
//!
//! Command line front end for the sorting engine.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use promptsort::config::{AppConfig, SortConfig};
use promptsort::matcher::{match_keywords, parse_keyword_list};
use promptsort::metadata::{self, prompt_text};
use promptsort::runner::{self, SortRunner, SortSummary};
use promptsort::watcher::{should_process, wait_for_stable, FileWatcher, WatchEvent};
use promptsort::{ActionMode, MultiMatchMode, Result, SortError};

/// promptsort CLI - sort PNG images by the prompt embedded in them
#[derive(Parser, Debug)]
#[command(name = "promptsort")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Sort generated PNG images into folders by prompt keywords", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "promptsort.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sort every PNG in the source directory once
    Sort(SortArgs),

    /// Keep sorting PNG files as they arrive in the source directory
    Watch {
        #[command(flatten)]
        sort: SortArgs,

        /// Sort files already in the source directory before watching
        #[arg(long)]
        process_existing: bool,
    },

    /// Show the metadata and prompt extracted from a PNG file
    Inspect {
        /// PNG file to inspect
        path: PathBuf,

        /// Also show which of these keywords match (comma-separated, repeatable)
        #[arg(short, long)]
        keywords: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Sorting options; each overrides the config file
#[derive(Args, Debug, Default)]
struct SortArgs {
    /// Directory containing the PNG files
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Destination root for the keyword folders
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Keywords in priority order (comma-separated, repeatable)
    #[arg(short, long)]
    keywords: Vec<String>,

    /// Copy or move the originals
    #[arg(short, long, value_enum)]
    action: Option<ActionMode>,

    /// Routing for files matching several keywords
    #[arg(short, long, value_enum)]
    multi: Option<MultiMatchMode>,

    /// Folder for files that match no keyword
    #[arg(long)]
    fallback_folder: Option<String>,
}

impl SortArgs {
    /// Overlay command line values on the configured ones
    fn apply(self, mut sort: SortConfig) -> SortConfig {
        if let Some(source) = self.source {
            sort.source_dir = Some(source.to_string_lossy().into_owned());
        }
        if let Some(dest) = self.dest {
            sort.dest_dir = Some(dest.to_string_lossy().into_owned());
        }
        if !self.keywords.is_empty() {
            sort.keywords = self.keywords.iter().flat_map(|k| parse_keyword_list(k)).collect();
        }
        if let Some(action) = self.action {
            sort.action = action;
        }
        if let Some(multi) = self.multi {
            sort.multi_match = multi;
        }
        if let Some(fallback) = self.fallback_folder {
            sort.fallback_folder = fallback;
        }
        sort
    }
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "promptsort.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Sort(args) => run_sort(config, args, &cli.format).await,
        Commands::Watch { sort, process_existing } => {
            run_watch(config, sort, process_existing).await
        }
        Commands::Inspect { path, keywords } => run_inspect(&path, &keywords, &cli.format),
        Commands::Config { action } => run_config_command(config, action),
    }
}

/// Run a single sort on a background worker, streaming its log
async fn run_sort(config: AppConfig, args: SortArgs, format: &str) -> Result<()> {
    let request = args.apply(config.sort).to_request()?;
    info!(
        "Sorting {:?} -> {:?} ({:?}, multi-match {:?})",
        request.source_dir(),
        request.dest_dir(),
        request.action(),
        request.multi_match()
    );

    let text = format == "text";
    let outcome = runner::spawn(request)
        .finish(|line| {
            if text {
                println!("{}", line);
            }
        })
        .await;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    if outcome.error {
        return Err(SortError::RunFailed(outcome.message));
    }
    if text {
        println!("{}", outcome.message);
    }
    Ok(())
}

/// Sort files as they land in the source directory until interrupted
async fn run_watch(config: AppConfig, args: SortArgs, process_existing: bool) -> Result<()> {
    let request = args.apply(config.sort).to_request()?;
    let runner = Arc::new(SortRunner::new(request));
    runner.check_source()?;
    runner.ensure_destination()?;

    let summary = Arc::new(Mutex::new(SortSummary::new()));

    let mut watcher = FileWatcher::new()?;
    watcher.watch(runner.request().source_dir())?;

    if process_existing {
        info!("Processing existing files...");
        for path in runner::list_candidates(runner.request().source_dir())? {
            sort_one(&runner, &summary, path).await;
        }
    }

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    info!("Sorter active. Press Ctrl+C to stop.");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match watcher.next_event(Duration::from_millis(100)) {
            Some(WatchEvent::FileArrived(path)) if should_process(&path) => {
                if !wait_for_stable(&path, Duration::from_secs(10)).await {
                    debug!("File disappeared during stability check: {:?}", path);
                    continue;
                }
                sort_one(&runner, &summary, path).await;
            }
            Some(WatchEvent::FileRemoved(path)) => debug!("Left source directory: {:?}", path),
            Some(WatchEvent::Error(e)) => warn!("Watch error: {}", e),
            _ => {}
        }
    }

    let summary = summary.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    for line in summary.report_lines() {
        println!("{}", line);
    }
    info!("promptsort stopped.");
    Ok(())
}

/// Sort one file on the blocking pool; files are handled one at a time
async fn sort_one(runner: &Arc<SortRunner>, summary: &Arc<Mutex<SortSummary>>, path: PathBuf) {
    let runner = Arc::clone(runner);
    let summary = Arc::clone(summary);
    let shown = path.clone();

    let result = tokio::task::spawn_blocking(move || {
        let mut summary = summary.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut sink = |line: &str| println!("{}", line);
        runner.process_file(&path, &mut summary, &mut sink)
    })
    .await;

    match result {
        Ok(outcome) if outcome.forced_fallback => {
            warn!("{:?} could not be classified and was copied to the fallback folder", shown);
        }
        Ok(outcome) => debug!("{:?} placed {} time(s)", shown, outcome.performed.len()),
        Err(e) => error!("Failed to process {:?}: {}", shown, e),
    }
}

/// Print what the extractor sees in one file
fn run_inspect(path: &Path, keywords: &[String], format: &str) -> Result<()> {
    let map = metadata::try_extract(path)?;
    let text = prompt_text(&map);
    let keywords: Vec<String> = keywords.iter().flat_map(|k| parse_keyword_list(k)).collect();
    let matched = match_keywords(text, &keywords);

    if format == "json" {
        let output = serde_json::json!({
            "path": path.to_string_lossy(),
            "metadata": map,
            "prompt_text": text,
            "matched": matched,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", path.display());
    if map.is_empty() {
        println!("  (no text metadata)");
    }
    for (key, value) in map.iter() {
        println!("  {}: {}", key, value.replace('\n', "\n    "));
    }
    println!("\nPrompt text: {}", text);
    if !keywords.is_empty() {
        if matched.is_empty() {
            println!("Matched: (none)");
        } else {
            println!("Matched: {}", matched.join(", "));
        }
    }
    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
    }

    Ok(())
}
