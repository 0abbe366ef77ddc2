use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use treewatch::config::{InitialEvents, Settings};
use treewatch::fs::FsPath;
use treewatch::logging;
use treewatch::watcher::{
    FileSystemEvent, PollingWatcher, Service, Subscribable, TokioScheduler, Watchable,
};

#[derive(Parser)]
#[command(name = "treewatch", version)]
#[command(about = "Report changes below directory trees by polling them")]
struct Cli {
    /// Directories to watch
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Milliseconds between two polls (overrides config)
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Settings file to use instead of .treewatch/settings.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report existing contents as created when watching starts
    #[arg(long)]
    synthesize: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow!("Configuration error: {e}"))?;

    logging::init_with_config(&settings.logging);

    // Override config with CLI args
    if let Some(ms) = cli.interval_ms {
        settings.watcher.poll_interval_ms = ms;
    }
    if cli.synthesize {
        settings.watcher.initial_events = InitialEvents::Synthesize;
    }

    let watcher = PollingWatcher::builder()
        .config(settings.watcher)
        .scheduler(TokioScheduler::current()?)
        .build()?;
    watcher.subscribe(Arc::new(|event: &FileSystemEvent| println!("{event}")));

    for path in &cli.paths {
        let root = FsPath::from_path(path.clone())?;
        watcher
            .watch(&root)
            .with_context(|| format!("Cannot watch {}", path.display()))?;
    }

    watcher.start()?;
    eprintln!(
        "Watching {} root(s) every {:?}. Press Ctrl-C to stop.",
        watcher.watched_roots().len(),
        watcher.poll_interval()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    watcher.stop();

    Ok(())
}
