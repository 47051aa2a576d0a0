//! CLI entry point for mica

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mica::builder::BuildMode;
use mica::{server, styles, watcher, Site};

#[derive(Parser)]
#[command(name = "mica")]
#[command(version)]
#[command(about = "A small local-first static site generator with live reload", long_about = None)]
struct Cli {
    /// Watch for changes and serve the site instead of building once
    #[arg(short, long)]
    serve: bool,

    /// Port for the development server
    #[arg(short, long)]
    port: Option<u16>,

    /// Set the base directory (defaults to current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        "mica=debug,info"
    } else {
        "mica=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let site = Site::new(&base_dir)?;

    if !cli.serve {
        // one-shot mode: fail fast on the first broken file
        let summary = site.build(BuildMode::OneShot)?;
        if let Err(e) = styles::run(&site) {
            tracing::warn!("{}", e);
        }
        println!(
            "Built {} pages ({} posts) into {}",
            summary.pages,
            summary.posts,
            site.out_dir.display()
        );
        return Ok(());
    }

    // serve mode: a failed initial build keeps the process alive and any
    // stale output in place; the next successful rebuild repairs it
    match site.build(BuildMode::Serve) {
        Ok(summary) => tracing::info!("initial build: {} pages", summary.pages),
        Err(e) => tracing::error!("initial build failed: {}", e),
    }
    if let Err(e) = styles::run(&site) {
        tracing::warn!("{}", e);
    }

    let (reload_tx, _) = broadcast::channel(16);
    let (signal_tx, signal_rx) = mpsc::channel(1);

    let roots = site.watch_roots();
    tokio::spawn(async move {
        if let Err(e) = watcher::watch(roots, signal_tx).await {
            tracing::error!("file watcher error: {}", e);
        }
    });
    tokio::spawn(watcher::rebuild_loop(
        site.clone(),
        signal_rx,
        reload_tx.clone(),
    ));

    let port = cli.port.unwrap_or(site.config.port);
    server::serve(&site, port, reload_tx).await
}
