//! Change watcher and serial rebuild loop
//!
//! The watcher forwards debounced filesystem events into a capacity-1
//! signal channel; the rebuild loop drains it one signal at a time. A full
//! channel means a build is already pending, so further events collapse
//! into it and builds never overlap.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode};
use tokio::sync::{broadcast, mpsc};

use crate::builder::BuildMode;
use crate::server::ReloadNotice;
use crate::{styles, Site};

/// Unit event: something under a watched root changed.
#[derive(Debug, Clone, Copy)]
pub struct RebuildSignal;

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Editor temp/swap files (anything with a `~` in the path) and VCS noise
/// never trigger a rebuild.
pub fn is_relevant(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    !path_str.contains('~') && !path_str.contains(".git") && !path_str.contains(".DS_Store")
}

/// Watch the given roots recursively and forward debounced change events as
/// rebuild signals. Returns cleanly when the underlying watch channel
/// closes; the site keeps serving, it just stops rebuilding.
pub async fn watch(roots: Vec<PathBuf>, signals: mpsc::Sender<RebuildSignal>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, tx)?;

    for root in &roots {
        if root.exists() {
            debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
            tracing::debug!("watching {:?}", root);
        }
    }

    tokio::task::spawn_blocking(move || {
        // the debouncer must stay alive for as long as events are consumed
        let _debouncer = debouncer;
        loop {
            if signals.is_closed() {
                break;
            }
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(Ok(events)) => {
                    let relevant: Vec<_> =
                        events.iter().filter(|e| is_relevant(&e.path)).collect();
                    if relevant.is_empty() {
                        continue;
                    }
                    for event in &relevant {
                        tracing::info!("file changed: {}", event.path.display());
                    }
                    // full channel: a rebuild is already pending and will
                    // pick this change up too
                    let _ = signals.try_send(RebuildSignal);
                }
                Ok(Err(e)) => {
                    tracing::error!("watch error: {:?}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    tracing::info!("watch channel closed, automatic rebuilds stopped");
                    break;
                }
            }
        }
    })
    .await?;
    Ok(())
}

/// Consume rebuild signals one at a time, run a full build per signal, and
/// broadcast a reload notice after each completed build. Builds are strictly
/// serial; a failed build sends no notice.
pub async fn rebuild_loop(
    site: Site,
    mut signals: mpsc::Receiver<RebuildSignal>,
    reload: broadcast::Sender<ReloadNotice>,
) {
    while signals.recv().await.is_some() {
        tracing::info!("change detected, rebuilding...");
        match site.build(BuildMode::Serve) {
            Ok(summary) => {
                if let Err(e) = styles::run(&site) {
                    tracing::warn!("{}", e);
                }
                tracing::info!("rebuilt {} pages", summary.pages);
                // receiver count is zero when no browser is connected
                let _ = reload.send(ReloadNotice);
            }
            Err(e) => {
                // stale output stays in place; better than a blank site
                tracing::error!("rebuild failed: {}", e);
            }
        }
    }
}
