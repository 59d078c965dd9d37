use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Calls `on_change` whenever the file at `path` (or a sibling whose name
/// starts with its name, such as SQLite's `-wal` and `-shm`) is modified.
/// The watcher must be kept alive for callbacks to run.
///
/// The parent directory is watched rather than the file itself, since both
/// SQLite and atomic file replacement write through other files.
pub fn watch_file_with<F>(path: &Path, on_change: F) -> Result<RecommendedWatcher>
where
    F: Fn() + Send + 'static,
{
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            // Reads by any process fire access events; they are not changes.
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            let relevant = event.paths.iter().any(|p| {
                p.file_name()
                    .map(|f| f.to_string_lossy().starts_with(&*file_name))
                    .unwrap_or(false)
            });
            if relevant {
                on_change();
            }
        }
    })
    .context("failed to create file watcher")?;

    let watch_path = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    watcher
        .watch(watch_path, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", watch_path.display()))?;

    Ok(watcher)
}

/// Channel flavour of [`watch_file_with`].
pub fn watch_file(path: &Path) -> Result<(RecommendedWatcher, Receiver<()>)> {
    let (tx, rx) = mpsc::channel();
    let watcher = watch_file_with(path, move || {
        // Ignore send errors (receiver dropped)
        let _ = tx.send(());
    })?;
    Ok((watcher, rx))
}

/// Waits for a change event with timeout.
/// Returns true if an event was received, false on timeout.
pub fn wait_for_change(rx: &Receiver<()>, timeout: Duration) -> bool {
    rx.recv_timeout(timeout).is_ok()
}

/// Drains any pending events from the receiver.
pub fn drain_events(rx: &Receiver<()>) {
    while rx.try_recv().is_ok() {}
}
