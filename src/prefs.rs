//! Durable user preferences.
//!
//! Both settings live in one JSON document that is only ever replaced whole:
//! each update reads the current document, edits it and atomically renames a
//! fresh copy over the old one.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::RecommendedWatcher;

use crate::model::Preferences;
use crate::watch;
use crate::worker::{Completion, Worker};

struct PrefsFile {
    path: PathBuf,
}

impl PrefsFile {
    fn load(&self) -> Result<Preferences> {
        load_from(&self.path)
    }

    fn store(&self, prefs: &Preferences) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".prefs-")
            .tempfile_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, prefs)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

fn load_from(path: &Path) -> Result<Preferences> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Preferences::default()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

#[derive(Default)]
struct Shared {
    current: Mutex<Preferences>,
    subscribers: Mutex<Vec<Sender<Preferences>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn publish(&self, prefs: Preferences) {
        *lock(&self.current) = prefs.clone();
        lock(&self.subscribers).retain(|tx| tx.send(prefs.clone()).is_ok());
    }
}

pub struct PreferenceStore {
    path: PathBuf,
    shared: Arc<Shared>,
    worker: Worker<PrefsFile>,
}

impl PreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let initial = load_from(&path)?;
        let shared = Arc::new(Shared {
            current: Mutex::new(initial),
            subscribers: Mutex::default(),
        });
        let worker = Worker::spawn("prefs", PrefsFile { path: path.clone() })?;
        Ok(Self {
            path,
            shared,
            worker,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last known value, without subscribing.
    pub fn current(&self) -> Preferences {
        lock(&self.shared.current).clone()
    }

    /// A live view: the current value plus every later change, whether made
    /// through this store or by another process writing the same file.
    pub fn read(&self) -> Result<PreferencesView> {
        let (tx, rx) = mpsc::channel();
        lock(&self.shared.subscribers).push(tx.clone());

        let path = self.path.clone();
        let watcher = watch::watch_file_with(&self.path, move || match load_from(&path) {
            Ok(prefs) => {
                let _ = tx.send(prefs);
            }
            Err(e) => tracing::warn!("ignoring unreadable preferences: {e:#}"),
        })?;

        Ok(PreferencesView {
            current: self.current(),
            rx,
            _watcher: watcher,
        })
    }

    /// Set the user name and clear the first-time flag in one write.
    pub fn save_user_name(&self, name: &str) -> Completion<()> {
        let name = name.to_string();
        self.update(move |prefs| {
            prefs.user_name = name;
            prefs.is_first_time = false;
        })
    }

    /// Set the first-time flag. Setting it also erases the saved name.
    pub fn set_first_time(&self, is_first_time: bool) -> Completion<()> {
        self.update(move |prefs| {
            prefs.is_first_time = is_first_time;
            if is_first_time {
                prefs.user_name.clear();
            }
        })
    }

    fn update<F>(&self, edit: F) -> Completion<()>
    where
        F: FnOnce(&mut Preferences) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.worker.submit(move |file| {
            let mut prefs = file.load()?;
            edit(&mut prefs);
            file.store(&prefs)
                .inspect_err(|e| tracing::error!("failed to save preferences: {e:#}"))?;
            tracing::debug!(is_first_time = prefs.is_first_time, "saved preferences");
            shared.publish(prefs);
            Ok(())
        })
    }
}

/// Snapshot of the preferences that follows later changes.
pub struct PreferencesView {
    current: Preferences,
    rx: Receiver<Preferences>,
    _watcher: RecommendedWatcher,
}

impl PreferencesView {
    pub fn current(&self) -> &Preferences {
        &self.current
    }

    /// Apply any changes received so far. Returns true if the value changed.
    pub fn poll(&mut self) -> bool {
        let before = self.current.clone();
        for prefs in self.rx.try_iter() {
            self.current = prefs;
        }
        self.current != before
    }

    /// Wait up to `timeout` for the value to differ from the current one.
    pub fn wait_for_change(&mut self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(prefs) if prefs != self.current => {
                    self.current = prefs;
                    // Fold in anything queued behind it.
                    self.poll();
                    return true;
                }
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, PreferenceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::open(dir.path().join("prefs.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn defaults_when_file_missing() {
        let (_dir, store) = store();
        assert_eq!(store.current(), Preferences::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn save_user_name_clears_first_time() {
        let (_dir, store) = store();
        store.save_user_name("Ann").wait().unwrap();
        let expected = Preferences {
            is_first_time: false,
            user_name: "Ann".into(),
        };
        assert_eq!(store.current(), expected);

        let reopened = PreferenceStore::open(store.path()).unwrap();
        assert_eq!(reopened.current(), expected);
    }

    #[test]
    fn set_first_time_true_wipes_name() {
        let (_dir, store) = store();
        store.save_user_name("Ann").wait().unwrap();
        store.set_first_time(true).wait().unwrap();
        assert_eq!(store.current(), Preferences::default());
    }

    #[test]
    fn set_first_time_false_keeps_name() {
        let (_dir, store) = store();
        store.save_user_name("Ann").wait().unwrap();
        store.set_first_time(false).wait().unwrap();
        assert_eq!(store.current().user_name, "Ann");
    }

    #[test]
    fn view_follows_local_writes() {
        let (_dir, store) = store();
        let mut view = store.read().unwrap();
        assert!(view.current().is_first_time);

        store.save_user_name("Bo").wait().unwrap();
        assert!(view.wait_for_change(Duration::from_secs(5)));
        assert_eq!(view.current().user_name, "Bo");
        assert!(!view.current().is_first_time);
    }

    #[test]
    fn view_follows_other_writers() {
        let (_dir, store) = store();
        let mut view = store.read().unwrap();

        let other = PreferenceStore::open(store.path()).unwrap();
        other.save_user_name("Cy").wait().unwrap();

        assert!(view.wait_for_change(Duration::from_secs(5)));
        assert_eq!(view.current().user_name, "Cy");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(PreferenceStore::open(&path).is_err());
    }
}
