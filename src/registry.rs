//! In-memory view of the task table.
//!
//! The registry never edits its list in place: every mutation is forwarded to
//! the store on the storage worker and followed by a full re-read, and the
//! re-read list is what observers see.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;

use crate::db::Database;
use crate::model::{NewTask, Rating, Task};
use crate::store;
use crate::validate::validate_title;
use crate::worker::{Completion, Worker};

#[derive(Default)]
struct Shared {
    tasks: Mutex<Arc<Vec<Task>>>,
    subscribers: Mutex<Vec<(u64, Sender<Arc<Vec<Task>>>)>>,
    ratings: Mutex<HashMap<i64, Rating>>,
    next_subscriber: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn publish(&self, tasks: Vec<Task>) {
        let tasks = Arc::new(tasks);
        {
            let mut ratings = lock(&self.ratings);
            ratings.retain(|id, _| tasks.iter().any(|t| t.id == *id));
        }
        *lock(&self.tasks) = Arc::clone(&tasks);
        // Drop subscribers whose receiver is gone
        lock(&self.subscribers).retain(|(_, tx)| tx.send(Arc::clone(&tasks)).is_ok());
        tracing::debug!(count = tasks.len(), "published task list");
    }
}

/// Receives every list the registry publishes after subscribing.
pub struct Subscription {
    id: u64,
    rx: Receiver<Arc<Vec<Task>>>,
}

impl Subscription {
    /// Wait for the next published list.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<Vec<Task>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(tasks) => Some(tasks),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// The most recent list published since the last call, if any.
    pub fn latest(&self) -> Option<Arc<Vec<Task>>> {
        self.rx.try_iter().last()
    }
}

pub struct TaskRegistry {
    shared: Arc<Shared>,
    worker: Worker<Connection>,
}

impl TaskRegistry {
    /// Start the registry and kick off the initial load. The snapshot is empty
    /// until that load completes.
    pub fn open(db: &Database) -> Result<Self> {
        let conn = db.connect()?;
        let registry = Self {
            shared: Arc::new(Shared::default()),
            worker: Worker::spawn("task-store", conn)?,
        };
        // The initial load reports failures through the log; callers that care
        // can `refresh()` and wait.
        let _ = registry.reload();
        Ok(registry)
    }

    fn reload(&self) -> Completion<()> {
        let shared = Arc::clone(&self.shared);
        self.worker.submit(move |conn| {
            let tasks = store::list_tasks(conn).inspect_err(|e| {
                tracing::error!("failed to load tasks: {e:#}");
            })?;
            shared.publish(tasks);
            Ok(())
        })
    }

    /// Current list as last published.
    pub fn snapshot(&self) -> Arc<Vec<Task>> {
        Arc::clone(&lock(&self.shared.tasks))
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        lock(&self.shared.subscribers).push((id, tx));
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        lock(&self.shared.subscribers).retain(|(id, _)| *id != subscription.id);
    }

    /// Re-read the table and republish.
    pub fn refresh(&self) -> Completion<()> {
        self.reload()
    }

    /// Validate and insert `task`, then republish. A blank title fails with
    /// [`ValidationError::EmptyTitle`](crate::validate::ValidationError)
    /// without touching the store.
    pub fn insert(&self, task: NewTask) -> Completion<()> {
        if let Err(e) = validate_title(&task.title) {
            return Completion::ready(Err(e.into()));
        }
        let shared = Arc::clone(&self.shared);
        self.worker.submit(move |conn| {
            store::insert_task(conn, &task)
                .and_then(|()| store::list_tasks(conn))
                .map(|tasks| shared.publish(tasks))
                .inspect_err(|e| tracing::error!("failed to insert task: {e:#}"))
        })
    }

    /// Delete `task` by id, then republish. Deleting a task that is already
    /// gone succeeds.
    pub fn delete(&self, task: &Task) -> Completion<()> {
        self.delete_id(task.id)
    }

    pub fn delete_id(&self, id: i64) -> Completion<()> {
        let shared = Arc::clone(&self.shared);
        self.worker.submit(move |conn| {
            store::delete_task(conn, id)
                .and_then(|_| store::list_tasks(conn))
                .map(|tasks| shared.publish(tasks))
                .inspect_err(|e| tracing::error!(id, "failed to delete task: {e:#}"))
        })
    }

    /// Session-only rating; unrated tasks read as [`Rating::Good`].
    pub fn rating(&self, id: i64) -> Rating {
        lock(&self.shared.ratings).get(&id).copied().unwrap_or_default()
    }

    /// Rate a task currently in the snapshot. Returns false if it is not.
    pub fn rate(&self, id: i64, rating: Rating) -> bool {
        if !self.snapshot().iter().any(|t| t.id == id) {
            return false;
        }
        lock(&self.shared.ratings).insert(id, rating);
        true
    }
}
