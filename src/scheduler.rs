//! One-shot scheduled message.
//!
//! A single job slot, keyed by [`MESSAGE_JOB`], lives in the `scheduled_jobs`
//! table. Scheduling replaces whatever is pending in the slot. A timer thread
//! sleeps until the pending job is due, then claims it with a conditional
//! update before running it. A job replaced while the timer slept, or taken by
//! a scheduler in another process, is simply skipped.
//!
//! Job lifecycle: `pending` → `replaced`, or `pending` → `firing` → `fired` |
//! `permission_denied` | `failed`. Nothing is retried. A job left in `firing`
//! by a crash stays there rather than being shown twice.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

use crate::db::Database;
use crate::jobs;
use crate::model::{JobStatus, ScheduledJob};
use crate::notifications::{Notification, Notifier, PermissionCheck, MESSAGE_CHANNEL};
use crate::validate::validate_clock;
use crate::worker::Completion;

/// Logical key of the scheduled-message slot.
pub const MESSAGE_JOB: &str = "scheduled_message_work";

/// Title of every scheduled-message notification, and the body used when a
/// job carries no message.
pub const NOTIFICATION_TITLE: &str = "Scheduled Message";

/// Today at `hour:minute:00` in `now`'s time zone, or the same time tomorrow
/// if that has already passed.
///
/// Only same-day and next-day times can be expressed; anything further out
/// needs an explicit instant.
pub fn next_occurrence<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Tz>> {
    validate_clock(hour, minute)?;
    let tz = now.timezone();
    let naive = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .context("invalid time of day")?;
    let resolve = |naive: chrono::NaiveDateTime| {
        tz.from_local_datetime(&naive)
            .earliest()
            .with_context(|| format!("{naive} does not exist in the local time zone"))
    };
    let today = resolve(naive)?;
    if today >= *now {
        return Ok(today);
    }
    resolve(naive + chrono::Duration::days(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Scheduled { job_id: i64, fire_at: i64 },
    Replaced { job_id: i64 },
    Fired { job_id: i64, message: String },
    PermissionDenied { job_id: i64 },
    Failed { job_id: i64 },
}

enum Control {
    Schedule {
        message: String,
        fire_at: i64,
        reply: Sender<Result<i64>>,
    },
    Job {
        id: Option<i64>,
        reply: Sender<Result<Option<ScheduledJob>>>,
    },
    Rearm,
}

type Subscribers = Arc<Mutex<Vec<Sender<SchedulerEvent>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit(subscribers: &Subscribers, event: SchedulerEvent) {
    lock(subscribers).retain(|tx| tx.send(event.clone()).is_ok());
}

pub struct NotificationScheduler {
    tx: Option<Sender<Control>>,
    handle: Option<JoinHandle<()>>,
    subscribers: Subscribers,
}

impl NotificationScheduler {
    /// Start the timer thread. A job left pending by an earlier run is picked
    /// up immediately, and fires at once if it is already overdue.
    pub fn start<N, P>(db: &Database, notifier: N, permission: P) -> Result<Self>
    where
        N: Notifier,
        P: PermissionCheck,
    {
        let conn = db.connect()?;
        let (tx, rx) = mpsc::channel();
        let subscribers = Subscribers::default();
        let timer = Timer {
            conn,
            notifier: Box::new(notifier),
            permission: Box::new(permission),
            channel_ready: false,
            subscribers: Arc::clone(&subscribers),
        };
        let handle = thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || timer.run(rx))
            .context("failed to spawn scheduler")?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            subscribers,
        })
    }

    fn send<T>(&self, make: impl FnOnce(Sender<Result<T>>) -> Control) -> Completion<T> {
        let (reply, completion) = Completion::channel();
        if let Some(tx) = &self.tx {
            // A closed channel drops `reply`, which the completion reports.
            let _ = tx.send(make(reply));
        }
        completion
    }

    /// Queue `message` to be shown at `fire_at`, replacing any pending
    /// message. Resolves to the new job's id once it is stored.
    pub fn schedule<Tz: TimeZone>(&self, message: &str, fire_at: &DateTime<Tz>) -> Completion<i64> {
        let message = message.to_string();
        let fire_at = fire_at.timestamp_millis();
        self.send(|reply| Control::Schedule {
            message,
            fire_at,
            reply,
        })
    }

    /// The pending job, if any.
    pub fn pending(&self) -> Completion<Option<ScheduledJob>> {
        self.send(|reply| Control::Job { id: None, reply })
    }

    /// Any job by id, whatever its status.
    pub fn job(&self, id: i64) -> Completion<Option<ScheduledJob>> {
        self.send(|reply| Control::Job { id: Some(id), reply })
    }

    /// Re-read the slot, for when another process may have changed it.
    pub fn rearm(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Control::Rearm);
        }
    }

    pub fn subscribe(&self) -> Receiver<SchedulerEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }
}

impl Drop for NotificationScheduler {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("scheduler thread panicked");
            }
        }
    }
}

struct Timer {
    conn: Connection,
    notifier: Box<dyn Notifier>,
    permission: Box<dyn PermissionCheck>,
    channel_ready: bool,
    subscribers: Subscribers,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Timer {
    fn run(mut self, rx: Receiver<Control>) {
        // Last job handed to `fire`. If its outcome could not be recorded it
        // still reads as pending, and must not be run a second time.
        let mut last_fired = None;
        loop {
            let next = jobs::pending(&self.conn, MESSAGE_JOB).unwrap_or_else(|e| {
                tracing::error!("failed to read pending job: {e:#}");
                None
            });

            let control = match next {
                Some(job) if last_fired == Some(job.id) => {
                    rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                }
                Some(job) if job.fire_at <= now_millis() => {
                    self.fire(&job);
                    last_fired = Some(job.id);
                    continue;
                }
                Some(job) => {
                    let delay = Duration::from_millis((job.fire_at - now_millis()).max(0) as u64);
                    tracing::trace!(job_id = job.id, ?delay, "sleeping until job is due");
                    rx.recv_timeout(delay)
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match control {
                Ok(control) => self.handle(control),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("scheduler stopped");
    }

    fn handle(&mut self, control: Control) {
        match control {
            Control::Schedule {
                message,
                fire_at,
                reply,
            } => {
                let result = jobs::enqueue(&mut self.conn, MESSAGE_JOB, fire_at, &message);
                match &result {
                    Ok((job_id, replaced)) => {
                        for &old in replaced {
                            tracing::info!(job_id = old, "pending message replaced");
                            emit(&self.subscribers, SchedulerEvent::Replaced { job_id: old });
                        }
                        tracing::info!(job_id = *job_id, fire_at, "message scheduled");
                        emit(
                            &self.subscribers,
                            SchedulerEvent::Scheduled {
                                job_id: *job_id,
                                fire_at,
                            },
                        );
                    }
                    Err(e) => tracing::error!("failed to schedule message: {e:#}"),
                }
                let _ = reply.send(result.map(|(id, _)| id));
            }
            Control::Job { id, reply } => {
                let result = match id {
                    Some(id) => jobs::get_job(&self.conn, id),
                    None => jobs::pending(&self.conn, MESSAGE_JOB),
                };
                let _ = reply.send(result);
            }
            Control::Rearm => {}
        }
    }

    fn fire(&mut self, job: &ScheduledJob) {
        // Another writer may have replaced or claimed the job since it was read.
        match jobs::claim(&self.conn, job.id) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job_id = job.id, "job no longer pending, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = job.id, "failed to claim job: {e:#}");
                return;
            }
        }

        let outcome = self.deliver(job);
        self.conclude(job.id, outcome);
        let event = match outcome {
            JobStatus::Fired => SchedulerEvent::Fired {
                job_id: job.id,
                message: message_text(job),
            },
            JobStatus::PermissionDenied => SchedulerEvent::PermissionDenied { job_id: job.id },
            _ => SchedulerEvent::Failed { job_id: job.id },
        };
        emit(&self.subscribers, event);
    }

    fn deliver(&mut self, job: &ScheduledJob) -> JobStatus {
        if !self.channel_ready {
            if let Err(e) = self.notifier.create_channel(&MESSAGE_CHANNEL) {
                tracing::error!(job_id = job.id, "failed to create channel: {e:#}");
                return JobStatus::Failed;
            }
            self.channel_ready = true;
        }

        if !self.permission.notifications_allowed() {
            tracing::warn!(job_id = job.id, "notification permission denied");
            return JobStatus::PermissionDenied;
        }

        let notification = Notification {
            title: NOTIFICATION_TITLE.to_string(),
            body: message_text(job),
        };
        match self.notifier.post(&MESSAGE_CHANNEL, &notification) {
            Ok(()) => {
                tracing::info!(job_id = job.id, "scheduled message shown");
                JobStatus::Fired
            }
            Err(e) => {
                tracing::error!(job_id = job.id, "failed to show notification: {e:#}");
                JobStatus::Failed
            }
        }
    }

    fn conclude(&self, id: i64, status: JobStatus) {
        if let Err(e) = jobs::finish(&self.conn, id, status) {
            tracing::error!(job_id = id, %status, "failed to record job outcome: {e:#}");
        }
    }
}

fn message_text(job: &ScheduledJob) -> String {
    job.message
        .clone()
        .unwrap_or_else(|| NOTIFICATION_TITLE.to_string())
}
