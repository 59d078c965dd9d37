//! Background storage worker.
//!
//! A worker owns one piece of storage state (a SQLite connection, the
//! preferences file) on a dedicated thread and runs submitted jobs against it
//! in submission order. Callers get a [`Completion`] back immediately and
//! decide for themselves whether to wait on it.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

pub struct Worker<S> {
    name: String,
    tx: Option<Sender<Job<S>>>,
    handle: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> Worker<S> {
    pub fn spawn(name: &str, mut state: S) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job<S>>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in rx {
                    job(&mut state);
                }
            })
            .with_context(|| format!("failed to spawn {name} worker"))?;
        Ok(Self {
            name: name.to_string(),
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue `f` to run on the worker thread.
    pub fn submit<T, F>(&self, f: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let (done_tx, done_rx) = mpsc::channel();
        let job: Job<S> = Box::new(move |state| {
            // Ignore send errors (caller dropped the completion)
            let _ = done_tx.send(f(state));
        });
        let sent = self.tx.as_ref().map(|tx| tx.send(job).is_ok()).unwrap_or(false);
        if !sent {
            return Completion::ready(Err(anyhow!("{} worker has stopped", self.name)));
        }
        Completion { rx: done_rx }
    }
}

impl<S> Drop for Worker<S> {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain queued jobs and exit.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = %self.name, "worker thread panicked");
            }
        }
    }
}

/// Result of a job submitted to a [`Worker`] or the scheduler.
#[must_use = "a completion carries the job's error, if any"]
pub struct Completion<T> {
    rx: Receiver<Result<T>>,
}

impl<T> Completion<T> {
    pub(crate) fn channel() -> (Sender<Result<T>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// A completion that has already finished.
    pub fn ready(result: Result<T>) -> Self {
        let (tx, completion) = Self::channel();
        let _ = tx.send(result);
        completion
    }

    /// Block until the job finishes.
    pub fn wait(self) -> Result<T> {
        self.rx
            .recv()
            .map_err(|_| anyhow!("job was dropped before completing"))?
    }

    /// Block for at most `timeout`. `None` means the job is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(anyhow!("job was dropped before completing")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn jobs_run_in_order_against_owned_state() {
        let worker = Worker::spawn("test", Vec::<u32>::new()).unwrap();
        let first = worker.submit(|v| {
            v.push(1);
            Ok(v.len())
        });
        let second = worker.submit(|v| {
            v.push(2);
            Ok(v.clone())
        });
        assert_eq!(first.wait().unwrap(), 1);
        assert_eq!(second.wait().unwrap(), vec![1, 2]);
    }

    #[test]
    fn job_errors_reach_the_completion() {
        let worker = Worker::spawn("test", ()).unwrap();
        let err = worker
            .submit(|_| -> Result<()> { bail!("disk full") })
            .wait()
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn drop_drains_queued_jobs() {
        let (tx, rx) = mpsc::channel();
        {
            let worker = Worker::spawn("test", tx).unwrap();
            for i in 0..3 {
                let _ = worker.submit(move |tx: &mut Sender<i32>| {
                    tx.send(i)?;
                    Ok(())
                });
            }
        }
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn ready_completion() {
        let done = Completion::ready(Ok(7));
        assert_eq!(done.wait_timeout(Duration::from_millis(10)).unwrap().unwrap(), 7);
    }
}
