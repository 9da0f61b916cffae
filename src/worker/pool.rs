//! Fixed-size worker pool
//!
//! Jobs travel over a crossbeam channel to a fixed set of threads. Each job
//! reports its outcome, panic included, through its own `TaskHandle`.
//! Shutdown closes the queue, lets queued jobs drain, and waits for the
//! workers up to a deadline.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Task result lost: worker exited before reporting")]
    ResultLost,

    #[error("Worker pool did not terminate within {0}ms")]
    ShutdownTimeout(u64),
}

/// Receives the result of one submitted job.
#[derive(Debug)]
pub struct TaskHandle<T> {
    result: Receiver<Result<T, PoolError>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the job finishes.
    pub fn join(self) -> Result<T, PoolError> {
        self.result.recv().map_err(|_| PoolError::ResultLost)?
    }

    /// Returns the result if the job has finished.
    pub fn try_join(&self) -> Option<Result<T, PoolError>> {
        self.result.try_recv().ok()
    }
}

pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    exited: Receiver<()>,
    size: usize,
}

impl WorkerPool {
    /// # Panics
    ///
    /// Panics if `threads` is zero or a worker thread cannot be spawned.
    pub fn new(name: &str, threads: usize) -> Self {
        assert!(threads > 0, "worker pool needs at least one thread");
        let (sender, receiver) = unbounded::<Job>();
        let (exited_tx, exited) = unbounded();

        let workers = (0..threads)
            .map(|index| {
                let receiver = receiver.clone();
                let exited_tx = exited_tx.clone();
                thread::Builder::new()
                    .name(format!("{}-{}", name, index))
                    .spawn(move || {
                        for job in receiver.iter() {
                            job();
                        }
                        let _ = exited_tx.send(());
                    })
                    .unwrap_or_else(|e| panic!("cannot spawn worker thread: {}", e))
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            exited,
            size: threads,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queues `task`. A panic inside the task is caught and reported through
    /// the handle.
    pub fn submit<F, T>(&self, description: &str, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result) = bounded(1);
        let description = description.to_string();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task)).map_err(|payload| {
                let reason = panic_message(payload.as_ref());
                log_event_with_fields(
                    Event::TaskFailed,
                    &[("task", &description), ("reason", &reason)],
                );
                PoolError::TaskPanicked(reason)
            });
            let _ = result_tx.send(outcome);
        });

        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).map_err(|_| PoolError::ShutDown)?,
            None => return Err(PoolError::ShutDown),
        }
        Ok(TaskHandle { result })
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stops accepting work and waits up to `timeout` for queued jobs and
    /// workers to finish. Calling it again after success is a no-op.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), PoolError> {
        drop(self.sender.lock().take());

        let mut workers = self.workers.lock();
        let deadline = Instant::now() + timeout;
        for _ in 0..workers.len() {
            match self.exited.recv_deadline(deadline) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    let millis = timeout.as_millis() as u64;
                    log_event_with_fields(
                        Event::PoolShutdownTimeout,
                        &[("timeout_ms", &millis.to_string())],
                    );
                    return Err(PoolError::ShutdownTimeout(millis));
                }
            }
        }
        for worker in workers.drain(..) {
            let _ = worker.join();
        }
        log_event_with_fields(Event::PoolShutdown, &[("threads", &self.size.to_string())]);
        Ok(())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_submit_and_join() {
        let pool = WorkerPool::new("test", 2);
        let handle = pool.submit("add", || 2 + 2).unwrap();
        assert_eq!(handle.join().unwrap(), 4);
        pool.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_panicking_task_is_reported() {
        let pool = WorkerPool::new("test", 1);
        let handle = pool.submit("boom", || -> u32 { panic!("boom") }).unwrap();
        assert_eq!(handle.join(), Err(PoolError::TaskPanicked("boom".into())));

        // the worker survives
        assert_eq!(pool.submit("after", || 1).unwrap().join().unwrap(), 1);
        pool.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let pool = WorkerPool::new("test", 2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit("count", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown(Duration::from_secs(5)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = WorkerPool::new("test", 1);
        pool.shutdown(Duration::from_secs(5)).unwrap();
        assert!(pool.is_shut_down());
        assert_eq!(pool.submit("late", || ()).unwrap_err(), PoolError::ShutDown);
    }

    #[test]
    fn test_shutdown_times_out_on_stuck_worker() {
        let pool = WorkerPool::new("test", 1);
        pool.submit("sleep", || thread::sleep(Duration::from_millis(500)))
            .unwrap();
        let result = pool.shutdown(Duration::from_millis(20));
        assert_eq!(result, Err(PoolError::ShutdownTimeout(20)));
    }
}
