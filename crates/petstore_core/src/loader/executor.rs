//! Background worker pool for loader queries.

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of named worker threads fed by one queue.
///
/// Workers exit once every clone of the executor is dropped and the queue is
/// drained. A single worker is enough for correct loader behavior.
#[derive(Clone)]
pub struct BackgroundExecutor {
    sender: Sender<Job>,
    workers: usize,
}

impl BackgroundExecutor {
    /// Spawns `workers` threads (at least one).
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let workers = workers.max(1);
        let (sender, receiver) = unbounded::<Job>();
        for index in 0..workers {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("petstore-loader-{index}"))
                .spawn(move || worker_loop(index, receiver))?;
        }
        debug!("event=executor_start module=loader status=ok workers={workers}");
        Ok(Self { sender, workers })
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Queues `job`; returns `false` if no worker can receive it.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(Box::new(job)).is_ok()
    }
}

fn worker_loop(index: usize, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("event=executor_job module=loader status=error worker={index} error_code=job_panicked");
        }
    }
    debug!("event=executor_stop module=loader status=ok worker={index}");
}

#[cfg(test)]
mod tests {
    use super::BackgroundExecutor;
    use std::time::Duration;

    #[test]
    fn runs_jobs_off_the_calling_thread() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let (tx, rx) = crossbeam::channel::bounded(1);
        let caller = std::thread::current().id();

        assert!(executor.execute(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn worker_survives_panicking_job() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let (tx, rx) = crossbeam::channel::bounded(1);

        executor.execute(|| panic!("boom"));
        executor.execute(move || tx.send(7).unwrap());

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }
}
