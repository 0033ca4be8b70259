//! Consumer-owned primary execution context.

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Mailbox of tasks that must run on the consumer's own thread.
///
/// The consumer drains it with [`PrimaryContext::run_pending`] or
/// [`PrimaryContext::run_next`]; loaders post result deliveries through a
/// [`PrimaryHandle`].
pub struct PrimaryContext {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

/// Cloneable posting side of a [`PrimaryContext`].
#[derive(Clone)]
pub struct PrimaryHandle {
    sender: Sender<Task>,
}

impl PrimaryHandle {
    /// Returns `false` when the owning context is gone.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(Box::new(task)).is_ok()
    }
}

impl Default for PrimaryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimaryContext {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn handle(&self) -> PrimaryHandle {
        PrimaryHandle {
            sender: self.sender.clone(),
        }
    }

    /// Runs every task queued right now; returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one task and runs it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Runs tasks until `done` holds or `timeout` elapses.
    ///
    /// Returns whether `done` became true.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return done();
            }
            self.run_next(remaining);
        }
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
