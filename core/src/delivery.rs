//! Where completion callbacks run.
//!
//! A callback-style request finishes on whatever thread the transport used.
//! Before the caller's closure runs, the result is handed to a
//! `CompletionQueue`, which decides the thread: `Inline` runs it right there,
//! `MainQueue` parks it until the thread owning the matching `MainLoop`
//! drains it (the usual arrangement for UI code).

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// A unit of completion work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait CompletionQueue: Send + Sync {
    fn submit(&self, job: Job);
}

/// Runs each job immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inline;

impl CompletionQueue for Inline {
    fn submit(&self, job: Job) {
        job();
    }
}

/// Sending half of a main-thread style queue.
#[derive(Debug, Clone)]
pub struct MainQueue {
    tx: Sender<Job>,
}

/// Receiving half; owned by the thread that should run completions.
#[derive(Debug)]
pub struct MainLoop {
    rx: Receiver<Job>,
}

impl MainQueue {
    pub fn new() -> (MainQueue, MainLoop) {
        let (tx, rx) = mpsc::channel();
        (MainQueue { tx }, MainLoop { rx })
    }
}

impl CompletionQueue for MainQueue {
    fn submit(&self, job: Job) {
        // A dropped loop means nobody is left to observe the completion.
        if self.tx.send(job).is_err() {
            tracing::trace!("main loop gone, completion discarded");
        }
    }
}

impl MainLoop {
    /// Run every job queued so far without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Block until `count` jobs have run or `timeout` elapses. Returns how
    /// many ran.
    pub fn run_until(&self, count: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        while ran < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        ran
    }
}
