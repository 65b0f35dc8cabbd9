//! I/O worker pool
//!
//! Fixed set of threads draining a job channel. Prefetch completions and
//! bulk store packs run here, never on the caller's thread.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{AirError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker threads fed by a crossbeam channel
pub struct IoPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl IoPool {
    /// Spawn `threads` workers
    pub fn new(threads: usize) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("airtree-io-{}", id))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Run `job` on a worker without waiting for it
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| AirError::Backend("I/O pool is shut down".to_string()))?;
        sender
            .send(Box::new(job))
            .map_err(|_| AirError::Backend("I/O pool has no workers".to_string()))
    }

    /// Run `job` on a worker; its result arrives on the returned channel
    pub fn submit<T, F>(&self, job: F) -> Result<Receiver<Result<T>>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (done, result) = channel::bounded(1);
        self.execute(move || {
            let _ = done.send(job());
        })?;
        Ok(result)
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        // Closing the channel ends each worker's loop
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("I/O worker panicked");
            }
        }
    }
}
