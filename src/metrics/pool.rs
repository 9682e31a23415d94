//! Worker Pool
//!
//! A small thread-backed job pool: boxed closures travel down one shared
//! channel to a fixed set of worker threads, and every submission hands back
//! a typed handle on a one-shot result channel. The pool is single-use per
//! evaluation run; `shutdown` drains queued jobs, joins the workers, and is
//! idempotent so several metrics sharing the pool can each trigger teardown
//! safely.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::{Result, SpevalError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to one submitted computation.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the computation finishes.
    ///
    /// Fails with `WorkerLost` when the worker died (panicked) before it
    /// could deliver a result.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().map_err(|_| SpevalError::WorkerLost)
    }

    /// Handle that is already complete, used by the inline dispatcher.
    fn ready(value: T) -> Self {
        let (tx, rx) = mpsc::channel();
        // The receiver is held right here, send cannot fail.
        let _ = tx.send(value);
        Self { rx }
    }
}

/// Fixed set of worker threads consuming jobs from a shared channel.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn a pool with the given number of workers (at least one).
    pub fn new(n_workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..n_workers.max(1))
            .map(|_| {
                let rx = Arc::clone(&rx);
                thread::spawn(move || loop {
                    // Hold the lock only while receiving, not while running.
                    let job = { rx.lock().unwrap().recv() };
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Submit a computation, receiving a handle for its result.
    pub fn submit<T, F>(&self, f: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            // The caller may have dropped the handle; that is not an error.
            let _ = tx.send(f());
        });

        let guard = self.sender.lock().unwrap();
        let sender = guard.as_ref().ok_or(SpevalError::PoolClosed)?;
        sender.send(job).map_err(|_| SpevalError::PoolClosed)?;
        Ok(TaskHandle { rx })
    }

    /// Close the job channel, let workers drain what is queued, and join
    /// them. Safe to call more than once; later calls are no-ops.
    pub fn shutdown(&self) {
        let sender = self.sender.lock().unwrap().take();
        drop(sender);

        let workers: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Where metric computations run: the calling thread or a shared pool.
#[derive(Clone)]
pub enum Dispatcher {
    /// Run each job immediately on the calling thread.
    Inline,
    /// Offload jobs to a shared worker pool.
    Pool(Arc<WorkerPool>),
}

impl Dispatcher {
    /// Build a dispatcher from a configured worker count. Zero or negative
    /// selects the inline dispatcher.
    pub fn new(n_workers: i32) -> Self {
        if n_workers <= 0 {
            Dispatcher::Inline
        } else {
            Dispatcher::Pool(Arc::new(WorkerPool::new(n_workers as usize)))
        }
    }

    /// Submit a computation.
    pub fn submit<T, F>(&self, f: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match self {
            Dispatcher::Inline => Ok(TaskHandle::ready(f())),
            Dispatcher::Pool(pool) => pool.submit(f),
        }
    }

    /// Tear down the underlying pool, if any. Idempotent.
    pub fn shutdown(&self) {
        if let Dispatcher::Pool(pool) = self {
            pool.shutdown();
        }
    }
}
