//! Lifecycle management for the long-lived background tasks the retrieval
//! core owns: the indexer's processing worker and the pool's discovery
//! loop.
//!
//! Components receive a [`Shutdown`] future when spawned and are expected
//! to select against it; the owner fires the paired [`Signal`] and joins
//! the workers through a [`TaskSet`].

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod shutdown;

pub use shutdown::{signal, Shutdown, Signal};

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::error;

/// Tracks spawned background workers so they can be joined on shutdown.
#[derive(Debug, Default)]
pub struct TaskSet {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a named worker onto the current tokio runtime.
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push((name, tokio::spawn(fut)));
    }

    /// Number of tracked workers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no workers are tracked.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every tracked worker to finish.
    ///
    /// Workers are expected to exit once their shutdown signal fires; a
    /// panicked worker is logged and does not abort the join of the rest.
    pub async fn join_all(self) {
        for (name, handle) in self.handles {
            if let Err(err) = handle.await {
                error!(target: "tasks", task = name, %err, "background task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_waits_for_workers() {
        let (signal, shutdown) = signal();
        let mut tasks = TaskSet::new();
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));

        let task_flag = flag.clone();
        tasks.spawn("worker", async move {
            shutdown.await;
            task_flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        signal.fire();
        tasks.join_all().await;
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }
}
