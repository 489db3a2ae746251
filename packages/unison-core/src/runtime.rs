//! Task spawning abstraction for runtime independence.
//!
//! This module provides a [`TaskSpawner`] trait that allows the API layer to
//! run session commands in the background without being tied to a specific
//! runtime. Spawned work stops when the spawner's shutdown token fires.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Abstraction for spawning background tasks.
///
/// Allows the WebSocket layer to hand off commands that may wait on a
/// download, so the socket keeps draining events meanwhile.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     spawner: TokioSpawner,
/// }
///
/// impl MyService {
///     fn start_background_work(&self) {
///         self.spawner.spawn(async {
///             // Background work here
///         });
///     }
/// }
/// ```
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    ///
    /// The task runs independently of the caller. The spawner does not
    /// provide a way to join the spawned task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner.
///
/// Every task is raced against a shutdown token, so cancelling the token
/// drops in-progress commands at their next suspension point.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
    shutdown: CancellationToken,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle, shutdown: CancellationToken) -> Self {
        Self { handle, shutdown }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current(shutdown: CancellationToken) -> Self {
        Self::new(tokio::runtime::Handle::current(), shutdown)
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::debug!("[Runtime] Background task cancelled by shutdown");
                }
                _ = future => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn tokio_spawner_executes_task() {
        let spawner = TokioSpawner::current(CancellationToken::new());
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        spawner.spawn(async move {
            executed_clone.store(true, Ordering::SeqCst);
        });

        // Give the task time to execute
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(executed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_stops_pending_tasks() {
        let token = CancellationToken::new();
        let spawner = TokioSpawner::current(token.clone());
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();

        spawner.spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            finished_clone.store(true, Ordering::SeqCst);
        });

        token.cancel();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!finished.load(Ordering::SeqCst));
    }
}
