//! Bounded fire-and-forget work.
//!
//! Traffic publishing, fuzz rounds and ghost counters run detached from the
//! request that produced them. A semaphore caps how many may be in flight;
//! when the cap is reached new work is dropped instead of queued so a
//! traffic spike cannot grow memory without bound.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::observability::metrics;

#[derive(Clone)]
pub struct BackgroundTasks {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl BackgroundTasks {
    pub fn new(max_tasks: usize) -> Self {
        let capacity = max_tasks.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Spawn `work` if a slot is free. Returns false when the work was dropped.
    pub fn spawn<F>(&self, task: &'static str, work: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Bodies can be dropped after the runtime has gone away.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(task, capacity = self.capacity, "Background pool saturated, dropping work");
                metrics::record_background_dropped(task);
                return false;
            }
        };

        handle.spawn(async move {
            work.await;
            drop(permit);
        });
        true
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_saturated_pool_drops_work() {
        let tasks = BackgroundTasks::new(2);
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        for _ in 0..2 {
            let mut rx = release_rx.clone();
            assert!(tasks.spawn("test", async move {
                let _ = rx.wait_for(|released| *released).await;
            }));
        }
        assert_eq!(tasks.in_flight(), 2);
        assert!(!tasks.spawn("test", async {}));

        release_tx.send(true).unwrap();
        for _ in 0..100 {
            if tasks.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(tasks.in_flight(), 0);

        let (done_tx, done_rx) = oneshot::channel();
        assert!(tasks.spawn("test", async move {
            let _ = done_tx.send(());
        }));
        done_rx.await.unwrap();
    }
}
