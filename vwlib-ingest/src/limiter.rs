//! Bounded admission gate for outbound work
//!
//! Caps the number of concurrently running network requests and probe
//! subprocesses. One limiter instance is shared across every category of
//! outbound work so the aggregate, not just each category, stays bounded.

use std::sync::Arc;
use tokio::sync::Semaphore;

/// FIFO admission gate over a fair semaphore
///
/// Cloning is cheap and shares the permit pool. A queued task holds no
/// permit while waiting and always eventually runs; there is no priority
/// and no cancellation of queued tasks.
#[derive(Clone)]
pub struct TaskLimiter {
    permits: Arc<Semaphore>,
}

impl TaskLimiter {
    /// Create a limiter admitting at most `max_concurrency` tasks at once
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Run `fut` once a permit is available, releasing it afterwards
    pub async fn run<F>(&self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        // The semaphore is never closed while a limiter clone is alive
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("limiter semaphore closed");
        fut.await
    }
}

impl std::fmt::Debug for TaskLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLimiter")
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn caps_in_flight_tasks() {
        const WIDTH: usize = 3;
        const TASKS: usize = 20;

        let limiter = TaskLimiter::new(WIDTH);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let limiter = limiter.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(async {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= WIDTH);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_width_is_clamped_to_one() {
        let limiter = TaskLimiter::new(0);
        let value = limiter.run(async { 42 }).await;
        assert_eq!(value, 42);
    }
}
