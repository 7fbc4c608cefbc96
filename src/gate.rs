//! Admission gate
//!
//! Bounds how many API calls may be in flight at once. Each engine owns its
//! own gate, so independent runs (and tests) get independent limits.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default number of concurrent in-flight requests
pub const SEMAPHORE_LIMIT: usize = 10;

/// Counting gate over a tokio semaphore
#[derive(Clone, Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// A capacity of zero would never admit anything, so it is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `operation` while holding a slot.
    ///
    /// The permit is dropped when this future completes, whether the
    /// operation succeeded or failed, and also if the future is dropped early.
    pub async fn run<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.semaphore.acquire().await.map_err(|_| Error::GateClosed)?;
        operation.await
    }

    /// Refuse every later admission. Operations already admitted finish normally.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(SEMAPHORE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_admits_more_than_capacity() {
        let gate = AdmissionGate::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..20).map(|_| {
            let gate = gate.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                gate.run(async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }
        });

        let results = futures::future::join_all(tasks).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test]
    async fn test_slot_released_on_failure() {
        let gate = AdmissionGate::new(1);

        let result: Result<()> = gate.run(async { Err(Error::validation("boom")) }).await;
        assert!(result.is_err());
        assert_eq!(gate.available(), 1);

        let ok = gate.run(async { Ok(5) }).await.unwrap();
        assert_eq!(ok, 5);
    }

    #[tokio::test]
    async fn test_closed_gate_is_fatal() {
        let gate = AdmissionGate::new(2);
        gate.close();

        let err = gate.run(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, Error::GateClosed));
        assert!(err.is_fatal());
        assert_eq!(gate.available(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(AdmissionGate::new(0).capacity(), 1);
        assert_eq!(AdmissionGate::default().capacity(), SEMAPHORE_LIMIT);
    }
}
