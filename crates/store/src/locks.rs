//! Per-sample mutual exclusion for log appends and finalization.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created lock per `(subset, sample_id)`.
///
/// Entries are never removed; a run touches a bounded set of samples.
#[derive(Debug, Default, Clone)]
pub struct SampleLocks {
    inner: Arc<Mutex<HashMap<(String, String), Arc<Mutex<()>>>>>,
}

impl SampleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the sample's lock until the guard is dropped.
    pub async fn acquire(&self, subset: &str, sample_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry((subset.to_string(), sample_id.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_sample_is_exclusive() {
        let locks = SampleLocks::new();
        let guard = locks.acquire("ds", "s1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("ds", "s1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_samples_do_not_contend() {
        let locks = SampleLocks::new();
        let _a = locks.acquire("ds", "s1").await;

        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("ds", "s2")).await;
        assert!(b.is_ok());
    }
}
