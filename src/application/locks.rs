use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

fn registry(locks: &Registry) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One async mutex per root reference.
///
/// Every mutation of a ledger family (sync flows, webhook ingestion, queue drains) holds the
/// guard of its root reference, so two notifications for the same payment never interleave.
/// Different references proceed in parallel. A reference's entry is dropped once nobody holds
/// or waits for it.
#[derive(Default, Clone)]
pub struct ReferenceLocks {
    locks: Registry,
}

/// Held lock of one reference.
pub struct ReferenceGuard {
    guard: Option<OwnedMutexGuard<()>>,
    reference: String,
    locks: Registry,
}

impl Drop for ReferenceGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = registry(&self.locks);
        if locks
            .get(&self.reference)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.reference);
        }
    }
}

impl ReferenceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, reference: &str) -> ReferenceGuard {
        let lock = registry(&self.locks)
            .entry(reference.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        ReferenceGuard {
            guard: Some(lock.lock_owned().await),
            reference: reference.to_string(),
            locks: self.locks.clone(),
        }
    }

    /// Number of references currently locked or waited for.
    pub fn len(&self) -> usize {
        registry(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_reference_serializes() {
        let locks = ReferenceLocks::new();
        let guard = locks.acquire("REF1").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("REF1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_references_do_not_block() {
        let locks = ReferenceLocks::new();
        let _a = locks.acquire("REF1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("REF2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_references_are_forgotten() {
        let locks = ReferenceLocks::new();
        for i in 0..100 {
            let _guard = locks.acquire(&format!("REF{i}")).await;
        }
        assert!(locks.is_empty());

        let guard = locks.acquire("REF1").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("REF1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
