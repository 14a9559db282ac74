use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<(String, String), Arc<Mutex<()>>>;

/// One async mutex per `(cluster, service)`, created on first use and
/// dropped again once nobody holds or waits for it.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    locks: Arc<LockMap>,
}

/// Held while a `(cluster, service)` is being worked on.
#[derive(Debug)]
pub struct ResourceGuard {
    key: (String, String),
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, cluster: &str, service: &str) -> ResourceGuard {
        let key = (cluster.to_string(), service.to_string());
        let lock = self.locks.entry(key.clone()).or_default().clone();
        ResourceGuard {
            key,
            locks: self.locks.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // the map entry is the only remaining owner: no holder, no waiter
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
