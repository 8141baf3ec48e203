// Per-document exclusive locks keyed by fingerprint. An entry lives only while
// a guard holds it or a caller waits on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Exclusive access to one document. Dropping it releases the lock and
/// removes the table entry once nobody else is using it.
#[derive(Debug)]
pub struct DocumentGuard {
    guard: Option<OwnedMutexGuard<()>>,
    fingerprint: String,
    locks: DocumentLocks,
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.prune(&self.fingerprint);
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentLocks {
    table: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl DocumentLocks {
    fn entry(&self, fingerprint: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(fingerprint.to_owned()).or_default())
    }

    /// Non-blocking acquire used by sync rounds.
    pub fn try_acquire(&self, fingerprint: &str) -> Option<DocumentGuard> {
        match self.entry(fingerprint).try_lock_owned() {
            Ok(guard) => Some(self.wrap(guard, fingerprint)),
            Err(_) => {
                self.prune(fingerprint);
                None
            }
        }
    }

    /// Waits for the lock. Used where collaborator sets change.
    pub async fn acquire(&self, fingerprint: &str) -> DocumentGuard {
        let guard = self.entry(fingerprint).lock_owned().await;
        self.wrap(guard, fingerprint)
    }

    fn wrap(&self, guard: OwnedMutexGuard<()>, fingerprint: &str) -> DocumentGuard {
        DocumentGuard {
            guard: Some(guard),
            fingerprint: fingerprint.to_owned(),
            locks: self.clone(),
        }
    }

    /// Drops the table entry if nobody holds or waits on it.
    fn prune(&self, fingerprint: &str) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table
            .get(fingerprint)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(fingerprint);
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
