// Record persistence seam. The core talks to `RecordStore`; the relay ships an
// in-memory backend and a directory of working copies.

mod memory;
mod records;
mod working_copy;

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use records::{
    DocumentRecord, HeartbeatRecord, PairKey, SelectionRecord, ServerTextRecord, ShadowRecord,
};
pub use working_copy::WorkingCopies;

/// A persisted row with a unique key.
pub trait Record: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}

/// Selects records by key, by predicate, or all of them.
pub enum Filter<R: Record> {
    All,
    Key(R::Key),
    Matching(Arc<dyn Fn(&R) -> bool + Send + Sync>),
}

impl<R: Record> Filter<R> {
    pub fn key(key: impl Into<R::Key>) -> Self {
        Self::Key(key.into())
    }

    pub fn matching(predicate: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        Self::Matching(Arc::new(predicate))
    }

    pub fn matches(&self, record: &R) -> bool {
        match self {
            Self::All => true,
            Self::Key(key) => record.key() == *key,
            Self::Matching(predicate) => predicate(record),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} already exists")]
    Duplicate(String),

    #[error("record store unavailable: {0}")]
    Backend(String),
}

#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    async fn find(&self, filter: &Filter<R>) -> Result<Option<R>, StoreError>;

    async fn find_all(&self, filter: &Filter<R>) -> Result<Vec<R>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the key is taken.
    async fn insert(&self, record: R) -> Result<R, StoreError>;

    /// Replaces the stored record with the same key. Returns `None` when there
    /// is nothing to replace.
    async fn update(&self, record: R) -> Result<Option<R>, StoreError>;

    /// Removes every matching record and returns how many were removed.
    async fn delete(&self, filter: &Filter<R>) -> Result<usize, StoreError>;

    /// Inserts or replaces. This default is two calls and can race with a
    /// concurrent insert; backends that can replace atomically override it.
    async fn upsert(&self, record: R) -> Result<R, StoreError> {
        match self.update(record.clone()).await? {
            Some(updated) => Ok(updated),
            None => self.insert(record).await,
        }
    }
}

/// Every record collection the relay core uses.
#[derive(Clone)]
pub struct Stores {
    pub documents: Arc<dyn RecordStore<DocumentRecord>>,
    pub shadows: Arc<dyn RecordStore<ShadowRecord>>,
    pub server_texts: Arc<dyn RecordStore<ServerTextRecord>>,
    pub heartbeats: Arc<dyn RecordStore<HeartbeatRecord>>,
    pub selections: Arc<dyn RecordStore<SelectionRecord>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            documents: Arc::new(MemoryStore::default()),
            shadows: Arc::new(MemoryStore::default()),
            server_texts: Arc::new(MemoryStore::default()),
            heartbeats: Arc::new(MemoryStore::default()),
            selections: Arc::new(MemoryStore::default()),
        }
    }
}
