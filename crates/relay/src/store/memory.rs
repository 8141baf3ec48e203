use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Filter, Record, RecordStore, StoreError};

/// Process-local record store.
#[derive(Debug, Clone)]
pub struct MemoryStore<R: Record> {
    rows: Arc<RwLock<HashMap<R::Key, R>>>,
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<R: Record> MemoryStore<R> {
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn find(&self, filter: &Filter<R>) -> Result<Option<R>, StoreError> {
        let rows = self.rows.read().await;
        let found = match filter {
            Filter::Key(key) => rows.get(key).cloned(),
            _ => rows.values().find(|record| filter.matches(record)).cloned(),
        };
        Ok(found)
    }

    async fn find_all(&self, filter: &Filter<R>) -> Result<Vec<R>, StoreError> {
        let rows = self.rows.read().await;
        let found = match filter {
            Filter::Key(key) => rows.get(key).cloned().into_iter().collect(),
            _ => rows
                .values()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect(),
        };
        Ok(found)
    }

    async fn insert(&self, record: R) -> Result<R, StoreError> {
        let mut rows = self.rows.write().await;
        let key = record.key();
        if rows.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("{key:?}")));
        }
        rows.insert(key, record.clone());
        Ok(record)
    }

    async fn update(&self, record: R) -> Result<Option<R>, StoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&record.key()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: R) -> Result<R, StoreError> {
        self.rows.write().await.insert(record.key(), record.clone());
        Ok(record)
    }

    async fn delete(&self, filter: &Filter<R>) -> Result<usize, StoreError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        match filter {
            Filter::Key(key) => {
                rows.remove(key);
            }
            _ => rows.retain(|_, record| !filter.matches(record)),
        }
        Ok(before - rows.len())
    }
}
