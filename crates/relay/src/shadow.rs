// Shadow texts per (document, collaborator) and the canonical server text per
// document. The server text is mirrored into the document's working copy.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::SyncError;
use crate::store::{
    Filter, RecordStore, ServerTextRecord, ShadowRecord, Stores, WorkingCopies,
};

#[derive(Clone)]
pub struct ShadowStore {
    shadows: Arc<dyn RecordStore<ShadowRecord>>,
    server_texts: Arc<dyn RecordStore<ServerTextRecord>>,
    working_copies: WorkingCopies,
}

fn pair(fingerprint: &str, collaborator: &str) -> Filter<ShadowRecord> {
    Filter::Key((fingerprint.to_owned(), collaborator.to_owned()))
}

impl ShadowStore {
    pub fn new(stores: &Stores, working_copies: WorkingCopies) -> Self {
        Self {
            shadows: Arc::clone(&stores.shadows),
            server_texts: Arc::clone(&stores.server_texts),
            working_copies,
        }
    }

    pub async fn shadow(
        &self,
        fingerprint: &str,
        collaborator: &str,
    ) -> Result<Option<String>, SyncError> {
        let record = self.shadows.find(&pair(fingerprint, collaborator)).await?;
        Ok(record.map(|record| record.text))
    }

    pub async fn set_shadow(
        &self,
        fingerprint: &str,
        collaborator: &str,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.shadows
            .upsert(ShadowRecord {
                fingerprint: fingerprint.to_owned(),
                collaborator: collaborator.to_owned(),
                text,
                updated_at: now,
            })
            .await?;
        Ok(())
    }

    pub async fn delete_shadow(&self, fingerprint: &str, collaborator: &str) -> Result<bool, SyncError> {
        Ok(self.shadows.delete(&pair(fingerprint, collaborator)).await? > 0)
    }

    /// Removes every collaborator's shadow of a document.
    pub async fn delete_shadows(&self, fingerprint: &str) -> Result<usize, SyncError> {
        let fingerprint = fingerprint.to_owned();
        let removed = self
            .shadows
            .delete(&Filter::matching(move |record: &ShadowRecord| {
                record.fingerprint == fingerprint
            }))
            .await?;
        Ok(removed)
    }

    pub async fn server_text(&self, fingerprint: &str) -> Result<Option<String>, SyncError> {
        let record = self
            .server_texts
            .find(&Filter::Key(fingerprint.to_owned()))
            .await?;
        Ok(record.map(|record| record.text))
    }

    /// Stores the canonical text and writes it through to the working copy.
    pub async fn set_server_text(
        &self,
        fingerprint: &str,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.working_copies.write(fingerprint, &text).await?;
        self.server_texts
            .upsert(ServerTextRecord {
                fingerprint: fingerprint.to_owned(),
                text,
                updated_at: now,
            })
            .await?;
        Ok(())
    }

    pub async fn delete_server_text(&self, fingerprint: &str) -> Result<bool, SyncError> {
        let removed = self
            .server_texts
            .delete(&Filter::Key(fingerprint.to_owned()))
            .await?;
        Ok(removed > 0)
    }

    /// Deletes server texts whose document is not in `live`. Returns the
    /// fingerprints that were removed.
    pub async fn delete_orphaned_server_texts(
        &self,
        live: &HashSet<String>,
    ) -> Result<Vec<String>, SyncError> {
        let mut orphans: Vec<String> = self
            .server_texts
            .find_all(&Filter::All)
            .await?
            .into_iter()
            .map(|record| record.fingerprint)
            .filter(|fingerprint| !live.contains(fingerprint))
            .collect();
        orphans.sort();

        for fingerprint in &orphans {
            self.server_texts
                .delete(&Filter::Key(fingerprint.clone()))
                .await?;
            debug!(fingerprint = %fingerprint, "deleted orphaned server text");
        }
        Ok(orphans)
    }
}
