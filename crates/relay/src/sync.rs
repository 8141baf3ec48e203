// One differential-synchronization round trip per request.

use chrono::{DateTime, Utc};
use tandem_common::diff::{diff, ApplyReport, Patch};
use tandem_common::path::DocumentPath;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::locks::DocumentLocks;
use crate::registry::SessionRegistry;
use crate::shadow::ShadowStore;

/// Result of a sync round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRound {
    /// Changes the client has not seen yet, relative to its patched shadow.
    pub patch: Patch,
    /// Every hunk of the client patch applied to the collaborator's shadow.
    pub shadow_clean: bool,
    /// Every hunk of the client patch merged into the server text.
    pub merge_clean: bool,
}

#[derive(Clone)]
pub struct SyncCoordinator {
    registry: SessionRegistry,
    shadows: ShadowStore,
    locks: DocumentLocks,
}

impl SyncCoordinator {
    pub fn new(registry: SessionRegistry, shadows: ShadowStore, locks: DocumentLocks) -> Self {
        Self {
            registry,
            shadows,
            locks,
        }
    }

    /// Registers the caller if needed and replaces its shadow with `text`.
    /// The first shadow of a document also seeds the server text.
    pub async fn seed_shadow(
        &self,
        path: &DocumentPath,
        caller: &str,
        text: String,
    ) -> Result<String, SyncError> {
        self.seed_shadow_at(path, caller, text, Utc::now()).await
    }

    pub async fn seed_shadow_at(
        &self,
        path: &DocumentPath,
        caller: &str,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<String, SyncError> {
        let fingerprint = self.registry.ensure_registered(path, caller).await?;
        let _guard = self.locks.acquire(&fingerprint).await;

        if self.shadows.server_text(&fingerprint).await?.is_none() {
            self.shadows
                .set_server_text(&fingerprint, text.clone(), now)
                .await?;
            debug!(%fingerprint, collaborator = caller, "server text seeded from shadow");
        }
        self.shadows.set_shadow(&fingerprint, caller, text, now).await?;
        Ok(fingerprint)
    }

    pub async fn sync(
        &self,
        fingerprint: &str,
        caller: &str,
        client_patch: &Patch,
    ) -> Result<SyncRound, SyncError> {
        self.sync_at(fingerprint, caller, client_patch, Utc::now()).await
    }

    /// Applies the caller's patch to its shadow and to the server text, then
    /// answers with what the server text has that the shadow lacks.
    pub async fn sync_at(
        &self,
        fingerprint: &str,
        caller: &str,
        client_patch: &Patch,
        now: DateTime<Utc>,
    ) -> Result<SyncRound, SyncError> {
        let _guard = self
            .locks
            .try_acquire(fingerprint)
            .ok_or_else(|| SyncError::LockUnavailable {
                fingerprint: fingerprint.to_owned(),
            })?;

        let not_registered = || SyncError::NotRegistered {
            fingerprint: fingerprint.to_owned(),
            collaborator: caller.to_owned(),
        };
        if !self.registry.is_registered(fingerprint, caller).await? {
            return Err(not_registered());
        }
        let server_shadow = self
            .shadows
            .shadow(fingerprint, caller)
            .await?
            .ok_or_else(not_registered)?;

        let server_text = match self.shadows.server_text(fingerprint).await? {
            Some(text) => text,
            None => {
                self.shadows
                    .set_server_text(fingerprint, server_shadow.clone(), now)
                    .await?;
                server_shadow.clone()
            }
        };

        let patched_shadow = client_patch.apply_detailed(&server_shadow);
        log_failures("shadow", fingerprint, caller, &patched_shadow);

        let merged = client_patch.apply_detailed(&server_text);
        log_failures("server text", fingerprint, caller, &merged);

        if merged.text != server_text {
            self.shadows
                .set_server_text(fingerprint, merged.text.clone(), now)
                .await?;
        }

        let patch = diff(&patched_shadow.text, &merged.text);
        self.shadows
            .set_shadow(fingerprint, caller, merged.text.clone(), now)
            .await?;

        debug!(
            fingerprint,
            collaborator = caller,
            incoming_hunks = client_patch.hunks.len(),
            outgoing_hunks = patch.hunks.len(),
            "sync round complete"
        );

        Ok(SyncRound {
            patch,
            shadow_clean: patched_shadow.applied_cleanly(),
            merge_clean: merged.applied_cleanly(),
        })
    }
}

fn log_failures(side: &str, fingerprint: &str, caller: &str, report: &ApplyReport) {
    for (hunk, reason) in report.failures() {
        warn!(
            fingerprint,
            collaborator = caller,
            hunk,
            reason = %reason,
            "patch hunk did not apply to {side}"
        );
    }
}
