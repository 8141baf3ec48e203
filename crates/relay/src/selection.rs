// Ephemeral cursor/selection state per collaborator per document.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tandem_common::protocol::actions::PeerSelections;
use tandem_common::types::{PeerSelection, Selection};

use crate::error::SyncError;
use crate::registry::SessionRegistry;
use crate::store::{Filter, RecordStore, SelectionRecord, Stores};

const SATURATION: f32 = 0.7;
const LIGHTNESS: f32 = 0.6;

#[derive(Clone)]
pub struct SelectionBroadcaster {
    selections: Arc<dyn RecordStore<SelectionRecord>>,
    registry: SessionRegistry,
}

impl SelectionBroadcaster {
    pub fn new(stores: &Stores, registry: SessionRegistry) -> Self {
        Self {
            selections: Arc::clone(&stores.selections),
            registry,
        }
    }

    pub async fn set_selection(
        &self,
        fingerprint: &str,
        caller: &str,
        selection: Selection,
    ) -> Result<(), SyncError> {
        self.set_selection_at(fingerprint, caller, selection, Utc::now()).await
    }

    pub async fn set_selection_at(
        &self,
        fingerprint: &str,
        caller: &str,
        selection: Selection,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.selections
            .upsert(SelectionRecord {
                fingerprint: fingerprint.to_owned(),
                collaborator: caller.to_owned(),
                selection,
                updated_at: now,
            })
            .await?;
        Ok(())
    }

    /// Selections of the document's registered collaborators other than
    /// `excluding`, each with its display color.
    pub async fn selections_for(
        &self,
        fingerprint: &str,
        excluding: &str,
    ) -> Result<PeerSelections, SyncError> {
        let collaborators = self.registry.collaborators(fingerprint).await?;
        let document = fingerprint.to_owned();
        let excluded = excluding.to_owned();
        let records = self
            .selections
            .find_all(&Filter::matching(move |record: &SelectionRecord| {
                record.fingerprint == document
                    && record.collaborator != excluded
                    && collaborators.contains(&record.collaborator)
            }))
            .await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let color = color_for(&record.collaborator);
                (
                    record.collaborator,
                    PeerSelection {
                        selection: record.selection,
                        color,
                    },
                )
            })
            .collect())
    }

    /// Clears the caller's selection on one document, or on all documents
    /// when `fingerprint` is `None`.
    pub async fn clear(&self, fingerprint: Option<&str>, caller: &str) -> Result<usize, SyncError> {
        match fingerprint {
            Some(fingerprint) => Ok(self
                .selections
                .delete(&Filter::Key((fingerprint.to_owned(), caller.to_owned())))
                .await?),
            None => self.clear_all_for(caller).await,
        }
    }

    pub async fn clear_all_for(&self, caller: &str) -> Result<usize, SyncError> {
        let caller = caller.to_owned();
        Ok(self
            .selections
            .delete(&Filter::matching(move |record: &SelectionRecord| {
                record.collaborator == caller
            }))
            .await?)
    }
}

/// Stable `#rrggbb` color for a collaborator: the identity's SHA-256 picks a
/// hue, saturation and lightness are fixed.
pub fn color_for(collaborator: &str) -> String {
    let digest = Sha256::digest(collaborator.as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) % 360;
    let (r, g, b) = hsl_to_rgb(f32::from(hue) / 360.0, SATURATION, LIGHTNESS);
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
