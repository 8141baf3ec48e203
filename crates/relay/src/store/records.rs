use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_common::types::Selection;

use super::Record;

/// `(fingerprint, collaborator)`.
pub type PairKey = (String, String);

/// A document that at least one collaborator has open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub fingerprint: String,
    pub path: String,
    /// Registration order, no duplicates.
    pub collaborators: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn has_collaborator(&self, collaborator: &str) -> bool {
        self.collaborators.iter().any(|existing| existing == collaborator)
    }
}

impl Record for DocumentRecord {
    type Key = String;

    fn key(&self) -> String {
        self.fingerprint.clone()
    }
}

/// The relay's copy of what a collaborator last agreed with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowRecord {
    pub fingerprint: String,
    pub collaborator: String,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

impl Record for ShadowRecord {
    type Key = PairKey;

    fn key(&self) -> PairKey {
        (self.fingerprint.clone(), self.collaborator.clone())
    }
}

/// Canonical merged text of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTextRecord {
    pub fingerprint: String,
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

impl Record for ServerTextRecord {
    type Key = String;

    fn key(&self) -> String {
        self.fingerprint.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub collaborator: String,
    pub last_seen: DateTime<Utc>,
}

impl Record for HeartbeatRecord {
    type Key = String;

    fn key(&self) -> String {
        self.collaborator.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub fingerprint: String,
    pub collaborator: String,
    pub selection: Selection,
    pub updated_at: DateTime<Utc>,
}

impl Record for SelectionRecord {
    type Key = PairKey;

    fn key(&self) -> PairKey {
        (self.fingerprint.clone(), self.collaborator.clone())
    }
}
