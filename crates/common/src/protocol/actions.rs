// Relay action names and their parameter/result payloads.
//
// Parameters are optional at the type level so the relay can report exactly
// which one is missing instead of a generic decode error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{PeerSelection, Selection};

pub const REGISTER: &str = "register";
pub const UNREGISTER: &str = "unregister";
pub const SEND_HEARTBEAT: &str = "sendHeartbeat";
pub const SEND_SELECTION_CHANGE: &str = "sendSelectionChange";
pub const GET_USERS_AND_SELECTIONS_FOR_FILE: &str = "getUsersAndSelectionsForFile";
pub const SEND_SHADOW: &str = "sendShadow";
pub const SYNC_TEXT: &str = "syncText";
pub const RESET_SELECTION: &str = "resetSelection";
pub const RESET_FILE: &str = "resetFile";

/// Every action the relay dispatches.
pub const ACTIONS: &[&str] = &[
    REGISTER,
    UNREGISTER,
    SEND_HEARTBEAT,
    SEND_SELECTION_CHANGE,
    GET_USERS_AND_SELECTIONS_FOR_FILE,
    SEND_SHADOW,
    SYNC_TEXT,
    RESET_SELECTION,
    RESET_FILE,
];

pub fn is_known_action(name: &str) -> bool {
    ACTIONS.contains(&name)
}

/// Parameters naming a single document. Used by `register` and
/// `getUsersAndSelectionsForFile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResult {
    pub hash: String,
    /// Shared text, present only when other collaborators were already
    /// registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<String>,
    #[serde(default)]
    pub remove_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResult {
    pub collaborator_count: usize,
    /// The relay had no live session for the caller, so any registrations it
    /// held were dropped.
    #[serde(default)]
    pub newly_connected: bool,
}

/// A selection as sent by editors: either an embedded JSON string or a
/// structured object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectionPayload {
    Structured(Selection),
    Encoded(String),
}

impl SelectionPayload {
    pub fn decode(&self) -> Result<Selection, serde_json::Error> {
        match self {
            Self::Structured(selection) => Ok(*selection),
            Self::Encoded(json) => serde_json::from_str(json),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChangeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionPayload>,
}

/// Peers' selections keyed by collaborator.
pub type PeerSelections = BTreeMap<String, PeerSelection>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendShadowParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTextParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTextResult {
    pub patch: String,
}

/// Parameters of `resetSelection` and `resetFile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<String>,
    #[serde(default)]
    pub reset_all: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    #[test]
    fn action_names_are_unique() {
        let mut names: Vec<&str> = ACTIONS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ACTIONS.len());
        assert!(is_known_action("syncText"));
        assert!(!is_known_action("sync_text"));
    }

    #[test]
    fn params_use_camel_case_keys() {
        let params: SendShadowParams = serde_json::from_value(serde_json::json!({
            "documentPath": "notes.md",
            "shadowText": "hello"
        }))
        .expect("params should decode");
        assert_eq!(params.document_path.as_deref(), Some("notes.md"));
        assert_eq!(params.shadow_text.as_deref(), Some("hello"));

        let reset: ResetParams =
            serde_json::from_value(serde_json::json!({"resetAll": true})).expect("decode");
        assert!(reset.reset_all);
        assert!(reset.document_path.is_none());
    }

    #[test]
    fn selection_payload_accepts_string_or_object() {
        let expected = Selection {
            start: Position { row: 0, column: 1 },
            end: Position { row: 2, column: 3 },
        };

        let structured: SelectionChangeParams = serde_json::from_value(serde_json::json!({
            "documentPath": "a.md",
            "selection": {"start": {"row": 0, "column": 1}, "end": {"row": 2, "column": 3}}
        }))
        .expect("decode");
        let encoded: SelectionChangeParams = serde_json::from_value(serde_json::json!({
            "documentPath": "a.md",
            "selection": "{\"start\":{\"row\":0,\"column\":1},\"end\":{\"row\":2,\"column\":3}}"
        }))
        .expect("decode");

        for params in [structured, encoded] {
            let payload = params.selection.expect("selection present");
            assert_eq!(payload.decode().expect("valid selection"), expected);
        }
    }

    #[test]
    fn register_result_omits_absent_content() {
        let result = RegisterResult {
            hash: "abc".to_owned(),
            content: None,
        };
        assert_eq!(
            serde_json::to_value(result).expect("serialize"),
            serde_json::json!({"hash": "abc"})
        );
    }
}
