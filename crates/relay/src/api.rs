// Named-action dispatch. Every action is a POST to `/v1/actions/{action}` with
// camelCase JSON parameters; the caller identifies itself in a header.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use tandem_common::diff::Patch;
use tandem_common::path::DocumentPath;
use tandem_common::protocol::actions::{
    self, DocumentParams, HeartbeatResult, RegisterResult, ResetParams, SelectionChangeParams,
    SendShadowParams, SyncTextParams, SyncTextResult, UnregisterParams,
};
use tandem_common::protocol::Envelope;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::registry::RegisterOutcome;
use crate::state::RelayState;

pub const COLLABORATOR_HEADER: &str = "x-collaborator";

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/v1/actions/{action}", post(dispatch))
        .with_state(state)
}

async fn dispatch(
    State(state): State<RelayState>,
    Path(action): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Envelope>, SyncError> {
    if !actions::is_known_action(&action) {
        return Err(SyncError::InvalidAction(action));
    }
    let caller = collaborator(&headers)?;
    debug!(action = %action, collaborator = %caller, "dispatching action");

    let envelope = match action.as_str() {
        actions::REGISTER => register(&state, &caller, params(&body)?).await?,
        actions::UNREGISTER => unregister(&state, &caller, params(&body)?).await?,
        actions::SEND_HEARTBEAT => send_heartbeat(&state, &caller).await?,
        actions::SEND_SELECTION_CHANGE => {
            send_selection_change(&state, &caller, params(&body)?).await?
        }
        actions::GET_USERS_AND_SELECTIONS_FOR_FILE => {
            users_and_selections(&state, &caller, params(&body)?).await?
        }
        actions::SEND_SHADOW => send_shadow(&state, &caller, params(&body)?).await?,
        actions::SYNC_TEXT => sync_text(&state, &caller, params(&body)?).await?,
        actions::RESET_SELECTION => reset_selection(&state, &caller, params(&body)?).await?,
        actions::RESET_FILE => reset_file(&state, params(&body)?).await?,
        _ => return Err(SyncError::InvalidAction(action)),
    };
    Ok(Json(envelope))
}

async fn register(
    state: &RelayState,
    caller: &str,
    params: DocumentParams,
) -> Result<Envelope, SyncError> {
    let path = document_path(params.document_path)?;
    let outcome = state.registry.register(&path, caller).await?;
    let result = match outcome {
        RegisterOutcome::Joined {
            fingerprint,
            content,
        } => RegisterResult {
            hash: fingerprint,
            content: Some(content),
        },
        RegisterOutcome::Created { fingerprint }
        | RegisterOutcome::AlreadyRegistered { fingerprint } => RegisterResult {
            hash: fingerprint,
            content: None,
        },
    };
    Ok(Envelope::success_with(&result)?)
}

async fn unregister(
    state: &RelayState,
    caller: &str,
    params: UnregisterParams,
) -> Result<Envelope, SyncError> {
    if params.remove_all {
        let left = state.registry.unregister_all(caller).await?;
        info!(collaborator = caller, documents = left.len(), "collaborator left all documents");
        return Ok(Envelope::success());
    }

    let path = document_path(params.document_path)?;
    if state.registry.unregister(&path, caller).await? {
        Ok(Envelope::success())
    } else {
        Ok(Envelope::notice("Not registered to this document."))
    }
}

async fn send_heartbeat(state: &RelayState, caller: &str) -> Result<Envelope, SyncError> {
    let outcome = state.presence.heartbeat(caller).await?;
    Ok(Envelope::success_with(&HeartbeatResult {
        collaborator_count: outcome.collaborator_count,
        newly_connected: outcome.newly_connected,
    })?)
}

async fn send_selection_change(
    state: &RelayState,
    caller: &str,
    params: SelectionChangeParams,
) -> Result<Envelope, SyncError> {
    let path = document_path(params.document_path)?;
    let selection = required(params.selection, "selection")?
        .decode()
        .map_err(|err| SyncError::invalid("selection", err))?;
    state
        .selections
        .set_selection(&path.fingerprint(), caller, selection.normalized())
        .await?;
    Ok(Envelope::success())
}

async fn users_and_selections(
    state: &RelayState,
    caller: &str,
    params: DocumentParams,
) -> Result<Envelope, SyncError> {
    let path = document_path(params.document_path)?;
    let peers = state
        .selections
        .selections_for(&path.fingerprint(), caller)
        .await?;
    Ok(Envelope::success_with(&peers)?)
}

async fn send_shadow(
    state: &RelayState,
    caller: &str,
    params: SendShadowParams,
) -> Result<Envelope, SyncError> {
    let path = document_path(params.document_path)?;
    let text = required(params.shadow_text, "shadowText")?;
    state.sync.seed_shadow(&path, caller, text).await?;
    Ok(Envelope::success())
}

async fn sync_text(
    state: &RelayState,
    caller: &str,
    params: SyncTextParams,
) -> Result<Envelope, SyncError> {
    let fingerprint = required(params.document_hash, "documentHash")?;
    let patch_text = required(params.patch, "patch")?;
    let patch = Patch::from_text(&patch_text).map_err(|err| SyncError::invalid("patch", err))?;

    let round = state.sync.sync(&fingerprint, caller, &patch).await?;
    Ok(Envelope::success_with(&SyncTextResult {
        patch: round.patch.to_text(),
    })?)
}

async fn reset_selection(
    state: &RelayState,
    caller: &str,
    params: ResetParams,
) -> Result<Envelope, SyncError> {
    let cleared = if params.reset_all {
        state.selections.clear(None, caller).await?
    } else {
        let path = document_path(params.document_path)?;
        state
            .selections
            .clear(Some(&path.fingerprint()), caller)
            .await?
    };
    debug!(collaborator = caller, cleared, "selections reset");
    Ok(Envelope::success())
}

async fn reset_file(state: &RelayState, params: ResetParams) -> Result<Envelope, SyncError> {
    if params.reset_all {
        let open = state.registry.open_fingerprints().await?;
        let removed = state.shadows.delete_orphaned_server_texts(&open).await?;
        info!(removed = removed.len(), "orphaned server texts reset");
        return Ok(Envelope::success());
    }

    let path = document_path(params.document_path)?;
    let fingerprint = path.fingerprint();
    let _guard = state.locks.acquire(&fingerprint).await;
    if state.shadows.delete_server_text(&fingerprint).await? {
        info!(%fingerprint, path = %path, "server text reset");
    }
    Ok(Envelope::success())
}

fn collaborator(headers: &HeaderMap) -> Result<String, SyncError> {
    let value = headers
        .get(COLLABORATOR_HEADER)
        .ok_or(SyncError::MissingParameter("collaborator"))?;
    let name = value
        .to_str()
        .map_err(|err| SyncError::invalid("collaborator", err))?
        .trim();
    if name.is_empty() {
        return Err(SyncError::MissingParameter("collaborator"));
    }
    Ok(name.to_owned())
}

/// Decodes the request body; an empty body means no parameters.
fn params<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, SyncError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| SyncError::invalid("body", err))
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, SyncError> {
    value.ok_or(SyncError::MissingParameter(name))
}

fn document_path(raw: Option<String>) -> Result<DocumentPath, SyncError> {
    let raw = required(raw, "documentPath")?;
    DocumentPath::parse(&raw).map_err(|err| SyncError::invalid("documentPath", err))
}
