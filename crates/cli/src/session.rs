// Client half of differential synchronization for one open document.

use anyhow::{Context, Result};
use tandem_common::diff::{apply_deltas, diff, editor_deltas, EditorDelta};
use tandem_common::protocol::actions::{HeartbeatResult, PeerSelections};
use tandem_common::types::Selection;
use tracing::{debug, info, warn};

use crate::client::{is_retryable, relay_error, RelayClient};
use crate::throttle::{Throttle, SELECTION_INTERVAL, SYNC_INTERVAL};

/// Whatever holds the collaborator's live text.
pub trait EditorSurface: Send {
    fn text(&self) -> String;

    /// Applies remote changes in place so local cursors survive.
    fn apply_deltas(&mut self, deltas: &[EditorDelta]) -> Result<()>;
}

/// In-memory editor surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn replace(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

impl EditorSurface for TextBuffer {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn apply_deltas(&mut self, deltas: &[EditorDelta]) -> Result<()> {
        self.text = apply_deltas(&self.text, deltas);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub sent_hunks: usize,
    pub received_hunks: usize,
    /// Nothing was exchanged; local edits stay queued for the next round.
    pub deferred: bool,
}

impl RoundSummary {
    fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }
}

fn is_not_registered(error: &anyhow::Error) -> bool {
    relay_error(error).is_some_and(|relay| relay.code.as_deref() == Some("NOT_REGISTERED"))
}

pub struct CollabSession<E: EditorSurface> {
    client: RelayClient,
    path: String,
    document_hash: Option<String>,
    shadow: String,
    editor: E,
    selections: Throttle<Selection>,
    syncs: Throttle<()>,
    peers: PeerSelections,
}

impl<E: EditorSurface> CollabSession<E> {
    pub fn new(client: RelayClient, path: impl Into<String>, editor: E) -> Self {
        Self {
            client,
            path: path.into(),
            document_hash: None,
            shadow: String::new(),
            editor,
            selections: Throttle::new(SELECTION_INTERVAL),
            syncs: Throttle::new(SYNC_INTERVAL),
            peers: PeerSelections::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn document_hash(&self) -> Option<&str> {
        self.document_hash.as_deref()
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn shadow(&self) -> &str {
        &self.shadow
    }

    /// Registers with the relay and seeds the shadow. When others already
    /// have the document open, the local text is replaced by theirs.
    pub async fn open(&mut self) -> Result<String> {
        let registered = self
            .client
            .register(&self.path)
            .await
            .with_context(|| format!("failed to register `{}`", self.path))?;

        if let Some(shared) = registered.content {
            let local = self.editor.text();
            if local != shared {
                info!(path = %self.path, "adopting text shared by other collaborators");
                self.editor.apply_deltas(&editor_deltas(&local, &shared))?;
            }
        }

        self.shadow = self.editor.text();
        self.client
            .send_shadow(&self.path, &self.shadow)
            .await
            .with_context(|| format!("failed to send initial shadow for `{}`", self.path))?;
        self.document_hash = Some(registered.hash.clone());
        Ok(registered.hash)
    }

    /// Registers again after the relay dropped this session. Local edits the
    /// relay never saw are replayed on top of whatever text it now shares.
    pub async fn rejoin(&mut self) -> Result<String> {
        let before = self.editor.text();
        let unsent = diff(&self.shadow, &before);
        let hash = self.open().await?;

        let current = self.editor.text();
        if current != before && !unsent.is_empty() {
            let (merged, clean) = unsent.apply(&current);
            if !clean {
                warn!(path = %self.path, "local edits did not apply cleanly after rejoining");
            }
            self.editor.apply_deltas(&editor_deltas(&current, &merged))?;
        }
        info!(path = %self.path, "rejoined document");
        Ok(hash)
    }

    /// Replaces the local text after an edit outside the relay's reach.
    pub fn local_edit(&mut self, text: &str) -> Result<bool> {
        let current = self.editor.text();
        if current == text {
            return Ok(false);
        }
        self.editor.apply_deltas(&editor_deltas(&current, text))?;
        Ok(true)
    }

    /// Runs a round now if the sync throttle allows it, otherwise parks one.
    pub async fn request_sync(&mut self) -> Result<Option<RoundSummary>> {
        match self.syncs.offer(()) {
            Some(()) => self.sync_round().await.map(Some),
            None => Ok(None),
        }
    }

    /// Sends local edits and folds the relay's answer into the shadow and the
    /// editor.
    pub async fn sync_round(&mut self) -> Result<RoundSummary> {
        self.syncs.clear();
        let hash = self
            .document_hash
            .clone()
            .context("document is not open; call open() first")?;

        let local = self.editor.text();
        let outgoing = diff(&self.shadow, &local);
        let sent_hunks = outgoing.hunks.len();

        let incoming = match self.client.sync_text(&hash, &outgoing).await {
            Ok(patch) => patch,
            Err(err) if is_retryable(&err) => {
                debug!(path = %self.path, "relay busy, deferring sync");
                return Ok(RoundSummary::deferred());
            }
            Err(err) if is_not_registered(&err) => {
                warn!(path = %self.path, "relay no longer knows this session; registering again");
                self.rejoin().await?;
                return Ok(RoundSummary::deferred());
            }
            Err(err) => return Err(err.context(format!("sync of `{}` failed", self.path))),
        };
        self.shadow = local;

        let (shadow, shadow_clean) = incoming.apply(&self.shadow);
        if !shadow_clean {
            warn!(path = %self.path, "relay patch did not apply cleanly to the shadow");
        }
        self.shadow = shadow;

        if !incoming.is_empty() {
            let current = self.editor.text();
            let (merged, clean) = incoming.apply(&current);
            if !clean {
                warn!(path = %self.path, "relay patch did not apply cleanly to local text");
            }
            self.editor.apply_deltas(&editor_deltas(&current, &merged))?;
        }

        Ok(RoundSummary {
            sent_hunks,
            received_hunks: incoming.hunks.len(),
            deferred: false,
        })
    }

    /// Runs the round parked by [`Self::request_sync`] once it is due.
    pub async fn flush_sync(&mut self) -> Result<Option<RoundSummary>> {
        match self.syncs.poll() {
            Some(()) => self.sync_round().await.map(Some),
            None => Ok(None),
        }
    }

    pub fn next_sync_deadline(&self) -> Option<std::time::Instant> {
        self.syncs.next_deadline()
    }

    /// Sends the selection now if the throttle allows it, otherwise parks it.
    pub async fn selection_changed(&mut self, selection: Selection) -> Result<bool> {
        match self.selections.offer(selection.normalized()) {
            Some(selection) => {
                self.client.send_selection(&self.path, selection).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn flush_selection(&mut self) -> Result<bool> {
        match self.selections.poll() {
            Some(selection) => {
                self.client.send_selection(&self.path, selection).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn next_selection_deadline(&self) -> Option<std::time::Instant> {
        self.selections.next_deadline()
    }

    pub async fn heartbeat(&self) -> Result<HeartbeatResult> {
        self.client.heartbeat().await
    }

    /// Fetches the other collaborators' selections and keeps the latest copy.
    pub async fn peers(&mut self) -> Result<&PeerSelections> {
        self.peers = self.client.peers(&self.path).await?;
        Ok(&self.peers)
    }

    /// Selections from the most recent [`Self::peers`] call.
    pub fn peer_selections(&self) -> &PeerSelections {
        &self.peers
    }

    /// Clears this collaborator's selection and leaves the document.
    pub async fn close(mut self) -> Result<E> {
        self.selections.clear();
        self.syncs.clear();
        self.client
            .reset_selection(Some(&self.path), false)
            .await
            .with_context(|| format!("failed to clear selection on `{}`", self.path))?;
        self.client
            .unregister(Some(&self.path), false)
            .await
            .with_context(|| format!("failed to unregister `{}`", self.path))?;
        info!(path = %self.path, collaborator = self.client.collaborator(), "left document");
        Ok(self.editor)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tandem_common::types::{Position, Selection};
    use tandem_common::path::DocumentPath;
    use tandem_relay::app::build_router;
    use tandem_relay::registry::SessionRegistry;
    use tandem_relay::state::RelayState;
    use tandem_relay::store::{Stores, WorkingCopies};
    use url::Url;

    use super::{CollabSession, EditorSurface, TextBuffer};
    use crate::client::RelayClient;
    use crate::config::Settings;

    struct LiveRelay {
        _workspace: tempfile::TempDir,
        url: Url,
        registry: SessionRegistry,
    }

    async fn live_relay() -> LiveRelay {
        let workspace = tempfile::tempdir().expect("tempdir");
        std::fs::write(workspace.path().join("plan.md"), "plan: ship it\n").expect("seed");
        let state = RelayState::with_stores(
            Stores::in_memory(),
            WorkingCopies::new(workspace.path().join(".copies")),
            workspace.path(),
            Duration::from_secs(5),
        );
        let registry = state.registry.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, build_router(state, None))
                .await
                .expect("relay should serve");
        });
        LiveRelay {
            _workspace: workspace,
            url: Url::parse(&format!("http://{addr}")).expect("url"),
            registry,
        }
    }

    fn client(relay: &LiveRelay, collaborator: &str) -> RelayClient {
        RelayClient::new(&Settings {
            relay_url: relay.url.clone(),
            collaborator: collaborator.to_owned(),
        })
        .expect("client")
    }

    #[test]
    fn text_buffer_applies_deltas() {
        let mut buffer = TextBuffer::new("hello");
        let deltas = tandem_common::diff::editor_deltas("hello", "hello world");
        buffer.apply_deltas(&deltas).expect("apply");
        assert_eq!(buffer.as_str(), "hello world");
    }

    #[tokio::test]
    async fn two_sessions_converge_through_the_relay() {
        let relay = live_relay().await;

        let mut ada = CollabSession::new(client(&relay, "ada"), "plan.md", TextBuffer::default());
        ada.open().await.expect("ada opens");
        assert_eq!(ada.editor().as_str(), "");

        let mut grace =
            CollabSession::new(client(&relay, "grace"), "plan.md", TextBuffer::new("stale"));
        grace.open().await.expect("grace opens");
        assert_eq!(grace.editor().as_str(), "");
        assert_eq!(ada.document_hash(), grace.document_hash());

        ada.local_edit("first line from ada\n").expect("edit");
        let summary = ada.sync_round().await.expect("ada sync");
        assert_eq!(summary.sent_hunks, 1);
        assert_eq!(summary.received_hunks, 0);

        grace.local_edit("grace was here\n").expect("edit");
        grace.sync_round().await.expect("grace sync");
        ada.sync_round().await.expect("ada sync again");

        assert_eq!(ada.editor().as_str(), grace.editor().as_str());
        assert!(ada.editor().as_str().contains("first line from ada"));
        assert!(ada.editor().as_str().contains("grace was here"));
        assert_eq!(ada.shadow(), ada.editor().as_str());
    }

    #[tokio::test]
    async fn selections_reach_peers_and_close_leaves() {
        let relay = live_relay().await;
        let mut ada = CollabSession::new(client(&relay, "ada"), "plan.md", TextBuffer::default());
        let mut grace = CollabSession::new(client(&relay, "grace"), "plan.md", TextBuffer::default());
        ada.open().await.expect("open");
        grace.open().await.expect("open");

        let cursor = Selection::cursor(Position { row: 0, column: 3 });
        assert!(ada.selection_changed(cursor).await.expect("send"));
        assert!(!ada
            .selection_changed(Selection::cursor(Position { row: 0, column: 4 }))
            .await
            .expect("parked"));

        let peers = grace.peers().await.expect("peers");
        assert_eq!(peers["ada"].selection, cursor);
        assert_eq!(grace.peer_selections().len(), 1);
        assert_eq!(grace.heartbeat().await.expect("heartbeat").collaborator_count, 1);

        ada.close().await.expect("close");
        assert!(grace.peers().await.expect("peers").is_empty());
    }

    #[tokio::test]
    async fn dropped_session_rejoins_and_keeps_unsent_edits() {
        let relay = live_relay().await;
        let mut ada = CollabSession::new(client(&relay, "ada"), "plan.md", TextBuffer::default());
        let mut grace = CollabSession::new(client(&relay, "grace"), "plan.md", TextBuffer::default());
        ada.open().await.expect("open");
        grace.open().await.expect("open");

        // The relay forgets ada, as it does when a collaborator stops beating.
        relay.registry.unregister_all("ada").await.expect("drop ada");
        let fingerprint = DocumentPath::parse("plan.md").expect("path").fingerprint();
        assert!(!relay.registry.is_registered(&fingerprint, "ada").await.expect("check"));

        grace.local_edit("grace adds a line\n").expect("edit");
        grace.sync_round().await.expect("grace sync");

        ada.local_edit("ada wrote this offline\n").expect("edit");
        let summary = ada.sync_round().await.expect("round after being dropped");
        assert!(summary.deferred);
        assert!(relay.registry.is_registered(&fingerprint, "ada").await.expect("check"));
        assert!(ada.editor().as_str().contains("grace adds a line"));
        assert!(ada.editor().as_str().contains("ada wrote this offline"));

        let summary = ada.sync_round().await.expect("ada sync");
        assert_eq!(summary.sent_hunks, 1);
        grace.sync_round().await.expect("grace sync");
        assert_eq!(ada.editor().as_str(), grace.editor().as_str());
    }
}
