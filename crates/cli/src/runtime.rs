// Event loop driving one collaboration session: heartbeats, periodic sync,
// peer selection polling, throttled selection and edit-triggered sync.
//
// Text rounds only run while someone else is connected. Edits made alone stay
// in the editor and go out with the first round after a peer shows up.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tandem_common::types::Selection;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::session::{CollabSession, EditorSurface, RoundSummary};

/// The relay drops a session once a full heartbeat interval (5 s by default)
/// passes in silence, so beats go out well inside that.
pub const HEARTBEAT_EVERY: Duration = Duration::from_secs(2);
pub const SYNC_EVERY: Duration = Duration::from_secs(1);
pub const PEERS_EVERY: Duration = Duration::from_secs(1);

/// Something that happened in the local editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    Edited(String),
    SelectionChanged(Selection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub heartbeat_every: Duration,
    pub sync_every: Duration,
    pub peers_every: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            heartbeat_every: HEARTBEAT_EVERY,
            sync_every: SYNC_EVERY,
            peers_every: PEERS_EVERY,
        }
    }
}

/// Opens the session and runs until `shutdown` resolves or the event channel
/// closes, then leaves the document. Returns the editor surface.
pub async fn run<E, S>(
    mut session: CollabSession<E>,
    mut events: mpsc::Receiver<LocalEvent>,
    options: RuntimeOptions,
    shutdown: S,
) -> Result<E>
where
    E: EditorSurface,
    S: Future<Output = ()>,
{
    // Announce presence before registering so a reconnect on the relay does
    // not undo the registration below.
    let first_beat = session
        .heartbeat()
        .await
        .context("failed to reach the relay")?;
    let mut collaborating = first_beat.collaborator_count > 1;
    let hash = session.open().await?;
    info!(path = session.path(), document_hash = %hash, collaborating, "session open");

    tokio::pin!(shutdown);
    let mut heartbeat = ticker(options.heartbeat_every);
    let mut sync_tick = ticker(options.sync_every);
    let mut peers_tick = ticker(options.peers_every);

    loop {
        let deadline = [session.next_selection_deadline(), session.next_sync_deadline()]
            .into_iter()
            .flatten()
            .min();
        let wake_at = deadline
            .map(Instant::from_std)
            .unwrap_or_else(|| Instant::now() + options.sync_every);

        tokio::select! {
            _ = &mut shutdown => break,
            _ = heartbeat.tick() => match session.heartbeat().await {
                Ok(beat) => {
                    if beat.newly_connected {
                        warn!(path = session.path(), "relay dropped this session; registering again");
                        if let Err(err) = session.rejoin().await {
                            warn!(error = %format!("{err:#}"), "rejoin failed");
                        }
                    }
                    let now_collaborating = beat.collaborator_count > 1;
                    if now_collaborating != collaborating {
                        info!(
                            collaborators = beat.collaborator_count,
                            collaborating = now_collaborating,
                            "presence changed"
                        );
                        collaborating = now_collaborating;
                    }
                    debug!(collaborators = beat.collaborator_count, "heartbeat");
                }
                Err(err) => warn!(error = %format!("{err:#}"), "heartbeat failed"),
            },
            _ = sync_tick.tick(), if collaborating => {
                log_round(session.sync_round().await.map(Some));
            }
            _ = peers_tick.tick(), if collaborating => match session.peers().await {
                Ok(peers) => debug!(peers = peers.len(), "peer selections"),
                Err(err) => warn!(error = %format!("{err:#}"), "peer selections failed"),
            },
            event = events.recv() => match event {
                None => break,
                Some(LocalEvent::Edited(text)) => match session.local_edit(&text) {
                    Ok(true) if collaborating => log_round(session.request_sync().await),
                    Ok(_) => {}
                    Err(err) => warn!(error = %format!("{err:#}"), "local edit failed"),
                },
                Some(LocalEvent::SelectionChanged(selection)) => {
                    if let Err(err) = session.selection_changed(selection).await {
                        warn!(error = %format!("{err:#}"), "selection update failed");
                    }
                }
            },
            _ = time::sleep_until(wake_at), if deadline.is_some() => {
                if let Err(err) = session.flush_selection().await {
                    warn!(error = %format!("{err:#}"), "selection update failed");
                }
                log_round(session.flush_sync().await);
            }
        }
    }

    session.close().await
}

/// An interval whose first tick is one period away.
fn ticker(every: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn log_round(result: Result<Option<RoundSummary>>) {
    match result {
        Ok(Some(summary)) if summary.deferred => debug!("sync deferred"),
        Ok(Some(summary)) if summary.sent_hunks + summary.received_hunks > 0 => debug!(
            sent = summary.sent_hunks,
            received = summary.received_hunks,
            "sync round"
        ),
        Ok(_) => {}
        Err(err) => warn!(error = %format!("{err:#}"), "sync failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tandem_common::path::DocumentPath;
    use tandem_common::types::{Position, Selection};
    use tandem_relay::app::build_router;
    use tandem_relay::state::RelayState;
    use tandem_relay::store::{Stores, WorkingCopies};
    use tokio::sync::{mpsc, oneshot};
    use url::Url;

    use super::{run, LocalEvent, RuntimeOptions};
    use crate::client::RelayClient;
    use crate::config::Settings;
    use crate::session::{CollabSession, TextBuffer};

    const FAST: RuntimeOptions = RuntimeOptions {
        heartbeat_every: Duration::from_millis(100),
        sync_every: Duration::from_millis(50),
        peers_every: Duration::from_millis(50),
    };

    async fn live_relay() -> (tempfile::TempDir, RelayState, Url) {
        let workspace = tempfile::tempdir().expect("tempdir");
        let state = RelayState::with_stores(
            Stores::in_memory(),
            WorkingCopies::new(workspace.path().join(".copies")),
            workspace.path(),
            Duration::from_secs(5),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let router = build_router(state.clone(), None);
        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("relay should serve");
        });
        let url = Url::parse(&format!("http://{addr}")).expect("url");
        (workspace, state, url)
    }

    fn client(url: &Url, collaborator: &str) -> RelayClient {
        RelayClient::new(&Settings {
            relay_url: url.clone(),
            collaborator: collaborator.to_owned(),
        })
        .expect("client")
    }

    fn todo_fingerprint() -> String {
        DocumentPath::parse("todo.md").expect("path").fingerprint()
    }

    #[tokio::test]
    async fn session_is_registered_while_running_and_left_on_shutdown() {
        let (_workspace, state, url) = live_relay().await;
        let session = CollabSession::new(client(&url, "ada"), "todo.md", TextBuffer::default());

        let (events, receiver) = mpsc::channel(8);
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(run(session, receiver, FAST, async move {
            let _ = stopped.await;
        }));

        events
            .send(LocalEvent::Edited("- [ ] write tests\n".into()))
            .await
            .expect("send edit");
        events
            .send(LocalEvent::SelectionChanged(Selection::cursor(Position { row: 0, column: 2 })))
            .await
            .expect("send selection");
        tokio::time::sleep(Duration::from_millis(400)).await;

        let fingerprint = todo_fingerprint();
        assert!(state.registry.is_registered(&fingerprint, "ada").await.expect("check"));

        stop.send(()).expect("stop");
        let editor = task.await.expect("join").expect("runtime result");
        assert_eq!(editor.as_str(), "- [ ] write tests\n");
        assert!(!state.registry.is_registered(&fingerprint, "ada").await.expect("check"));
    }

    #[tokio::test]
    async fn rounds_wait_for_a_second_collaborator() {
        let (_workspace, state, url) = live_relay().await;
        let fingerprint = todo_fingerprint();
        let session = CollabSession::new(client(&url, "ada"), "todo.md", TextBuffer::default());

        let (events, receiver) = mpsc::channel(8);
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(run(session, receiver, FAST, async move {
            let _ = stopped.await;
        }));

        events
            .send(LocalEvent::Edited("- [ ] alone\n".into()))
            .await
            .expect("send edit");
        tokio::time::sleep(Duration::from_millis(400)).await;

        let server_text = state.shadows.server_text(&fingerprint).await.expect("read");
        assert!(!server_text.unwrap_or_default().contains("alone"));

        let mut grace =
            CollabSession::new(client(&url, "grace"), "todo.md", TextBuffer::default());
        grace.heartbeat().await.expect("grace beats");
        grace.open().await.expect("grace opens");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let server_text = state.shadows.server_text(&fingerprint).await.expect("read");
        assert!(server_text.unwrap_or_default().contains("- [ ] alone"));
        grace.sync_round().await.expect("grace sync");
        assert_eq!(grace.editor().as_str(), "- [ ] alone\n");

        stop.send(()).expect("stop");
        task.await.expect("join").expect("runtime result");
    }
}
