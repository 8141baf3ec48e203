use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tandem_common::diff::{diff, Patch};
use tandem_common::path::DocumentPath;
use tandem_common::types::{Position, Selection};
use tandem_relay::error::SyncError;
use tandem_relay::state::RelayState;
use tandem_relay::store::{Stores, WorkingCopies};

struct Relay {
    _workspace: tempfile::TempDir,
    copies: WorkingCopies,
    state: RelayState,
}

fn relay() -> Relay {
    let workspace = tempfile::tempdir().expect("tempdir");
    std::fs::write(workspace.path().join("draft.md"), "The quick brown fox.\n").expect("seed file");
    let copies = WorkingCopies::new(workspace.path().join(".copies"));
    let state = RelayState::with_stores(
        Stores::in_memory(),
        copies.clone(),
        workspace.path(),
        Duration::from_secs(5),
    );
    Relay {
        _workspace: workspace,
        copies,
        state,
    }
}

fn draft() -> DocumentPath {
    DocumentPath::parse("draft.md").expect("valid path")
}

#[tokio::test]
async fn working_copy_is_removed_with_last_collaborator_and_recreated() {
    let relay = relay();
    let fingerprint = draft().fingerprint();

    relay.state.registry.register(&draft(), "ada").await.expect("register");
    relay.state.registry.register(&draft(), "grace").await.expect("register");
    relay
        .state
        .sync
        .seed_shadow(&draft(), "ada", "The quick brown fox.\n".into())
        .await
        .expect("seed");
    relay
        .state
        .sync
        .sync(&fingerprint, "ada", &diff("The quick brown fox.\n", "The quick red fox.\n"))
        .await
        .expect("sync");
    assert_eq!(
        relay.copies.read(&fingerprint).await.expect("read").as_deref(),
        Some("The quick red fox.\n")
    );

    relay.state.registry.unregister(&draft(), "ada").await.expect("unregister");
    assert!(relay.copies.exists(&fingerprint).await.expect("exists"));
    relay.state.registry.unregister(&draft(), "grace").await.expect("unregister");
    assert!(!relay.copies.exists(&fingerprint).await.expect("exists"));
    assert!(relay.state.shadows.server_text(&fingerprint).await.expect("get").is_none());

    relay.state.registry.register(&draft(), "grace").await.expect("register again");
    assert_eq!(
        relay.copies.read(&fingerprint).await.expect("read").as_deref(),
        Some("The quick brown fox.\n")
    );
}

#[tokio::test]
async fn silent_collaborator_is_swept_once() {
    let relay = relay();
    let fingerprint = draft().fingerprint();
    let start = Utc::now();

    relay.state.presence.heartbeat_at("ada", start).await.expect("heartbeat");
    relay.state.presence.heartbeat_at("grace", start).await.expect("heartbeat");
    relay.state.registry.register(&draft(), "ada").await.expect("register");
    relay.state.registry.register(&draft(), "grace").await.expect("register");
    relay
        .state
        .selections
        .set_selection(&fingerprint, "grace", Selection::cursor(Position { row: 0, column: 4 }))
        .await
        .expect("selection");

    let later = start + TimeDelta::seconds(7);
    let outcome = relay.state.presence.heartbeat_at("ada", later).await.expect("heartbeat");
    assert!(!outcome.newly_connected);
    assert_eq!(outcome.swept, vec!["grace"]);
    assert_eq!(outcome.collaborator_count, 1);
    assert_eq!(
        relay.state.registry.collaborators(&fingerprint).await.expect("list"),
        vec!["ada"]
    );
    assert!(relay
        .state
        .selections
        .selections_for(&fingerprint, "ada")
        .await
        .expect("list")
        .is_empty());

    assert!(relay.state.presence.sweep_at(later).await.expect("sweep").is_empty());
}

/// One client-side round: send local edits, then fold the answer into both
/// the shadow and the local text.
async fn round_trip(
    relay: &Relay,
    fingerprint: &str,
    caller: &str,
    text: &mut String,
    shadow: &mut String,
) {
    let outgoing = diff(shadow, text);
    *shadow = text.clone();
    let round = relay
        .state
        .sync
        .sync(fingerprint, caller, &outgoing)
        .await
        .expect("sync");
    *shadow = round.patch.apply(shadow).0;
    *text = round.patch.apply(text).0;
}

#[tokio::test]
async fn concurrent_writers_converge_after_a_quiet_round() {
    let relay = relay();
    let fingerprint = draft().fingerprint();
    let base = "Title\n\nFirst paragraph stays.\n\nSecond paragraph stays.\n";

    let mut ada_text = base.to_owned();
    let mut grace_text = base.to_owned();
    let mut ada_shadow = base.to_owned();
    let mut grace_shadow = base.to_owned();
    for caller in ["ada", "grace"] {
        relay
            .state
            .sync
            .seed_shadow(&draft(), caller, base.into())
            .await
            .expect("seed");
    }

    ada_text = ada_text.replace("Title", "Better title");
    grace_text = grace_text.replace("Second paragraph", "Second paragraph, revised,");

    round_trip(&relay, &fingerprint, "ada", &mut ada_text, &mut ada_shadow).await;
    round_trip(&relay, &fingerprint, "grace", &mut grace_text, &mut grace_shadow).await;
    round_trip(&relay, &fingerprint, "ada", &mut ada_text, &mut ada_shadow).await;

    let expected = "Better title\n\nFirst paragraph stays.\n\nSecond paragraph, revised, stays.\n";
    assert_eq!(ada_text, expected);
    assert_eq!(grace_text, expected);
    assert_eq!(
        relay.state.shadows.server_text(&fingerprint).await.expect("get").as_deref(),
        Some(expected)
    );
}

#[tokio::test]
async fn sync_during_registration_reports_busy_document() {
    let relay = relay();
    let fingerprint = relay
        .state
        .sync
        .seed_shadow(&draft(), "ada", "text".into())
        .await
        .expect("seed");

    let held = relay.state.locks.acquire(&fingerprint).await;
    let err = relay
        .state
        .sync
        .sync(&fingerprint, "ada", &Patch::default())
        .await
        .expect_err("busy");
    assert!(matches!(err, SyncError::LockUnavailable { .. }));
    assert!(err.retryable());

    drop(held);
    relay
        .state
        .sync
        .sync(&fingerprint, "ada", &Patch::default())
        .await
        .expect("free again");
}
