// Heartbeat-driven liveness. A collaborator is connected while its heartbeat
// record is fresh; stale collaborators are swept out of every document on the
// next heartbeat from anyone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::registry::SessionRegistry;
use crate::selection::SelectionBroadcaster;
use crate::store::{Filter, HeartbeatRecord, RecordStore, Stores};

/// Extension points around connection changes.
#[async_trait]
pub trait PresenceHooks: Send + Sync {
    async fn on_connect(&self, _collaborator: &str) {}

    async fn on_disconnect(&self, _collaborator: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl PresenceHooks for NoopHooks {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    /// Collaborators still connected after the sweep.
    pub collaborator_count: usize,
    /// The caller had no fresh heartbeat before this one.
    pub newly_connected: bool,
    /// Collaborators disconnected by the sweep that followed.
    pub swept: Vec<String>,
}

#[derive(Clone)]
pub struct PresenceMonitor {
    heartbeats: Arc<dyn RecordStore<HeartbeatRecord>>,
    registry: SessionRegistry,
    selections: SelectionBroadcaster,
    hooks: Arc<dyn PresenceHooks>,
    interval: TimeDelta,
}

impl PresenceMonitor {
    pub fn new(
        stores: &Stores,
        registry: SessionRegistry,
        selections: SelectionBroadcaster,
        interval: Duration,
    ) -> Self {
        Self {
            heartbeats: Arc::clone(&stores.heartbeats),
            registry,
            selections,
            hooks: Arc::new(NoopHooks),
            interval: TimeDelta::milliseconds(interval.as_millis() as i64),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn PresenceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Silence after which a returning collaborator counts as a new session.
    fn reconnect_threshold(&self) -> TimeDelta {
        self.interval * 3 / 2
    }

    pub async fn heartbeat(&self, caller: &str) -> Result<HeartbeatOutcome, SyncError> {
        self.heartbeat_at(caller, Utc::now()).await
    }

    pub async fn heartbeat_at(
        &self,
        caller: &str,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatOutcome, SyncError> {
        let previous = self
            .heartbeats
            .find(&Filter::Key(caller.to_owned()))
            .await?;

        let newly_connected = match &previous {
            None => true,
            Some(record) => now - record.last_seen > self.reconnect_threshold(),
        };

        if newly_connected {
            if previous.is_some() {
                debug!(collaborator = caller, "clearing stale session before reconnect");
                self.end_session(caller).await?;
            }
            self.hooks.on_connect(caller).await;
            info!(collaborator = caller, "collaborator connected");
        }

        self.heartbeats
            .upsert(HeartbeatRecord {
                collaborator: caller.to_owned(),
                last_seen: now,
            })
            .await?;

        let swept = self.sweep_at(now).await?;
        let collaborator_count = self.connected_count().await?;

        Ok(HeartbeatOutcome {
            collaborator_count,
            newly_connected,
            swept,
        })
    }

    /// Disconnects every collaborator whose last heartbeat is older than the
    /// interval. Returns them sorted.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<Vec<String>, SyncError> {
        let interval = self.interval;
        let mut stale: Vec<String> = self
            .heartbeats
            .find_all(&Filter::matching(move |record: &HeartbeatRecord| {
                now - record.last_seen > interval
            }))
            .await?
            .into_iter()
            .map(|record| record.collaborator)
            .collect();
        stale.sort();

        for collaborator in &stale {
            self.end_session(collaborator).await?;
            self.heartbeats
                .delete(&Filter::Key(collaborator.clone()))
                .await?;
            info!(collaborator = %collaborator, "collaborator timed out");
        }
        Ok(stale)
    }

    pub async fn connected_count(&self) -> Result<usize, SyncError> {
        Ok(self.heartbeats.find_all(&Filter::All).await?.len())
    }

    async fn end_session(&self, collaborator: &str) -> Result<(), SyncError> {
        let left = self.registry.unregister_all(collaborator).await?;
        let cleared = self.selections.clear_all_for(collaborator).await?;
        debug!(
            collaborator,
            documents = left.len(),
            selections = cleared,
            "session state cleared"
        );
        self.hooks.on_disconnect(collaborator).await;
        Ok(())
    }
}
