use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::locks::DocumentLocks;
use crate::presence::{PresenceHooks, PresenceMonitor};
use crate::registry::SessionRegistry;
use crate::selection::SelectionBroadcaster;
use crate::shadow::ShadowStore;
use crate::store::{Stores, WorkingCopies};
use crate::sync::SyncCoordinator;

/// Everything an action handler needs. Cheap to clone.
#[derive(Clone)]
pub struct RelayState {
    pub locks: DocumentLocks,
    pub shadows: ShadowStore,
    pub registry: SessionRegistry,
    pub selections: SelectionBroadcaster,
    pub presence: PresenceMonitor,
    pub sync: SyncCoordinator,
}

impl RelayState {
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_stores(
            Stores::in_memory(),
            WorkingCopies::new(&config.data_dir),
            &config.workspace_root,
            config.heartbeat_interval,
        )
    }

    pub fn with_stores(
        stores: Stores,
        working_copies: WorkingCopies,
        workspace_root: &Path,
        heartbeat_interval: Duration,
    ) -> Self {
        let locks = DocumentLocks::default();
        let shadows = ShadowStore::new(&stores, working_copies.clone());
        let registry = SessionRegistry::new(
            &stores,
            shadows.clone(),
            working_copies,
            locks.clone(),
            workspace_root,
        );
        let selections = SelectionBroadcaster::new(&stores, registry.clone());
        let presence = PresenceMonitor::new(
            &stores,
            registry.clone(),
            selections.clone(),
            heartbeat_interval,
        );
        let sync = SyncCoordinator::new(registry.clone(), shadows.clone(), locks.clone());

        Self {
            locks,
            shadows,
            registry,
            selections,
            presence,
            sync,
        }
    }

    pub fn with_presence_hooks(mut self, hooks: Arc<dyn PresenceHooks>) -> Self {
        self.presence = self.presence.with_hooks(hooks);
        self
    }
}
