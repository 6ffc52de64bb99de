//! Per-connection context handed to components

use std::sync::Arc;

use chatlink_core::{CacheStorage, EventBus, SessionConfig};
use tokio_util::sync::CancellationToken;

/// What a component needs from its session
///
/// The cancellation token is scoped to one connection: it is cancelled when
/// the session reconnects or closes, and every background task a component
/// spawns must stop with it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    config: Arc<SessionConfig>,
    events: EventBus,
    storage: Arc<dyn CacheStorage>,
    cancel: CancellationToken,
}

impl SessionContext {
    pub fn new(
        config: Arc<SessionConfig>,
        events: EventBus,
        storage: Arc<dyn CacheStorage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            events,
            storage,
            cancel,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}
