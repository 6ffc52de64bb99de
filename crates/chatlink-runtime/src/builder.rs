//! Session Builder API
//!
//! Collects the connector, configuration, storage and installers for a
//! session and validates the configuration before anything is created.

use std::sync::Arc;

use chatlink_core::{
    CacheStorage, ChatlinkError, ChatlinkResult, EventBus, FileStorage, SessionConfig,
};
use tracing::info;

use crate::connector::Connector;
use crate::installer::ComponentInstaller;
use crate::session::Session;

// ----------------------------------------------------------------------------
// Session Builder
// ----------------------------------------------------------------------------

/// Builder for a [`Session`]
pub struct SessionBuilder {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    storage: Option<Arc<dyn CacheStorage>>,
    events: Option<EventBus>,
    installers: Vec<Arc<dyn ComponentInstaller>>,
}

impl SessionBuilder {
    /// Create a builder for sessions connecting through `connector`
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            config: SessionConfig::default(),
            storage: None,
            events: None,
            installers: Vec::new(),
        }
    }

    /// Set the session configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Store cache snapshots in `storage` instead of under `cache.cache_dir`
    pub fn with_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Share an existing event bus with the session
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Add a capability installed on every connection
    pub fn add_installer(mut self, installer: Arc<dyn ComponentInstaller>) -> Self {
        self.installers.push(installer);
        self
    }

    /// Validate the configuration and build the session (not yet started)
    pub fn build(self) -> ChatlinkResult<Session> {
        self.config.validate().map_err(ChatlinkError::config_error)?;

        let storage = self
            .storage
            .unwrap_or_else(|| {
                Arc::new(FileStorage::new(&self.config.cache.cache_dir)) as Arc<dyn CacheStorage>
            });
        info!(
            "Building session (friend cache: {}, group cache: {}, {} installer(s))",
            self.config.cache.friend_list_cache_enabled,
            self.config.cache.group_member_list_cache_enabled,
            self.installers.len()
        );

        Ok(Session::new(
            self.config,
            self.connector,
            storage,
            self.events.unwrap_or_default(),
            self.installers,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatlink_core::ConnectError;

    struct NoopConnector;

    #[async_trait]
    impl Connector for NoopConnector {
        async fn connect(&self) -> Result<(), ConnectError> {
            Ok(())
        }

        async fn authenticate(&self) -> Result<(), ConnectError> {
            Ok(())
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SessionConfig::default();
        config.cache.save_interval_millis = 0;

        let result = SessionBuilder::new(Arc::new(NoopConnector))
            .with_config(config)
            .build();
        assert!(matches!(result, Err(ChatlinkError::Configuration { .. })));
    }

    #[test]
    fn test_built_session_is_initialized() {
        let session = SessionBuilder::new(Arc::new(NoopConnector)).build().unwrap();
        assert_eq!(session.state(), crate::SessionState::Initialized);
    }
}
