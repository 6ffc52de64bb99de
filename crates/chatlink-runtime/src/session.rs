//! Session State Machine
//!
//! A [`Session`] owns the component registry and drives the connection
//! lifecycle:
//!
//! ```text
//! Initialized -> Connecting -> Syncing -> Active
//!                    ^  |                   |
//!                    |  +-> Closed          | failure / reconnect
//!                    +----------------------+
//! any non-terminal state -> Closing -> Closed
//! ```
//!
//! Transitions are serialized by a single async lock held for the whole
//! transition, including connect retries and the initial sync. `close()`
//! interrupts an in-flight connect or backoff through the shutdown token
//! before it waits for that lock.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chatlink_core::{
    CacheStorage, ComponentKey, ComponentRegistry, ComponentResult, ConnectError, EventBus,
    FriendCache, SessionConfig, SessionError, SessionResult,
};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::cache_service::{CacheService, CACHE_SERVICE};
use crate::connector::Connector;
use crate::context::SessionContext;
use crate::installer::ComponentInstaller;
use crate::state::{LifecycleEvent, SessionState, SessionStatus};

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// A long-lived authenticated session with the remote service
pub struct Session {
    config: Arc<SessionConfig>,
    connector: Arc<dyn Connector>,
    storage: Arc<dyn CacheStorage>,
    events: EventBus,
    installers: Vec<Arc<dyn ComponentInstaller>>,
    backoff: Backoff,

    transition: Mutex<()>,
    status: RwLock<SessionStatus>,
    registry: RwLock<ComponentRegistry>,
    /// Context of the current connection, if one is established
    context: RwLock<Option<SessionContext>>,
    /// Interrupts connect attempts and backoff waits; cancelled by `close`
    shutdown: CancellationToken,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        storage: Arc<dyn CacheStorage>,
        events: EventBus,
        installers: Vec<Arc<dyn ComponentInstaller>>,
    ) -> Self {
        let (lifecycle, _) = broadcast::channel(config.lifecycle_buffer.max(1));
        let backoff = Backoff::from_config(&config.reconnect);
        let registry = ComponentRegistry::new(config.component_replace_policy);

        Self {
            config: Arc::new(config),
            connector,
            storage,
            events,
            installers,
            backoff,
            transition: Mutex::new(()),
            status: RwLock::new(SessionStatus::default()),
            registry: RwLock::new(registry),
            context: RwLock::new(None),
            shutdown: CancellationToken::new(),
            lifecycle,
        }
    }

    // ------------------------------------------------------------------------
    // Read-only inspection
    // ------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.status_ref().state
    }

    pub fn status(&self) -> SessionStatus {
        self.status_ref().clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The domain event bus feeding this session's caches
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Receive a notification for every subsequent state transition
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    // ------------------------------------------------------------------------
    // Component access
    // ------------------------------------------------------------------------

    /// Look up a component of the current connection
    pub fn component<T>(&self, key: &ComponentKey<T>) -> SessionResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.ensure_open()?;
        Ok(self.registry_ref().get(key)?)
    }

    pub fn has_component<T>(&self, key: &ComponentKey<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.registry_ref().has(key)
    }

    pub fn cache_service(&self) -> SessionResult<Arc<CacheService>> {
        self.ensure_open()?;
        Ok(self.registry_ref().require(&CACHE_SERVICE)?)
    }

    /// The friend list cache, or `None` when friend caching is disabled
    pub async fn friend_cache(&self) -> SessionResult<Option<Arc<FriendCache>>> {
        let service = self.cache_service()?;
        Ok(service.friend_cache().await)
    }

    /// Force the friend list snapshot to disk
    pub fn save_friend_cache(&self) -> SessionResult<Option<usize>> {
        Ok(self.cache_service()?.save_friend_cache()?)
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Connect, authenticate, sync and become active
    pub async fn start(&self) -> SessionResult<()> {
        let _guard = self.transition.lock().await;

        match self.state() {
            SessionState::Initialized => {}
            SessionState::Closing | SessionState::Closed => return Err(SessionError::Closed),
            other => {
                return Err(SessionError::InvalidTransition {
                    from: other.name(),
                    trigger: "start",
                })
            }
        }

        info!("Starting session");
        self.establish(None).await
    }

    /// Tear down the current connection and connect again
    ///
    /// A no-op while the session is already connecting.
    pub async fn reconnect(&self) -> SessionResult<()> {
        self.restart("reconnect", None).await
    }

    /// Report a heartbeat timeout or I/O error on the live connection
    pub async fn report_failure<R: Into<String>>(&self, reason: R) -> SessionResult<()> {
        self.restart("failure", Some(reason.into())).await
    }

    /// Flush caches, release all components and close for good
    pub async fn close(&self) -> SessionResult<()> {
        self.ensure_open()?;
        self.shutdown.cancel();

        let _guard = self.transition.lock().await;
        let from = self.state();
        if from.is_terminal() {
            return Err(SessionError::Closed);
        }

        self.set_state(SessionState::Closing, None);
        self.teardown_connection(from.is_connected()).await;
        self.set_state(SessionState::Closed, None);
        Ok(())
    }

    async fn restart(&self, trigger: &'static str, reason: Option<String>) -> SessionResult<()> {
        if self.state() == SessionState::Connecting {
            debug!("Ignoring {} while already connecting", trigger);
            return Ok(());
        }

        let _guard = self.transition.lock().await;

        match self.state() {
            SessionState::Syncing | SessionState::Active => {}
            SessionState::Connecting => return Ok(()),
            SessionState::Closing | SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Initialized => {
                return Err(SessionError::InvalidTransition {
                    from: SessionState::Initialized.name(),
                    trigger,
                })
            }
        }

        match &reason {
            Some(reason) => warn!("Connection failed: {}", reason),
            None => info!("Reconnect requested"),
        }

        self.teardown_connection(true).await;
        self.establish(reason).await
    }

    /// Run `Connecting -> Syncing -> Active`; caller holds the transition lock
    async fn establish(&self, reason: Option<String>) -> SessionResult<()> {
        let ctx = SessionContext::new(
            self.config.clone(),
            self.events.clone(),
            self.storage.clone(),
            CancellationToken::new(),
        );
        {
            let mut registry = self.registry_mut();
            *registry = ComponentRegistry::new(self.config.component_replace_policy);
            registry.set_connecting(true);
        }
        *self.context_mut() = Some(ctx.clone());
        self.set_state(SessionState::Connecting, reason);

        match self.connect_with_retry().await {
            Ok(()) => {}
            Err(SessionError::Cancelled) => return Err(SessionError::Cancelled),
            Err(e) => return Err(self.abort(e, false).await),
        }

        let service = Arc::new(CacheService::new(&ctx));
        if let Err(e) = self.install_components(&ctx, &service) {
            error!("Session build failed: {}", e);
            return Err(self.abort(e.into(), true).await);
        }

        self.set_state(SessionState::Syncing, None);
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(SessionError::Cancelled),
            _ = service.preload() => {}
        }

        self.set_state(SessionState::Active, None);
        if let Err(e) = self.activate_components(&ctx) {
            error!("Component activation failed: {}", e);
            return Err(self.abort(e.into(), true).await);
        }
        Ok(())
    }

    async fn connect_with_retry(&self) -> SessionResult<()> {
        let max_attempts = self.config.reconnect.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Connect attempt {}/{}", attempt, max_attempts);

            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(SessionError::Cancelled),
                result = self.connect_once() => result,
            };

            let error = match result {
                Ok(()) => {
                    info!("Connected after {} attempt(s)", attempt);
                    return Ok(());
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                error!("Connect failed permanently: {}", error);
                return Err(SessionError::Fatal(error));
            }
            if attempt >= max_attempts {
                error!("Giving up after {} connect attempts: {}", attempt, error);
                return Err(SessionError::RetriesExhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.backoff.delay(attempt);
            self.set_state(
                SessionState::Connecting,
                Some(format!("{error}; retrying in {}ms", delay.as_millis())),
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(SessionError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_once(&self) -> Result<(), ConnectError> {
        self.connector.connect().await?;
        self.connector.authenticate().await
    }

    fn install_components(
        &self,
        ctx: &SessionContext,
        service: &Arc<CacheService>,
    ) -> ComponentResult<()> {
        let mut registry = self.registry_mut();

        let hook = service.clone();
        registry.register_with_teardown(&CACHE_SERVICE, service.clone(), move || hook.teardown())?;

        for installer in &self.installers {
            debug!("Installing {}", installer.name());
            installer.install(ctx, &mut registry)?;
        }

        registry.set_connecting(false);
        debug!("Registered components: {:?}", registry.component_names());
        Ok(())
    }

    fn activate_components(&self, ctx: &SessionContext) -> ComponentResult<()> {
        let registry = self.registry_ref();
        for installer in &self.installers {
            debug!("Activating {}", installer.name());
            installer.activate(ctx, &registry)?;
        }
        Ok(())
    }

    /// Flush caches, release components and drop the connection
    async fn teardown_connection(&self, connected: bool) {
        let service = {
            let registry = self.registry_ref();
            registry.get(&CACHE_SERVICE).ok().flatten()
        };
        if let Some(service) = service {
            let written = service.shutdown().await;
            if written > 0 {
                debug!("Flushed {} cache snapshot(s)", written);
            }
        }

        self.registry_mut().clear();
        if let Some(ctx) = self.context_mut().take() {
            ctx.cancellation().cancel();
        }
        if connected {
            self.connector.disconnect().await;
        }
    }

    /// Move straight to `Closed` after a failure that must not be retried
    async fn abort(&self, error: SessionError, connected: bool) -> SessionError {
        self.teardown_connection(connected).await;
        self.shutdown.cancel();
        self.set_state(SessionState::Closed, Some(error.to_string()));
        error
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn ensure_open(&self) -> SessionResult<()> {
        if self.state().is_terminal() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SessionState, failure: Option<String>) {
        let previous = {
            let mut status = self.status_mut();
            let previous = status.state;
            status.state = state;
            if failure.is_some() {
                status.last_failure = failure.clone();
            }
            previous
        };

        match &failure {
            Some(reason) => warn!("Session {} -> {}: {}", previous, state, reason),
            None => info!("Session {} -> {}", previous, state),
        }

        // No receivers is fine
        let _ = self.lifecycle.send(LifecycleEvent::new(state, failure));
    }

    fn status_ref(&self) -> RwLockReadGuard<'_, SessionStatus> {
        self.status.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn status_mut(&self) -> RwLockWriteGuard<'_, SessionStatus> {
        self.status.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn registry_ref(&self) -> RwLockReadGuard<'_, ComponentRegistry> {
        self.registry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, ComponentRegistry> {
        self.registry.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn context_mut(&self) -> RwLockWriteGuard<'_, Option<SessionContext>> {
        self.context.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &*self.status_ref())
            .field("components", &self.registry_ref().component_names())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(ctx) = self.context_mut().take() {
            ctx.cancellation().cancel();
        }
    }
}
