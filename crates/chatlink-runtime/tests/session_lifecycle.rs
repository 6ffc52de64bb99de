//! Session lifecycle tests
//!
//! These tests drive the session state machine through a scripted connector
//! and verify transitions, retry/backoff behavior, failure classification,
//! reconnects and the terminal `Closed` state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatlink_core::{ComponentError, MemoryStorage};
use chatlink_runtime::*;
use tokio::sync::broadcast;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

/// Connector replaying scripted connect outcomes, succeeding once exhausted
#[derive(Default)]
struct ScriptedConnector {
    outcomes: Mutex<VecDeque<Result<(), ConnectError>>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl ScriptedConnector {
    fn new(outcomes: Vec<Result<(), ConnectError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        })
    }

    fn always_timing_out() -> Arc<Self> {
        Self::new(vec![Err(timeout()); 100])
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<(), ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn authenticate(&self) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn timeout() -> ConnectError {
    ConnectError::Timeout { duration_ms: 5_000 }
}

fn test_config(max_attempts: u32) -> SessionConfig {
    let mut config = SessionConfig::testing();
    config.reconnect.max_attempts = max_attempts;
    config
}

fn build_session(connector: Arc<ScriptedConnector>, config: SessionConfig) -> Session {
    SessionBuilder::new(connector)
        .with_config(config)
        .with_storage(Arc::new(MemoryStorage::new()))
        .build()
        .unwrap()
}

fn drain_states(receiver: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<SessionState> {
    let mut states = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        states.push(event.state);
    }
    states
}

// ----------------------------------------------------------------------------
// Connect and Retry Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_start_reaches_active() {
    let connector = ScriptedConnector::new(vec![]);
    let session = build_session(connector.clone(), test_config(3));
    let mut lifecycle = session.subscribe_lifecycle();

    session.start().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(connector.connects(), 1);
    assert_eq!(
        drain_states(&mut lifecycle),
        vec![
            SessionState::Connecting,
            SessionState::Syncing,
            SessionState::Active
        ]
    );
    assert!(session.has_component(&CACHE_SERVICE));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let connector = ScriptedConnector::new(vec![
        Err(timeout()),
        Err(ConnectError::ConnectionReset {
            reason: "peer reset".into(),
        }),
    ]);
    let session = build_session(connector.clone(), test_config(3));

    session.start().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(connector.connects(), 3);
    assert!(session.status().last_failure.unwrap().contains("peer reset"));
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_after_max_attempts() {
    let connector = ScriptedConnector::always_timing_out();
    let session = build_session(connector.clone(), test_config(3));
    let mut lifecycle = session.subscribe_lifecycle();

    let err = session.start().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::RetriesExhausted {
            attempts: 3,
            last: ConnectError::Timeout { .. }
        }
    ));
    assert_eq!(connector.connects(), 3);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(
        drain_states(&mut lifecycle),
        vec![
            SessionState::Connecting,
            SessionState::Connecting,
            SessionState::Connecting,
            SessionState::Closed
        ]
    );

    // A fourth attempt is never made
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.connects(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_between_attempts() {
    let connector = ScriptedConnector::always_timing_out();
    let mut config = test_config(4);
    config.reconnect.backoff_base_millis = 100;
    config.reconnect.backoff_ceiling_millis = 250;
    let session = build_session(connector, config);

    let started = tokio::time::Instant::now();
    session.start().await.unwrap_err();

    // 100 + 200 + 250 (capped)
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(550), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(560), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_is_not_retried() {
    let connector = ScriptedConnector::new(vec![Err(ConnectError::CredentialsRejected {
        reason: "bad password".into(),
    })]);
    let session = build_session(connector.clone(), test_config(5));

    let err = session.start().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Fatal(ConnectError::CredentialsRejected { .. })
    ));
    assert_eq!(connector.connects(), 1);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.status().last_failure.unwrap().contains("bad password"));
}

// ----------------------------------------------------------------------------
// Reconnect Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_failure_rebuilds_components() {
    let connector = ScriptedConnector::new(vec![]);
    let session = build_session(connector.clone(), test_config(3));
    session.start().await.unwrap();

    let before = session.cache_service().unwrap();
    let mut lifecycle = session.subscribe_lifecycle();

    session.report_failure("heartbeat timeout").await.unwrap();

    let after = session.cache_service().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(before.is_torn_down());
    assert!(!after.is_torn_down());

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(connector.connects(), 2);
    assert_eq!(connector.disconnects(), 1);
    assert_eq!(
        drain_states(&mut lifecycle),
        vec![
            SessionState::Connecting,
            SessionState::Syncing,
            SessionState::Active
        ]
    );
    assert_eq!(
        session.status().last_failure.as_deref(),
        Some("heartbeat timeout")
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_before_start_is_invalid() {
    let session = build_session(ScriptedConnector::new(vec![]), test_config(3));

    assert!(matches!(
        session.reconnect().await,
        Err(SessionError::InvalidTransition {
            from: "initialized",
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_while_connecting_is_noop() {
    let connector = ScriptedConnector::new(vec![Err(timeout()), Err(timeout())]);
    let mut config = test_config(5);
    config.reconnect.backoff_base_millis = 1_000;
    config.reconnect.backoff_ceiling_millis = 1_000;
    let session = Arc::new(build_session(connector.clone(), config));

    let starter = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.state(), SessionState::Connecting);

    session.reconnect().await.unwrap();

    starter.await.unwrap().unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(connector.connects(), 3);
    assert_eq!(connector.disconnects(), 0);
}

// ----------------------------------------------------------------------------
// Close Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_close_releases_components() {
    let connector = ScriptedConnector::new(vec![]);
    let session = build_session(connector.clone(), test_config(3));
    session.start().await.unwrap();
    let service = session.cache_service().unwrap();
    let mut lifecycle = session.subscribe_lifecycle();

    session.close().await.unwrap();

    assert!(service.is_torn_down());
    assert!(!session.has_component(&CACHE_SERVICE));
    assert_eq!(connector.disconnects(), 1);
    assert_eq!(
        drain_states(&mut lifecycle),
        vec![SessionState::Closing, SessionState::Closed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_rejects_operations() {
    let session = build_session(ScriptedConnector::new(vec![]), test_config(3));
    session.start().await.unwrap();
    session.close().await.unwrap();

    assert!(matches!(session.start().await, Err(SessionError::Closed)));
    assert!(matches!(session.reconnect().await, Err(SessionError::Closed)));
    assert!(matches!(
        session.report_failure("io error").await,
        Err(SessionError::Closed)
    ));
    assert!(matches!(session.close().await, Err(SessionError::Closed)));
    assert!(matches!(
        session.component(&CACHE_SERVICE),
        Err(SessionError::Closed)
    ));
    assert!(matches!(
        session.save_friend_cache(),
        Err(SessionError::Closed)
    ));
    assert!(matches!(
        session.friend_cache().await,
        Err(SessionError::Closed)
    ));

    // Read-only inspection keeps working
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.status().state.is_terminal());
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_connect_backoff() {
    let connector = ScriptedConnector::always_timing_out();
    let mut config = test_config(5);
    config.reconnect.backoff_base_millis = 10_000;
    config.reconnect.backoff_ceiling_millis = 10_000;
    let session = Arc::new(build_session(connector.clone(), config));

    let starter = tokio::spawn({
        let session = session.clone();
        async move { session.start().await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    session.close().await.unwrap();

    assert!(matches!(
        starter.await.unwrap(),
        Err(SessionError::Cancelled)
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(connector.connects(), 1);
    assert_eq!(connector.disconnects(), 0);
}

// ----------------------------------------------------------------------------
// Component Installer Tests
// ----------------------------------------------------------------------------

trait Heartbeat: Send + Sync {
    fn is_running(&self) -> bool;
}

#[derive(Default)]
struct TestHeartbeat {
    running: AtomicBool,
}

impl Heartbeat for TestHeartbeat {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

const HEARTBEAT: ComponentKey<dyn Heartbeat> = ComponentKey::optional("heartbeat");

#[derive(Default)]
struct HeartbeatInstaller {
    installed: Mutex<Vec<Arc<TestHeartbeat>>>,
    torn_down: Arc<AtomicUsize>,
    register_twice: bool,
}

impl ComponentInstaller for HeartbeatInstaller {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn install(
        &self,
        _ctx: &SessionContext,
        registry: &mut ComponentRegistry,
    ) -> Result<(), ComponentError> {
        let rounds = if self.register_twice { 2 } else { 1 };
        for _ in 0..rounds {
            let heartbeat = Arc::new(TestHeartbeat::default());
            let torn_down = self.torn_down.clone();
            let instance: Arc<dyn Heartbeat> = heartbeat.clone();
            registry.register_with_teardown(&HEARTBEAT, instance, move || {
                torn_down.fetch_add(1, Ordering::SeqCst);
            })?;
            self.installed.lock().unwrap().push(heartbeat);
        }
        Ok(())
    }

    fn activate(
        &self,
        _ctx: &SessionContext,
        _registry: &ComponentRegistry,
    ) -> Result<(), ComponentError> {
        if let Some(heartbeat) = self.installed.lock().unwrap().last() {
            heartbeat.running.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_installed_component_shared_and_activated() {
    let installer = Arc::new(HeartbeatInstaller::default());
    let session = SessionBuilder::new(ScriptedConnector::new(vec![]))
        .with_config(test_config(3))
        .with_storage(Arc::new(MemoryStorage::new()))
        .add_installer(installer.clone())
        .build()
        .unwrap();

    session.start().await.unwrap();

    let first = session.component(&HEARTBEAT).unwrap().unwrap();
    let second = session.component(&HEARTBEAT).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.is_running());

    session.close().await.unwrap();
    assert_eq!(installer.torn_down.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_registration_fails_fast() {
    let installer = Arc::new(HeartbeatInstaller {
        register_twice: true,
        ..HeartbeatInstaller::default()
    });
    let connector = ScriptedConnector::new(vec![]);
    let session = SessionBuilder::new(connector.clone())
        .with_config(test_config(3))
        .with_storage(Arc::new(MemoryStorage::new()))
        .add_installer(installer)
        .build()
        .unwrap();

    let err = session.start().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Component(ComponentError::Duplicate { name: "heartbeat" })
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(connector.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_replace_policy_tears_down_previous_instance() {
    let installer = Arc::new(HeartbeatInstaller {
        register_twice: true,
        ..HeartbeatInstaller::default()
    });
    let mut config = test_config(3);
    config.component_replace_policy = ReplacePolicy::ReplaceOnReconnect;
    let session = SessionBuilder::new(ScriptedConnector::new(vec![]))
        .with_config(config)
        .with_storage(Arc::new(MemoryStorage::new()))
        .add_installer(installer.clone())
        .build()
        .unwrap();

    session.start().await.unwrap();

    assert_eq!(installer.torn_down.load(Ordering::SeqCst), 1);
    let current = session.component(&HEARTBEAT).unwrap().unwrap();
    assert!(current.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_missing_optional_component_is_absent() {
    let session = build_session(ScriptedConnector::new(vec![]), test_config(3));
    session.start().await.unwrap();

    assert!(session.component(&HEARTBEAT).unwrap().is_none());
}
