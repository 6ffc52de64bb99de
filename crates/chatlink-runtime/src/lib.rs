//! Chatlink Runtime
//!
//! The session lifecycle engine built on `chatlink-core`:
//! - `Session`: the connection state machine that owns the component registry
//! - `CacheService`: the contact cache component with debounced persistence
//! - `Connector`: the transport/login seam driven by the session
//! - `Backoff`: the retry delay policy for transient connect failures

pub mod backoff;
pub mod builder;
pub mod cache_service;
pub mod connector;
pub mod context;
pub mod installer;
pub mod session;
pub mod state;

pub use backoff::Backoff;
pub use builder::SessionBuilder;
pub use cache_service::{CacheService, CACHE_SERVICE};
pub use connector::Connector;
pub use context::SessionContext;
pub use installer::ComponentInstaller;
pub use session::Session;
pub use state::{LifecycleEvent, SessionState, SessionStatus};

// Re-export core types for convenience
pub use chatlink_core::{
    CacheConfig, ChatlinkError, ChatlinkResult, ComponentKey, ComponentRegistry, ConnectError,
    ContactEvent, EventBus, ReconnectConfig, ReplacePolicy, SessionConfig, SessionError,
    SessionResult,
};
