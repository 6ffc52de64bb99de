//! Session lifecycle states and notifications

use core::fmt;
use serde::{Deserialize, Serialize};

/// State of a session's connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Built but never started
    Initialized,
    /// Connecting and authenticating, possibly retrying
    Connecting,
    /// Connected; initial cache/state sync in progress
    Syncing,
    /// Usable by callers
    Active,
    /// Releasing components
    Closing,
    /// Terminal
    Closed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Initialized => "initialized",
            SessionState::Connecting => "connecting",
            SessionState::Syncing => "syncing",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Whether a connection to the service is established in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Syncing | SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current state plus the most recent failure reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub last_failure: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Initialized,
            last_failure: None,
        }
    }
}

/// Notification emitted on every state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub state: SessionState,
    /// Why the transition happened, for failure-driven transitions
    pub failure: Option<String>,
}

impl LifecycleEvent {
    pub fn new(state: SessionState, failure: Option<String>) -> Self {
        Self { state, failure }
    }
}
