//! Error types for the chatlink session engine
//!
//! This module contains the error types shared by the core crate and the
//! runtime: component registry errors, durable storage errors, cache errors,
//! connection errors and session lifecycle errors, plus the `ChatlinkError`
//! type that unifies them all.

use std::path::PathBuf;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Component registry errors
///
/// All of these indicate an inconsistent session build rather than a runtime
/// condition, so callers should not retry them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentError {
    #[error("Component {name} is already registered")]
    Duplicate { name: &'static str },
    #[error("Mandatory component {name} is not registered")]
    Missing { name: &'static str },
    #[error("Component {name} is registered with an unexpected type")]
    TypeMismatch { name: &'static str },
}

/// Durable storage errors
///
/// `NotFound` and `Corrupt` are reported separately from other I/O failures so
/// that cache loading can treat them as "start empty".
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Snapshot not found: {path}")]
    NotFound { path: PathBuf },
    #[error("Snapshot unreadable at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether the error means the snapshot should be treated as absent
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StorageError::NotFound { .. } | StorageError::Corrupt { .. })
    }
}

/// Contact cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to encode cache snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Failed to decode cache snapshot: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Unsupported cache format version {found} (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },
    #[error("Background cache task failed: {reason}")]
    Background { reason: String },
}

impl CacheError {
    /// Whether a load failure is the ordinary "no usable snapshot" case, as
    /// opposed to a storage fault worth a warning. Both start from empty.
    pub fn is_expected_on_load(&self) -> bool {
        match self {
            CacheError::Storage(err) => err.is_recoverable(),
            CacheError::Decode(_) | CacheError::UnsupportedVersion { .. } => true,
            CacheError::Encode(_) | CacheError::Background { .. } => false,
        }
    }
}

/// Failures while connecting to or authenticating with the remote service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("Connection attempt timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Connection reset by remote: {reason}")]
    ConnectionReset { reason: String },
    #[error("Server busy: {reason}")]
    ServerBusy { reason: String },
    #[error("Credentials rejected: {reason}")]
    CredentialsRejected { reason: String },
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
    #[error("Account banned by server: {reason}")]
    Banned { reason: String },
}

impl ConnectError {
    /// Transient failures are retried under backoff; everything else closes
    /// the session immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectError::Timeout { .. }
                | ConnectError::ConnectionReset { .. }
                | ConnectError::ServerBusy { .. }
        )
    }
}

/// Session lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is closed")]
    Closed,
    #[error("Gave up connecting after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ConnectError },
    #[error("Fatal connection failure: {0}")]
    Fatal(ConnectError),
    #[error("Invalid session transition from {from} on {trigger}")]
    InvalidTransition {
        from: &'static str,
        trigger: &'static str,
    },
    #[error("Session operation cancelled")]
    Cancelled,
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for chatlink
#[derive(Debug, thiserror::Error)]
pub enum ChatlinkError {
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ChatlinkError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ChatlinkError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a session-closed error
    pub fn session_closed() -> Self {
        ChatlinkError::Session(SessionError::Closed)
    }
}

impl StorageError {
    /// Wrap an I/O error with the path it happened on
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a corrupt-snapshot error
    pub fn corrupt<P: Into<PathBuf>, R: Into<String>>(path: P, reason: R) -> Self {
        StorageError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, ChatlinkError>;
pub type ChatlinkResult<T> = Result<T>;
pub type ComponentResult<T> = core::result::Result<T, ComponentError>;
pub type CacheResult<T> = core::result::Result<T, CacheError>;
pub type SessionResult<T> = core::result::Result<T, SessionError>;
