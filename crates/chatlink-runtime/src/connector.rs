//! Connection to the remote service
//!
//! The wire format and transport are owned by the implementor; the session
//! only needs to know whether each step succeeded and, if not, whether the
//! failure is worth retrying (see [`ConnectError::is_transient`]).

use async_trait::async_trait;
use chatlink_core::ConnectError;

/// Transport and login steps driven by the session state machine
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open the transport to the service
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Log in over the open transport
    async fn authenticate(&self) -> Result<(), ConnectError>;

    /// Drop an established connection before reconnecting or closing
    async fn disconnect(&self) {}
}
