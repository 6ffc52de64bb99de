//! Hooks for capabilities built on top of the session
//!
//! Heartbeats, packet dispatch and similar capabilities register their
//! components while the session is connecting and are told to start once the
//! session becomes active.

use chatlink_core::{ComponentRegistry, ComponentResult};

use crate::context::SessionContext;

/// Installs one capability into every new connection's registry
pub trait ComponentInstaller: Send + Sync {
    fn name(&self) -> &'static str;

    /// Register components for a new connection
    fn install(
        &self,
        ctx: &SessionContext,
        registry: &mut ComponentRegistry,
    ) -> ComponentResult<()>;

    /// The session entered `Active`; installed components may begin operating
    fn activate(
        &self,
        _ctx: &SessionContext,
        _registry: &ComponentRegistry,
    ) -> ComponentResult<()> {
        Ok(())
    }
}
