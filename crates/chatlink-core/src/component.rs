//! Type-keyed component registry
//!
//! A session is composed of independent capabilities ("components"), each
//! bound under a [`ComponentKey`]. The key carries the capability's type, so
//! lookups are typed and two different capabilities can never collide.
//! Instances are shared as `Arc`s and never cloned: every lookup returns the
//! same instance, so state changed through one handle is visible through all.
//!
//! The registry has no locking of its own; the session serializes access.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::config::ReplacePolicy;
use crate::errors::{ComponentError, ComponentResult};

// ----------------------------------------------------------------------------
// Component Keys
// ----------------------------------------------------------------------------

/// Whether a session build must always contain a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Absence means the session was built inconsistently
    Mandatory,
    /// Absence is a normal state (e.g. a disabled feature)
    Optional,
}

/// Identity of a capability interface `T`
///
/// Define one key per capability, typically as an associated constant:
///
/// ```
/// use chatlink_core::component::ComponentKey;
///
/// pub trait Heartbeat: Send + Sync {
///     fn beat(&self);
/// }
///
/// pub const HEARTBEAT: ComponentKey<dyn Heartbeat> = ComponentKey::optional("heartbeat");
/// ```
pub struct ComponentKey<T: ?Sized + 'static> {
    name: &'static str,
    presence: Presence,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + 'static> ComponentKey<T> {
    /// Key for a component every session build must provide
    pub const fn mandatory(name: &'static str) -> Self {
        Self {
            name,
            presence: Presence::Mandatory,
            _marker: PhantomData,
        }
    }

    /// Key for a component that may legitimately be absent
    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            presence: Presence::Optional,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    fn id(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

impl<T: ?Sized + 'static> Clone for ComponentKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized + 'static> Copy for ComponentKey<T> {}

impl<T: ?Sized + 'static> fmt::Debug for ComponentKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentKey")
            .field("name", &self.name)
            .field("presence", &self.presence)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Component Registry
// ----------------------------------------------------------------------------

type TeardownHook = Box<dyn FnOnce() + Send + Sync>;

struct Entry {
    name: &'static str,
    /// Holds an `Arc<T>` for the key's `T`
    instance: Box<dyn Any + Send + Sync>,
    teardown: Option<TeardownHook>,
}

impl Entry {
    fn tear_down(mut self) {
        if let Some(hook) = self.teardown.take() {
            debug!("Tearing down component {}", self.name);
            hook();
        }
    }
}

/// Store of the components attached to one session
pub struct ComponentRegistry {
    entries: HashMap<TypeId, Entry>,
    /// Registration order, used to tear down in reverse
    order: Vec<TypeId>,
    policy: ReplacePolicy,
    connecting: bool,
}

impl ComponentRegistry {
    /// Create an empty registry with the given duplicate-registration policy
    pub fn new(policy: ReplacePolicy) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            policy,
            connecting: false,
        }
    }

    /// Mark whether the owning session is inside a `Connecting` transition
    ///
    /// Replacement under [`ReplacePolicy::ReplaceOnReconnect`] is only
    /// permitted while this is set.
    pub fn set_connecting(&mut self, connecting: bool) {
        self.connecting = connecting;
    }

    /// Bind `instance` under `key`
    pub fn register<T>(&mut self, key: &ComponentKey<T>, instance: Arc<T>) -> ComponentResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert(key, instance, None)
    }

    /// Bind `instance` under `key` with a hook run when it is replaced or the
    /// registry is cleared
    pub fn register_with_teardown<T, F>(
        &mut self,
        key: &ComponentKey<T>,
        instance: Arc<T>,
        teardown: F,
    ) -> ComponentResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() + Send + Sync + 'static,
    {
        self.insert(key, instance, Some(Box::new(teardown)))
    }

    fn insert<T>(
        &mut self,
        key: &ComponentKey<T>,
        instance: Arc<T>,
        teardown: Option<TeardownHook>,
    ) -> ComponentResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = key.id();

        if self.entries.contains_key(&id) {
            let replace_allowed =
                self.policy == ReplacePolicy::ReplaceOnReconnect && self.connecting;
            if !replace_allowed {
                return Err(ComponentError::Duplicate { name: key.name() });
            }
            if let Some(previous) = self.entries.remove(&id) {
                debug!("Replacing component {}", key.name());
                previous.tear_down();
            }
            self.order.retain(|existing| *existing != id);
        }

        self.entries.insert(
            id,
            Entry {
                name: key.name(),
                instance: Box::new(instance),
                teardown,
            },
        );
        self.order.push(id);
        Ok(())
    }

    /// Look up the component bound under `key`
    ///
    /// Returns `Ok(None)` when an optional component is absent and
    /// [`ComponentError::Missing`] when a mandatory one is.
    pub fn get<T>(&self, key: &ComponentKey<T>) -> ComponentResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.entries.get(&key.id()) {
            Some(entry) => entry
                .instance
                .downcast_ref::<Arc<T>>()
                .cloned()
                .map(Some)
                .ok_or(ComponentError::TypeMismatch { name: key.name() }),
            None => match key.presence() {
                Presence::Optional => Ok(None),
                Presence::Mandatory => Err(ComponentError::Missing { name: key.name() }),
            },
        }
    }

    /// Look up a component that must be present, whatever its key says
    pub fn require<T>(&self, key: &ComponentKey<T>) -> ComponentResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get(key)?
            .ok_or(ComponentError::Missing { name: key.name() })
    }

    /// Whether a component is bound under `key`
    pub fn has<T>(&self, key: &ComponentKey<T>) -> bool
    where
        T: ?Sized + 'static,
    {
        self.entries.contains_key(&key.id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the bound components in registration order
    pub fn component_names(&self) -> Vec<&'static str> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| entry.name))
            .collect()
    }

    /// Remove every component, running teardown hooks in reverse
    /// registration order
    pub fn clear(&mut self) {
        while let Some(id) = self.order.pop() {
            if let Some(entry) = self.entries.remove(&id) {
                entry.tear_down();
            }
        }
        self.entries.clear();
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(ReplacePolicy::default())
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.component_names())
            .field("policy", &self.policy)
            .field("connecting", &self.connecting)
            .finish()
    }
}

impl Drop for ComponentRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
