//! Chatlink Core
//!
//! Leaf building blocks of the session engine: the typed component registry,
//! the debounce scheduler, contact records and their local caches, the domain
//! event bus, durable snapshot storage, configuration and error types.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod cache;
pub mod component;
pub mod config;
pub mod debounce;
pub mod errors;
pub mod events;
pub mod storage;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use cache::{
    FriendCache, FriendListCache, GroupMemberCache, GroupMemberCaches, GroupMemberListCache,
    Snapshot, SnapshotFile, CACHE_FORMAT_VERSION,
};
pub use component::{ComponentKey, ComponentRegistry, Presence};
pub use config::{CacheConfig, ReconnectConfig, ReplacePolicy, SessionConfig};
pub use debounce::DebounceJob;
pub use errors::{
    CacheError, CacheResult, ChatlinkError, ChatlinkResult, ComponentError, ComponentResult,
    ConnectError, Result, SessionError, SessionResult, StorageError,
};
pub use events::{ContactEvent, EventBus, Subscription, SubscriptionId};
pub use storage::{CacheStorage, FileStorage, MemoryStorage};
pub use types::{FriendInfo, GroupId, MemberInfo, MemberPermission, Uin};
