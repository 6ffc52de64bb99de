//! Contact Cache Service
//!
//! Owns the in-memory friend list and group member lists of one connection.
//! Each cache is loaded lazily on first access from its snapshot (or starts
//! empty when the snapshot is missing or unreadable), then kept current from
//! the session's [`EventBus`]. Changes are persisted by debounced savers on
//! tokio's blocking pool, so disk I/O never runs on the event path.
//!
//! A disabled cache is never materialized: its accessor returns `None` and
//! its snapshot file is never read or written.

use std::sync::{Arc, Mutex, MutexGuard};

use chatlink_core::{
    CacheConfig, CacheError, CacheResult, CacheStorage, ComponentKey, ContactEvent, DebounceJob,
    EventBus, FriendCache, FriendListCache, GroupMemberCaches, SnapshotFile, Subscription,
    SubscriptionId,
};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::SessionContext;

/// Registry key of the cache service
pub const CACHE_SERVICE: ComponentKey<CacheService> = ComponentKey::mandatory("cache-service");

// ----------------------------------------------------------------------------
// Friend List State
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct FriendState {
    cache: Arc<FriendCache>,
    file: SnapshotFile<FriendListCache>,
    saver: DebounceJob,
}

/// Write the friend list snapshot, returning how many friends were saved
fn save_friends(cache: &FriendCache, file: &SnapshotFile<FriendListCache>) -> CacheResult<usize> {
    let snapshot = cache.snapshot();
    let count = snapshot.list.len();
    file.save_blocking(&snapshot)?;
    info!("Saved {} friends to local cache.", count);
    Ok(count)
}

async fn save_friends_in_background(
    cache: Arc<FriendCache>,
    file: SnapshotFile<FriendListCache>,
) -> CacheResult<usize> {
    tokio::task::spawn_blocking(move || save_friends(&cache, &file))
        .await
        .map_err(|e| CacheError::Background {
            reason: e.to_string(),
        })?
}

// ----------------------------------------------------------------------------
// Cache Service
// ----------------------------------------------------------------------------

/// Local contact caches of one connection
#[derive(Debug)]
pub struct CacheService {
    config: CacheConfig,
    storage: Arc<dyn CacheStorage>,
    events: EventBus,
    cancel: CancellationToken,
    friends: OnceCell<Option<Arc<FriendState>>>,
    groups: OnceCell<Option<Arc<GroupMemberCaches>>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheService {
    pub fn new(ctx: &SessionContext) -> Self {
        Self {
            config: ctx.config().cache.clone(),
            storage: ctx.storage().clone(),
            events: ctx.events().clone(),
            cancel: ctx.cancellation().child_token(),
            friends: OnceCell::new(),
            groups: OnceCell::new(),
            subscriptions: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<SubscriptionId>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscribe(&self) -> Subscription {
        let subscription = self.events.subscribe();
        self.subscriptions().push(subscription.id());
        subscription
    }

    /// The friend list cache, or `None` when friend caching is disabled
    ///
    /// The first call loads the snapshot and starts listening for friend
    /// events; concurrent first calls initialize once.
    pub async fn friend_cache(&self) -> Option<Arc<FriendCache>> {
        self.friends
            .get_or_init(|| self.init_friends())
            .await
            .as_ref()
            .map(|state| state.cache.clone())
    }

    async fn init_friends(&self) -> Option<Arc<FriendState>> {
        if !self.config.friend_list_cache_enabled {
            debug!("Friend list cache disabled");
            return None;
        }

        let file = SnapshotFile::new(self.storage.clone(), self.config.friend_cache_file.clone());
        let cache = Arc::new(FriendCache::new(file.load_or_default().await));
        debug!("Loaded {} friends from local cache", cache.len());

        let saver = {
            let cache = cache.clone();
            let file = file.clone();
            DebounceJob::spawn(
                "friend-cache-saver",
                self.config.save_interval(),
                &self.cancel,
                move || {
                    let save = save_friends_in_background(cache.clone(), file.clone());
                    async move { save.await.map(|_| ()) }
                },
            )
        };

        let state = Arc::new(FriendState { cache, file, saver });
        self.spawn_friend_listener(state.clone());
        Some(state)
    }

    fn spawn_friend_listener(&self, state: Arc<FriendState>) {
        let mut subscription = self.subscribe();
        let cancel = self.cancel.clone();

        let listener = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        // Events already delivered are still applied
                        while let Some(event) = subscription.try_recv() {
                            if state.cache.apply(&event) {
                                state.saver.notice();
                            }
                        }
                        break;
                    }
                    event = subscription.recv() => {
                        let Some(event) = event else { break };
                        if state.cache.apply(&event) {
                            state.saver.notice();
                        }
                    }
                }
            }
            debug!("Friend cache listener stopped");
        });
        self.listeners().push(listener);
    }

    /// The group member caches, or `None` when group caching is disabled
    pub async fn group_member_caches(&self) -> Option<Arc<GroupMemberCaches>> {
        self.groups.get_or_init(|| self.init_groups()).await.clone()
    }

    async fn init_groups(&self) -> Option<Arc<GroupMemberCaches>> {
        if !self.config.group_member_list_cache_enabled {
            debug!("Group member list cache disabled");
            return None;
        }

        let groups = Arc::new(GroupMemberCaches::new(
            self.storage.clone(),
            self.config.clone(),
            &self.cancel,
        ));

        let mut subscription = self.subscribe();
        let cancel = self.cancel.clone();
        let listener_groups = groups.clone();
        let listener = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        while let Some(event) = subscription.try_recv() {
                            listener_groups.apply(&event).await;
                        }
                        break;
                    }
                    event = subscription.recv() => {
                        let Some(event) = event else { break };
                        listener_groups.apply(&event).await;
                    }
                }
            }
            debug!("Group member cache listener stopped");
        });
        self.listeners().push(listener);

        Some(groups)
    }

    /// Materialize every enabled cache
    pub async fn preload(&self) {
        self.friend_cache().await;
        self.group_member_caches().await;
    }

    /// Write the friend list snapshot now, on the calling thread
    ///
    /// Returns the number of friends saved, or `None` when friend caching is
    /// disabled or the cache has not been loaded yet.
    pub fn save_friend_cache(&self) -> CacheResult<Option<usize>> {
        let Some(Some(state)) = self.friends.get() else {
            return Ok(None);
        };
        state.saver.take_pending();
        match save_friends(&state.cache, &state.file) {
            Ok(count) => Ok(Some(count)),
            Err(e) => {
                state.saver.notice();
                Err(e)
            }
        }
    }

    /// Persist every cache with unsaved changes, returning how many
    /// snapshots were written
    pub async fn flush(&self) -> usize {
        let mut written = 0;

        if let Some(Some(state)) = self.friends.get() {
            if state.saver.take_pending() {
                match save_friends_in_background(state.cache.clone(), state.file.clone()).await {
                    Ok(_) => written += 1,
                    Err(e) => {
                        warn!("Failed to flush friend cache: {}", e);
                        state.saver.notice();
                    }
                }
            }
        }

        if let Some(Some(groups)) = self.groups.get() {
            written += groups.flush().await;
        }

        written
    }

    fn release_subscriptions(&self) {
        let ids: Vec<SubscriptionId> = self.subscriptions().drain(..).collect();
        for id in ids {
            self.events.unsubscribe(id);
        }
    }

    /// Stop listening, apply every event already delivered, then persist
    /// all unsaved changes and stop the savers
    ///
    /// Returns how many snapshots were written.
    pub async fn shutdown(&self) -> usize {
        self.release_subscriptions();

        let listeners: Vec<JoinHandle<()>> = self.listeners().drain(..).collect();
        for listener in listeners {
            if let Err(e) = listener.await {
                warn!("Cache listener ended abnormally: {}", e);
            }
        }

        let written = self.flush().await;
        self.cancel.cancel();
        written
    }

    /// Stop savers and listeners and release event subscriptions
    pub fn teardown(&self) {
        self.cancel.cancel();
        self.release_subscriptions();
        debug!("Cache service torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
