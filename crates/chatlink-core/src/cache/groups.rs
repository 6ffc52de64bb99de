//! Per-group member list mirrors
//!
//! Each group has its own snapshot file and its own debounced saver. Groups
//! are loaded lazily the first time they are touched; concurrent first
//! accesses of the same group load it once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{Snapshot, SnapshotFile, CACHE_FORMAT_VERSION};
use crate::config::CacheConfig;
use crate::debounce::DebounceJob;
use crate::errors::CacheResult;
use crate::events::ContactEvent;
use crate::storage::CacheStorage;
use crate::types::{GroupId, MemberInfo, Uin};

/// Persisted form of one group's member list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMemberListCache {
    pub version: u32,
    /// Server-side member count sequence this snapshot was built from
    #[serde(default)]
    pub troop_member_num_seq: i64,
    #[serde(default)]
    pub list: Vec<MemberInfo>,
}

impl Default for GroupMemberListCache {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            troop_member_num_seq: 0,
            list: Vec::new(),
        }
    }
}

impl Snapshot for GroupMemberListCache {
    fn version(&self) -> u32 {
        self.version
    }
}

// ----------------------------------------------------------------------------
// Group Member Cache
// ----------------------------------------------------------------------------

/// Shared, mutable member list of a single group
#[derive(Debug, Default)]
pub struct GroupMemberCache {
    inner: RwLock<GroupMemberListCache>,
}

impl GroupMemberCache {
    pub fn new(snapshot: GroupMemberListCache) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, GroupMemberListCache> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GroupMemberListCache> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().list.is_empty()
    }

    pub fn get(&self, uin: Uin) -> Option<MemberInfo> {
        self.read().list.iter().find(|m| m.uin == uin).cloned()
    }

    pub fn members(&self) -> Vec<MemberInfo> {
        self.read().list.clone()
    }

    pub fn member_seq(&self) -> i64 {
        self.read().troop_member_num_seq
    }

    /// Insert or update a member, returning whether the cache changed
    pub fn upsert(&self, member: MemberInfo) -> bool {
        let mut cache = self.write();
        match cache.list.iter_mut().find(|m| m.uin == member.uin) {
            Some(existing) if *existing == member => false,
            Some(existing) => {
                *existing = member;
                true
            }
            None => {
                cache.list.push(member);
                true
            }
        }
    }

    pub fn remove(&self, uin: Uin) -> bool {
        let mut cache = self.write();
        let before = cache.list.len();
        cache.list.retain(|m| m.uin != uin);
        cache.list.len() != before
    }

    pub fn replace_all(&self, members: Vec<MemberInfo>, member_seq: i64) {
        let mut cache = self.write();
        cache.list = members;
        cache.troop_member_num_seq = member_seq;
    }

    /// Apply a member event for this group, returning whether the cache changed
    pub fn apply(&self, event: &ContactEvent) -> bool {
        match event {
            ContactEvent::GroupMemberChanged { member, .. } => self.upsert(member.clone()),
            ContactEvent::GroupMemberRemoved { uin, .. } => self.remove(*uin),
            ContactEvent::GroupMembersRefreshed {
                members,
                member_seq,
                ..
            } => {
                self.replace_all(members.clone(), *member_seq);
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> GroupMemberListCache {
        self.read().clone()
    }
}

// ----------------------------------------------------------------------------
// Group Member Caches
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct GroupEntry {
    cache: Arc<GroupMemberCache>,
    file: SnapshotFile<GroupMemberListCache>,
    saver: DebounceJob,
}

/// All group member caches of one session, keyed by group
#[derive(Debug)]
pub struct GroupMemberCaches {
    storage: Arc<dyn CacheStorage>,
    config: CacheConfig,
    cancel: CancellationToken,
    groups: Mutex<HashMap<GroupId, Arc<GroupEntry>>>,
}

impl GroupMemberCaches {
    /// Create an empty set of caches; savers stop when `parent` is cancelled
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        config: CacheConfig,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            cancel: parent.child_token(),
            groups: Mutex::new(HashMap::new()),
        }
    }

    async fn entry(&self, group_id: GroupId) -> Arc<GroupEntry> {
        let mut groups = self.groups.lock().await;
        if let Some(entry) = groups.get(&group_id) {
            return entry.clone();
        }

        let file = SnapshotFile::new(self.storage.clone(), self.config.group_cache_file(group_id));
        let cache = Arc::new(GroupMemberCache::new(file.load_or_default().await));
        debug!("Loaded {} cached members of group {}", cache.len(), group_id);

        let saver = {
            let cache = cache.clone();
            let file = file.clone();
            DebounceJob::spawn(
                "group-member-cache-saver",
                self.config.save_interval(),
                &self.cancel,
                move || {
                    let cache = cache.clone();
                    let file = file.clone();
                    async move { save_group(group_id, &cache, &file).await.map(|_| ()) }
                },
            )
        };

        let entry = Arc::new(GroupEntry { cache, file, saver });
        groups.insert(group_id, entry.clone());
        entry
    }

    /// Member cache of a group, loading it on first access
    pub async fn get(&self, group_id: GroupId) -> Arc<GroupMemberCache> {
        self.entry(group_id).await.cache.clone()
    }

    /// Groups loaded so far
    pub async fn loaded_groups(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.groups.lock().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Mark a group's member list as changed so its saver persists it
    pub async fn report_changed(&self, group_id: GroupId) {
        self.entry(group_id).await.saver.notice();
    }

    /// Apply a member event, returning whether a cache changed
    pub async fn apply(&self, event: &ContactEvent) -> bool {
        let Some(group_id) = event.group_id() else {
            return false;
        };
        let entry = self.entry(group_id).await;
        let changed = entry.cache.apply(event);
        if changed {
            entry.saver.notice();
        }
        changed
    }

    /// Persist a group's member list now
    pub async fn save(&self, group_id: GroupId) -> CacheResult<usize> {
        let entry = self.entry(group_id).await;
        entry.saver.take_pending();
        let result = save_group(group_id, &entry.cache, &entry.file).await;
        if result.is_err() {
            entry.saver.notice();
        }
        result
    }

    /// Persist every group with unsaved changes, returning how many were saved
    pub async fn flush(&self) -> usize {
        let entries: Vec<(GroupId, Arc<GroupEntry>)> = self
            .groups
            .lock()
            .await
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();

        let mut saved = 0;
        for (group_id, entry) in entries {
            if !entry.saver.take_pending() {
                continue;
            }
            match save_group(group_id, &entry.cache, &entry.file).await {
                Ok(_) => saved += 1,
                Err(e) => {
                    warn!("Failed to flush member cache of group {}: {}", group_id, e);
                    entry.saver.notice();
                }
            }
        }
        saved
    }
}

async fn save_group(
    group_id: GroupId,
    cache: &GroupMemberCache,
    file: &SnapshotFile<GroupMemberListCache>,
) -> CacheResult<usize> {
    let snapshot = cache.snapshot();
    let count = snapshot.list.len();
    file.save(snapshot).await?;
    info!("Saved {} members of group {} to local cache.", count, group_id);
    Ok(count)
}
