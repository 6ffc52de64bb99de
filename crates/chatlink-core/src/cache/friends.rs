//! In-memory friend list mirror

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::codec::{Snapshot, CACHE_FORMAT_VERSION};
use crate::events::ContactEvent;
use crate::types::{FriendInfo, Uin};

/// Persisted form of the friend list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendListCache {
    pub version: u32,
    /// Server-side sequence of the list this snapshot was built from
    #[serde(default)]
    pub friend_list_seq: i64,
    /// Unix seconds of the last full refresh
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub list: Vec<FriendInfo>,
}

impl Default for FriendListCache {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            friend_list_seq: 0,
            timestamp: 0,
            list: Vec::new(),
        }
    }
}

impl Snapshot for FriendListCache {
    fn version(&self) -> u32 {
        self.version
    }
}

// ----------------------------------------------------------------------------
// Friend Cache
// ----------------------------------------------------------------------------

/// Shared, mutable friend list
///
/// List order is preserved: updates replace entries in place and new friends
/// are appended.
#[derive(Debug, Default)]
pub struct FriendCache {
    inner: RwLock<FriendListCache>,
}

impl FriendCache {
    pub fn new(snapshot: FriendListCache) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, FriendListCache> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, FriendListCache> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().list.is_empty()
    }

    pub fn get(&self, uin: Uin) -> Option<FriendInfo> {
        self.read().list.iter().find(|f| f.uin == uin).cloned()
    }

    pub fn friends(&self) -> Vec<FriendInfo> {
        self.read().list.clone()
    }

    /// Insert or update a friend, returning whether the cache changed
    pub fn upsert(&self, info: FriendInfo) -> bool {
        let mut cache = self.write();
        match cache.list.iter_mut().find(|f| f.uin == info.uin) {
            Some(existing) if *existing == info => false,
            Some(existing) => {
                *existing = info;
                true
            }
            None => {
                cache.list.push(info);
                true
            }
        }
    }

    pub fn remove(&self, uin: Uin) -> bool {
        let mut cache = self.write();
        let before = cache.list.len();
        cache.list.retain(|f| f.uin != uin);
        cache.list.len() != before
    }

    /// Replace the whole list after a full refresh from the server
    pub fn replace_all(&self, list: Vec<FriendInfo>, friend_list_seq: i64, timestamp: i64) {
        let mut cache = self.write();
        cache.list = list;
        cache.friend_list_seq = friend_list_seq;
        cache.timestamp = timestamp;
    }

    /// Apply a friend event, returning whether the cache changed
    pub fn apply(&self, event: &ContactEvent) -> bool {
        match event {
            ContactEvent::FriendInfoChanged(info) => self.upsert(info.clone()),
            ContactEvent::FriendRemoved { uin } => self.remove(*uin),
            _ => false,
        }
    }

    /// Copy of the current contents for persisting
    pub fn snapshot(&self) -> FriendListCache {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friend(uin: u64, nick: &str) -> FriendInfo {
        FriendInfo::new(Uin(uin), nick)
    }

    #[test]
    fn test_upsert_preserves_order() {
        let cache = FriendCache::default();
        assert!(cache.upsert(friend(3, "c")));
        assert!(cache.upsert(friend(1, "a")));
        assert!(cache.upsert(friend(2, "b")));

        assert!(cache.upsert(friend(1, "a2")));
        assert!(!cache.upsert(friend(1, "a2")));

        let uins: Vec<u64> = cache.friends().iter().map(|f| f.uin.0).collect();
        assert_eq!(uins, vec![3, 1, 2]);
        assert_eq!(cache.get(Uin(1)).map(|f| f.nick), Some("a2".to_string()));
    }

    #[test]
    fn test_apply_friend_events() {
        let cache = FriendCache::default();
        assert!(cache.apply(&ContactEvent::FriendInfoChanged(friend(5, "e"))));
        assert_eq!(cache.len(), 1);

        assert!(cache.apply(&ContactEvent::FriendRemoved { uin: Uin(5) }));
        assert!(!cache.apply(&ContactEvent::FriendRemoved { uin: Uin(5) }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_snapshot_keeps_sequence() {
        let cache = FriendCache::default();
        cache.replace_all(vec![friend(1, "a")], 17, 1_700_000_000);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.friend_list_seq, 17);
        assert_eq!(snapshot.version, CACHE_FORMAT_VERSION);
        assert_eq!(snapshot.list.len(), 1);
    }
}
