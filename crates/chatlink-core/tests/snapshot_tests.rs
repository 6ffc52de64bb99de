//! Tests for cache snapshots on the local file system
//!
//! These tests verify that friend and group member snapshots survive a save
//! and reload through `FileStorage`, and that unreadable snapshots never
//! prevent a cache from loading.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chatlink_core::*;
use tempfile::TempDir;

fn file_storage(dir: &TempDir) -> Arc<dyn CacheStorage> {
    Arc::new(FileStorage::new(dir.path()))
}

// ----------------------------------------------------------------------------
// Round Trip Tests
// ----------------------------------------------------------------------------

#[test]
fn test_friend_snapshot_round_trip_preserves_order() {
    let dir = TempDir::new().unwrap();
    let file: SnapshotFile<FriendListCache> = SnapshotFile::new(file_storage(&dir), "friends.json");

    let cache = FriendCache::default();
    cache.upsert(FriendInfo::new(Uin(30), "carol").with_remark("work"));
    cache.upsert(FriendInfo::new(Uin(10), "alice"));
    cache.upsert(FriendInfo::new(Uin(20), "bob"));
    cache.replace_all(cache.friends(), 9, 1_700_000_000);

    file.save_blocking(&cache.snapshot()).unwrap();

    let loaded = file.load_blocking().unwrap().unwrap();
    assert_eq!(loaded, cache.snapshot());
    let uins: Vec<u64> = loaded.list.iter().map(|f| f.uin.0).collect();
    assert_eq!(uins, vec![30, 10, 20]);
}

#[test]
fn test_group_snapshot_round_trip_per_group() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);
    let config = CacheConfig::enabled();

    let mut expected = Vec::new();
    for group in [100u64, 200] {
        let cache = GroupMemberCache::default();
        cache.replace_all(
            vec![
                MemberInfo::new(Uin(group + 1), "owner").with_permission(MemberPermission::Owner),
                MemberInfo::new(Uin(group + 2), "member"),
            ],
            group as i64,
        );
        let file: SnapshotFile<GroupMemberListCache> =
            SnapshotFile::new(storage.clone(), config.group_cache_file(GroupId(group)));
        file.save_blocking(&cache.snapshot()).unwrap();
        expected.push((file, cache.snapshot()));
    }

    for (file, snapshot) in expected {
        assert_eq!(file.load_blocking().unwrap(), Some(snapshot));
    }
    assert!(dir.path().join("groups/100.json").is_file());
    assert!(dir.path().join("groups/200.json").is_file());
}

// ----------------------------------------------------------------------------
// Unreadable Snapshot Tests
// ----------------------------------------------------------------------------

#[test]
fn test_corrupt_snapshot_starts_empty_then_is_overwritten() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("friends.json"), b"\x00\x01 definitely not json").unwrap();

    let file: SnapshotFile<FriendListCache> = SnapshotFile::new(file_storage(&dir), "friends.json");
    let cache = FriendCache::new(file.load_or_default_blocking());
    assert!(cache.is_empty());

    cache.upsert(FriendInfo::new(Uin(1), "alice"));
    file.save_blocking(&cache.snapshot()).unwrap();

    let reloaded = file.load_blocking().unwrap().unwrap();
    assert_eq!(reloaded.list.len(), 1);
}

#[test]
fn test_newer_format_version_starts_empty() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("friends.json"),
        br#"{"version": 2, "list": [{"uin": 1, "nick": "alice"}]}"#,
    )
    .unwrap();

    let file: SnapshotFile<FriendListCache> = SnapshotFile::new(file_storage(&dir), "friends.json");
    assert!(matches!(
        file.load_blocking(),
        Err(CacheError::UnsupportedVersion { found: 2, .. })
    ));
    assert_eq!(file.load_or_default_blocking(), FriendListCache::default());
}

#[test]
fn test_missing_and_blank_snapshots_are_absent() {
    let dir = TempDir::new().unwrap();
    let storage = file_storage(&dir);

    let missing: SnapshotFile<FriendListCache> = SnapshotFile::new(storage.clone(), "friends.json");
    assert!(missing.load_blocking().unwrap().is_none());
    assert!(!Path::new(&dir.path().join("friends.json")).exists());

    fs::write(dir.path().join("blank.json"), b"\n").unwrap();
    let blank: SnapshotFile<FriendListCache> = SnapshotFile::new(storage, "blank.json");
    assert!(blank.load_blocking().unwrap().is_none());
}
