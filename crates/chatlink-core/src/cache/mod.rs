//! Local contact caches and their snapshot format

pub mod codec;
pub mod friends;
pub mod groups;

pub use codec::{decode, encode, Snapshot, SnapshotFile, CACHE_FORMAT_VERSION};
pub use friends::{FriendCache, FriendListCache};
pub use groups::{GroupMemberCache, GroupMemberCaches, GroupMemberListCache};
