//! Contact types mirrored by the local caches
//!
//! Identifiers use the newtype pattern so a user number can never be passed
//! where a group number is expected.

use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Identifiers
// ----------------------------------------------------------------------------

/// Account number of a user (friend or group member)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uin(pub u64);

impl fmt::Display for Uin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Friend Records
// ----------------------------------------------------------------------------

/// A friend as mirrored in the friend list cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendInfo {
    pub uin: Uin,
    pub nick: String,
    #[serde(default)]
    pub remark: String,
    /// Friend category the user filed this friend under
    #[serde(default)]
    pub friend_group_id: u32,
}

impl FriendInfo {
    pub fn new(uin: Uin, nick: impl Into<String>) -> Self {
        Self {
            uin,
            nick: nick.into(),
            remark: String::new(),
            friend_group_id: 0,
        }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }
}

// ----------------------------------------------------------------------------
// Group Member Records
// ----------------------------------------------------------------------------

/// Role of a member inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberPermission {
    #[default]
    Member,
    Administrator,
    Owner,
}

/// A group member as mirrored in a group member list cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub uin: Uin,
    pub nick: String,
    #[serde(default)]
    pub name_card: String,
    #[serde(default)]
    pub special_title: String,
    #[serde(default)]
    pub permission: MemberPermission,
    /// Unix seconds until which the member is muted, 0 if not muted
    #[serde(default)]
    pub mute_timestamp: i64,
}

impl MemberInfo {
    pub fn new(uin: Uin, nick: impl Into<String>) -> Self {
        Self {
            uin,
            nick: nick.into(),
            name_card: String::new(),
            special_title: String::new(),
            permission: MemberPermission::Member,
            mute_timestamp: 0,
        }
    }

    pub fn with_permission(mut self, permission: MemberPermission) -> Self {
        self.permission = permission;
        self
    }
}
