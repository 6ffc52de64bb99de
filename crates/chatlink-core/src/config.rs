//! Centralized Configuration Management
//!
//! All options recognized by the session engine live here: contact cache
//! toggles and file locations, reconnect/backoff limits, and the component
//! replacement policy. Configuration is plain serde data so it can be read
//! from a TOML file; missing sections fall back to their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ChatlinkError, Result};
use crate::types::GroupId;

// ----------------------------------------------------------------------------
// Contact Cache Configuration
// ----------------------------------------------------------------------------

/// Configuration for local contact list caches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the friend list is mirrored to disk
    pub friend_list_cache_enabled: bool,
    /// Whether group member lists are mirrored to disk
    pub group_member_list_cache_enabled: bool,
    /// Debounce window for persisting changes, in milliseconds
    pub save_interval_millis: u64,
    /// Base directory for all cache snapshots
    pub cache_dir: PathBuf,
    /// Friend list snapshot, relative to `cache_dir`
    pub friend_cache_file: PathBuf,
    /// Directory holding one snapshot per group, relative to `cache_dir`
    pub group_cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            friend_list_cache_enabled: false,
            group_member_list_cache_enabled: false,
            save_interval_millis: 60_000, // 1 minute
            cache_dir: PathBuf::from("cache"),
            friend_cache_file: PathBuf::from("friends.json"),
            group_cache_dir: PathBuf::from("groups"),
        }
    }
}

impl CacheConfig {
    /// Create configuration with both caches enabled
    pub fn enabled() -> Self {
        Self {
            friend_list_cache_enabled: true,
            group_member_list_cache_enabled: true,
            ..Self::default()
        }
    }

    /// Debounce window as a `Duration`
    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_millis)
    }

    /// Relative snapshot path for a group's member list
    pub fn group_cache_file(&self, group_id: GroupId) -> PathBuf {
        self.group_cache_dir.join(format!("{group_id}.json"))
    }
}

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Configuration for connect retries and exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum number of connect attempts before giving up
    pub max_attempts: u32,
    /// Delay after the first transient failure, in milliseconds
    pub backoff_base_millis: u64,
    /// Upper bound on any single backoff delay, in milliseconds
    pub backoff_ceiling_millis: u64,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_millis: 500,
            backoff_ceiling_millis: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Create configuration optimized for testing (fast retries)
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_millis: 10,
            backoff_ceiling_millis: 40,
            backoff_multiplier: 2.0,
        }
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_millis)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_millis)
    }
}

// ----------------------------------------------------------------------------
// Component Policy
// ----------------------------------------------------------------------------

/// What happens when a component key is registered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePolicy {
    /// Any second registration is a construction bug
    #[default]
    Reject,
    /// Re-registration while connecting replaces (and tears down) the prior instance
    ReplaceOnReconnect,
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Duplicate component registration policy
    pub component_replace_policy: ReplacePolicy,
    /// Capacity of the lifecycle notification channel
    pub lifecycle_buffer: usize,
    // Tables stay last so the struct renders as valid TOML
    /// Contact cache configuration
    pub cache: CacheConfig,
    /// Connect retry configuration
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            component_replace_policy: ReplacePolicy::default(),
            lifecycle_buffer: 64,
            cache: CacheConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            component_replace_policy: ReplacePolicy::Reject,
            lifecycle_buffer: 128,
            cache: CacheConfig {
                save_interval_millis: 20,
                ..CacheConfig::enabled()
            },
            reconnect: ReconnectConfig::testing(),
        }
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(content)
            .map_err(|e| ChatlinkError::config_error(format!("Invalid TOML: {e}")))?;
        config.validate().map_err(ChatlinkError::config_error)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChatlinkError::config_error(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Render configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ChatlinkError::config_error(format!("Cannot serialize config: {e}")))
    }

    /// Validate the configuration
    pub fn validate(&self) -> core::result::Result<(), String> {
        if self.cache.save_interval_millis == 0 {
            return Err("Save interval must be greater than zero".into());
        }
        if self.cache.friend_cache_file.as_os_str().is_empty() {
            return Err("Friend cache file cannot be empty".into());
        }
        if self.cache.group_cache_dir.as_os_str().is_empty() {
            return Err("Group cache directory cannot be empty".into());
        }

        if self.reconnect.max_attempts == 0 {
            return Err("Max reconnect attempts cannot be zero".into());
        }
        if self.reconnect.backoff_multiplier < 1.0 {
            return Err("Backoff multiplier cannot be less than 1.0".into());
        }
        if self.reconnect.backoff_base_millis > self.reconnect.backoff_ceiling_millis {
            return Err("Backoff base cannot be greater than backoff ceiling".into());
        }

        if self.lifecycle_buffer == 0 {
            return Err("Lifecycle buffer cannot be zero".into());
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
