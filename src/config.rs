//! Configuration of the virtual file tree.
//!
//! Every field has a default; with the `serde` feature a configuration can be
//! loaded from JSON where missing fields keep their defaults and durations
//! are written in seconds.
//!
//! | Field | Default |
//! |-------|---------|
//! | `cache.attribute_ttl` | 60 s |
//! | `cache.refresh_policy` | `keep_stale` |
//! | `pool.keep_alive` | 300 s |
//! | `archives_enabled` | `true` |

use std::time::Duration;

use crate::RefreshPolicy;

/// Top-level configuration, handed to every provider on resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VfsConfig {
    /// Attribute cache settings of remote entities.
    pub cache: CacheConfig,
    /// Connection pool settings of session-based protocols.
    pub pool: PoolConfig,
    /// Whether resolution presents recognized container files as archives.
    pub archives_enabled: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            pool: PoolConfig::default(),
            archives_enabled: true,
        }
    }
}

/// Attribute cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    /// Time after which a snapshot is refreshed on read.
    #[cfg_attr(feature = "serde", serde(with = "duration_secs"))]
    pub attribute_ttl: Duration,
    /// Behavior on refresh failure.
    pub refresh_policy: RefreshPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            attribute_ttl: Duration::from_secs(60),
            refresh_policy: RefreshPolicy::KeepStale,
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Idle time after which [`evict_idle`](crate::ConnectionPool::evict_idle)
    /// closes a connection.
    #[cfg_attr(feature = "serde", serde(with = "duration_secs"))]
    pub keep_alive: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(300),
        }
    }
}

#[cfg(feature = "serde")]
impl VfsConfig {
    /// Parse a JSON configuration.
    ///
    /// # Errors
    ///
    /// - `FsError::Deserialization` if the JSON is invalid
    pub fn from_json(json: &str) -> crate::FsResult<Self> {
        serde_json::from_str(json).map_err(|e| crate::FsError::Deserialization(e.to_string()))
    }

    /// Pretty-printed JSON form.
    pub fn to_json(&self) -> crate::FsResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| crate::FsError::Serialization(e.to_string()))
    }
}

/// Serde support for durations as whole seconds.
#[cfg(feature = "serde")]
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VfsConfig::default();
        assert_eq!(config.cache.attribute_ttl, Duration::from_secs(60));
        assert_eq!(config.cache.refresh_policy, RefreshPolicy::KeepStale);
        assert_eq!(config.pool.keep_alive, Duration::from_secs(300));
        assert!(config.archives_enabled);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_keeps_defaults() {
        let config = VfsConfig::from_json(r#"{ "cache": { "attribute_ttl": 5 }, "archives_enabled": false }"#).unwrap();
        assert_eq!(config.cache.attribute_ttl, Duration::from_secs(5));
        assert_eq!(config.cache.refresh_policy, RefreshPolicy::KeepStale);
        assert_eq!(config.pool, PoolConfig::default());
        assert!(!config.archives_enabled);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip_and_errors() {
        let mut config = VfsConfig::default();
        config.cache.refresh_policy = RefreshPolicy::Propagate;
        let json = config.to_json().unwrap();
        assert!(json.contains("\"propagate\""));
        assert_eq!(VfsConfig::from_json(&json).unwrap(), config);

        assert!(matches!(
            VfsConfig::from_json("{ not json"),
            Err(crate::FsError::Deserialization(_))
        ));
    }
}
