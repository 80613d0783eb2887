//! Configuration Module
//!
//! Typed cache configuration plus loading of server settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::cache::MAX_TTL;
use crate::error::ConfigError;

/// Upper bound for `max_entries`
pub const MAX_ENTRIES_LIMIT: usize = 10_000_000;

/// Upper bound for `tag_version_ttl`
pub const MAX_TAG_VERSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// == Cache Config ==
/// Process-wide cache settings, fixed when the engine is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// TTL applied when a call does not supply one
    #[serde(serialize_with = "serialize_millis")]
    pub default_ttl: Duration,
    /// Interval between expiry sweeps
    #[serde(serialize_with = "serialize_millis")]
    pub cleanup_interval: Duration,
    /// Maximum number of entries, tag versions included
    pub max_entries: usize,
    /// Extra lifetime granted to stale-while-revalidate entries after they go stale
    #[serde(serialize_with = "serialize_millis")]
    pub stale_ttl: Duration,
    /// Lifetime of a tag version counter since its last use
    #[serde(serialize_with = "serialize_millis")]
    pub tag_version_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            max_entries: 1000,
            stale_ttl: Duration::from_secs(60),
            tag_version_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CacheConfig {
    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_duration("default_ttl", self.default_ttl, MAX_TTL)?;
        check_duration("cleanup_interval", self.cleanup_interval, MAX_TTL)?;
        check_duration("stale_ttl", self.stale_ttl, MAX_TTL)?;
        check_duration("tag_version_ttl", self.tag_version_ttl, MAX_TAG_VERSION_TTL)?;

        if self.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "max_entries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_entries > MAX_ENTRIES_LIMIT {
            return Err(ConfigError::Invalid {
                field: "max_entries",
                reason: format!("must not exceed {}", MAX_ENTRIES_LIMIT),
            });
        }
        Ok(())
    }
}

fn check_duration(field: &'static str, value: Duration, max: Duration) -> Result<(), ConfigError> {
    if value.as_millis() == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be at least 1ms".to_string(),
        });
    }
    if value > max {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("must not exceed {}s", max.as_secs()),
        });
    }
    Ok(())
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

// == Server Config ==
/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Cache engine settings
    pub cache: CacheConfig,
    /// HTTP admin server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `STALE_TTL` - Stale window in seconds (default: 60)
    /// - `TAG_VERSION_TTL` - Tag version lifetime in seconds (default: 86400)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CacheConfig::default();
        let cache = CacheConfig {
            default_ttl: parse_secs(&lookup, "DEFAULT_TTL", defaults.default_ttl)?,
            cleanup_interval: parse_secs(&lookup, "CLEANUP_INTERVAL", defaults.cleanup_interval)?,
            max_entries: parse_var(&lookup, "MAX_ENTRIES", defaults.max_entries)?,
            stale_ttl: parse_secs(&lookup, "STALE_TTL", defaults.stale_ttl)?,
            tag_version_ttl: parse_secs(&lookup, "TAG_VERSION_TTL", defaults.tag_version_ttl)?,
        };
        cache.validate()?;

        Ok(Self {
            cache,
            server_port: parse_var(&lookup, "SERVER_PORT", 3000)?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Parse { var, value }),
        None => Ok(default),
    }
}

fn parse_secs<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(_) => parse_var(lookup, var, 0u64).map(Duration::from_secs),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(60));
        assert!(config.cache.validate().is_ok());
    }

    #[test]
    fn test_config_from_lookup_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_config_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("MAX_ENTRIES", "50"),
            ("DEFAULT_TTL", "10"),
            ("STALE_TTL", "5"),
            ("SERVER_PORT", "8080"),
        ]))
        .unwrap();

        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.cache.default_ttl, Duration::from_secs(10));
        assert_eq!(config.cache.stale_ttl, Duration::from_secs(5));
        assert_eq!(config.server_port, 8080);
    }

    #[test]
    fn test_config_unparsable_value_is_error() {
        let err = Config::from_lookup(lookup_from(&[("MAX_ENTRIES", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Parse {
                var: "MAX_ENTRIES",
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn test_config_zero_ttl_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("DEFAULT_TTL", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "default_ttl", .. }));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = CacheConfig {
            max_entries: 0,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());

        config.max_entries = MAX_ENTRIES_LIMIT + 1;
        assert!(config.validate().is_err());

        config.max_entries = 10;
        config.default_ttl = MAX_TTL + Duration::from_secs(1);
        assert!(config.validate().is_err());

        config.default_ttl = Duration::from_micros(500);
        assert!(config.validate().is_err());

        config.default_ttl = Duration::from_millis(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serializes_durations_as_millis() {
        let json = serde_json::to_value(CacheConfig::default()).unwrap();
        assert_eq!(json["default_ttl"], 300_000);
        assert_eq!(json["max_entries"], 1000);
    }
}
