//! Configuration for the Orrery components.
//!
//! Defaults match the shipped app. Hosts may override a subset through
//! `ORRERY_*` environment variables; unparseable values fall back to the
//! default rather than failing startup.

use std::env;

/// Default device store location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:orrery.db?mode=rwc";

/// Default device store capacity (5 MiB), the common browser quota.
pub const DEFAULT_STORE_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;

/// Configuration shared by the cache, quota and chat components.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Device store connection string.
    pub database_url: String,

    /// Total bytes the device store may hold.
    pub store_capacity_bytes: u64,

    /// Maximum entries kept in the report index.
    pub report_index_cap: usize,

    /// Eviction only runs when the index holds more than this many entries.
    pub eviction_floor: usize,

    /// Oldest reports removed per eviction pass.
    pub eviction_batch: usize,

    /// Free chat messages per calendar day.
    pub daily_chat_limit: u32,

    /// Chat messages granted per watched ad.
    pub bonus_messages_per_ad: u32,

    /// Lifetime of an ad-unlocked feature grant.
    pub grant_duration: chrono::Duration,

    /// Streamed chunks read before the primary tier gives up.
    pub max_stream_chunks: usize,

    /// Characters of streamed reply accepted before the primary tier gives up.
    pub max_response_chars: usize,

    /// User messages are cut to this many characters.
    pub max_message_chars: usize,

    /// Base URL of the AI backend, if one is configured.
    pub backend_base_url: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            store_capacity_bytes: DEFAULT_STORE_CAPACITY_BYTES,
            report_index_cap: 100,
            eviction_floor: 5,
            eviction_batch: 10,
            daily_chat_limit: 10,
            bonus_messages_per_ad: 1,
            grant_duration: chrono::Duration::minutes(5),
            max_stream_chunks: 1000,
            max_response_chars: 10_000,
            max_message_chars: 2000,
            backend_base_url: None,
        }
    }
}

impl CoreConfig {
    /// Defaults with `ORRERY_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults with overrides taken from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("ORRERY_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(bytes) = parse(&lookup, "ORRERY_STORE_CAPACITY_BYTES") {
            config.store_capacity_bytes = bytes;
        }
        if let Some(cap) = parse(&lookup, "ORRERY_REPORT_INDEX_CAP") {
            config.report_index_cap = cap;
        }
        if let Some(limit) = parse(&lookup, "ORRERY_DAILY_CHAT_LIMIT") {
            config.daily_chat_limit = limit;
        }
        if let Some(secs) = parse::<i64>(&lookup, "ORRERY_GRANT_DURATION_SECS") {
            match chrono::Duration::try_seconds(secs).filter(|_| secs > 0) {
                Some(duration) => config.grant_duration = duration,
                None => tracing::warn!(
                    name = "ORRERY_GRANT_DURATION_SECS",
                    value = secs,
                    "Ignoring out-of-range config override"
                ),
            }
        }
        config.backend_base_url = lookup("ORRERY_BACKEND_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        config
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(name, value = %raw, "Ignoring unparseable config override");
            None
        }
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
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.report_index_cap, 100);
        assert_eq!(config.eviction_floor, 5);
        assert_eq!(config.eviction_batch, 10);
        assert_eq!(config.daily_chat_limit, 10);
        assert_eq!(config.grant_duration, chrono::Duration::minutes(5));
        assert!(config.backend_base_url.is_none());
    }

    #[test]
    fn test_overrides_apply() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            ("ORRERY_DAILY_CHAT_LIMIT", "25"),
            ("ORRERY_GRANT_DURATION_SECS", "60"),
            ("ORRERY_BACKEND_URL", " https://api.example.com/ "),
        ]));
        assert_eq!(config.daily_chat_limit, 25);
        assert_eq!(config.grant_duration, chrono::Duration::seconds(60));
        assert_eq!(
            config.backend_base_url.as_deref(),
            Some("https://api.example.com")
        );
    }

    #[test]
    fn test_out_of_range_grant_duration_is_ignored() {
        for raw in ["0", "-30", "9223372036854775807"] {
            let config =
                CoreConfig::from_lookup(lookup_from(&[("ORRERY_GRANT_DURATION_SECS", raw)]));
            assert_eq!(config.grant_duration, chrono::Duration::minutes(5), "{raw}");
        }
    }

    #[test]
    fn test_bad_override_falls_back() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            ("ORRERY_DAILY_CHAT_LIMIT", "lots"),
            ("ORRERY_BACKEND_URL", "   "),
        ]));
        assert_eq!(config.daily_chat_limit, 10);
        assert!(config.backend_base_url.is_none());
    }
}
