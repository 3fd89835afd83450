use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Default TTL for stored conversations. A conversation-defined TTL takes
    /// precedence over this value.
    #[serde(default = "default_cache_time", rename = "cacheTimeSecs")]
    pub cache_time_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            cache_time_secs: default_cache_time(),
        }
    }
}

fn default_cache_time() -> u64 {
    crate::conversation::DEFAULT_TTL_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Capacity of the bundled in-memory cache.
    #[serde(default = "default_max_entries", rename = "maxEntries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

fn default_max_entries() -> usize {
    crate::cache::DEFAULT_MAX_ENTRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.conversation.cache_time_secs, 30);
        assert_eq!(config.cache.max_entries, 1024);
    }

    #[test]
    fn test_camel_case_keys() {
        let config: Config = serde_json::from_str(
            r#"{"conversation": {"cacheTimeSecs": 120}, "cache": {"maxEntries": 16}}"#,
        )
        .unwrap();
        assert_eq!(config.conversation.cache_time_secs, 120);
        assert_eq!(config.cache.max_entries, 16);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"conversation": {"cacheTimeSecs": 5}}"#).unwrap();
        assert_eq!(config.conversation.cache_time_secs, 5);
        assert_eq!(config.cache.max_entries, 1024);
    }

    #[test]
    fn test_default_matches_deserialized_default() {
        let from_json: Config = serde_json::from_str("{}").unwrap();
        let from_default = Config::default();
        assert_eq!(
            from_json.conversation.cache_time_secs,
            from_default.conversation.cache_time_secs
        );
        assert_eq!(from_json.cache.max_entries, from_default.cache.max_entries);
    }
}
