//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration against a local API.

use std::path::PathBuf;
use std::time::Duration;

use mangawiki_shared::constants::{
    DEFAULT_API_URL, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_SECS, DEFAULT_MAX_CHAPTER,
    DEFAULT_PAGE_LIMIT,
};
use mangawiki_shared::ChapterRange;

use crate::cache::CacheOptions;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    /// Env: `MANGAWIKI_API_URL`
    /// Default: `http://localhost:3001`
    pub api_url: String,

    /// Bearer token of a signed-in reader.  Its presence makes the session
    /// authenticated: reading progress is then stored on the server.
    /// Env: `MANGAWIKI_ACCESS_TOKEN`
    /// Default: none (anonymous).
    pub access_token: Option<String>,

    /// Highest chapter a reader can report.
    /// Env: `MANGAWIKI_MAX_CHAPTER`
    /// Default: `539`
    pub max_chapter: u32,

    /// Freshness window for cached list pages.
    /// Env: `MANGAWIKI_CACHE_TTL_SECS`
    /// Default: `300`
    pub cache_ttl: Duration,

    /// Maximum number of cached pages across every resource.
    /// Env: `MANGAWIKI_CACHE_MAX_ENTRIES`
    /// Default: `200`
    pub cache_max_entries: usize,

    /// Mirror cached pages into the local database.
    /// Env: `MANGAWIKI_CACHE_PERSIST` (true/false)
    /// Default: `false`
    pub cache_persist: bool,

    /// Page size requested from list endpoints.
    /// Env: `MANGAWIKI_PAGE_LIMIT`
    /// Default: `20`
    pub page_limit: u32,

    /// Local database file.
    /// Env: `MANGAWIKI_DB_PATH`
    /// Default: none (platform data directory).
    pub db_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            max_chapter: DEFAULT_MAX_CHAPTER,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_persist: false,
            page_limit: DEFAULT_PAGE_LIMIT,
            db_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = var("MANGAWIKI_API_URL") {
            if !url.trim().is_empty() {
                config.api_url = url.trim().to_string();
            }
        }

        if let Some(token) = var("MANGAWIKI_ACCESS_TOKEN") {
            if !token.is_empty() {
                config.access_token = Some(token);
            }
        }

        if let Some(val) = var("MANGAWIKI_MAX_CHAPTER") {
            match val.parse::<u32>() {
                Ok(n) if n >= 1 => config.max_chapter = n,
                _ => tracing::warn!(value = %val, "Invalid MANGAWIKI_MAX_CHAPTER, using default"),
            }
        }

        if let Some(val) = var("MANGAWIKI_CACHE_TTL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.cache_ttl = Duration::from_secs(secs),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid MANGAWIKI_CACHE_TTL_SECS, using default")
                }
            }
        }

        if let Some(val) = var("MANGAWIKI_CACHE_MAX_ENTRIES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.cache_max_entries = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid MANGAWIKI_CACHE_MAX_ENTRIES, using default"
                ),
            }
        }

        if let Some(val) = var("MANGAWIKI_CACHE_PERSIST") {
            config.cache_persist = val != "false" && val != "0";
        }

        if let Some(val) = var("MANGAWIKI_PAGE_LIMIT") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.page_limit = n,
                _ => tracing::warn!(value = %val, "Invalid MANGAWIKI_PAGE_LIMIT, using default"),
            }
        }

        if let Some(path) = var("MANGAWIKI_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn chapter_range(&self) -> ChapterRange {
        ChapterRange::new(self.max_chapter)
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            ttl: self.cache_ttl,
            persist: self.cache_persist,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.max_chapter, 539);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert!(config.access_token.is_none());
        assert!(!config.cache_persist);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("MANGAWIKI_API_URL", "https://api.example.org"),
            ("MANGAWIKI_ACCESS_TOKEN", "tok"),
            ("MANGAWIKI_MAX_CHAPTER", "1100"),
            ("MANGAWIKI_CACHE_TTL_SECS", "5"),
            ("MANGAWIKI_CACHE_MAX_ENTRIES", "8"),
            ("MANGAWIKI_CACHE_PERSIST", "true"),
            ("MANGAWIKI_DB_PATH", "/tmp/wiki.db"),
        ]);
        assert_eq!(config.api_url, "https://api.example.org");
        assert_eq!(config.access_token.as_deref(), Some("tok"));
        assert_eq!(config.chapter_range().max, 1100);
        assert_eq!(config.cache_options().ttl, Duration::from_secs(5));
        assert_eq!(config.cache_max_entries, 8);
        assert!(config.cache_options().persist);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/wiki.db")));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_map(&[
            ("MANGAWIKI_MAX_CHAPTER", "0"),
            ("MANGAWIKI_CACHE_TTL_SECS", "soon"),
            ("MANGAWIKI_CACHE_MAX_ENTRIES", "-1"),
            ("MANGAWIKI_PAGE_LIMIT", "0"),
            ("MANGAWIKI_ACCESS_TOKEN", ""),
        ]);
        assert_eq!(config.max_chapter, 539);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_max_entries, 200);
        assert_eq!(config.page_limit, 20);
        assert!(config.access_token.is_none());
    }
}
