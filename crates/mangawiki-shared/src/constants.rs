/// Latest published chapter; the default upper bound for reader progress
pub const DEFAULT_MAX_CHAPTER: u32 = 539;

/// Lowest chapter a reader can confirm having read
pub const MIN_CHAPTER: u32 = 1;

/// Progress reported for a reader who never set one
pub const DEFAULT_PROGRESS: u32 = 0;

/// Freshness window for cached list pages, in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Upper bound on cached pages across every resource
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 200;

/// Page size requested from list endpoints
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Default REST base URL (local dev API)
pub const DEFAULT_API_URL: &str = "http://localhost:3001";

/// Namespaced keys in client-local storage
pub const STORAGE_KEY_PROGRESS: &str = "mangawiki:progress";
pub const STORAGE_KEY_SPOILER_SETTINGS: &str = "mangawiki:spoiler-settings";

/// Resource key of the public user list
pub const RESOURCE_USERS: &str = "users";
