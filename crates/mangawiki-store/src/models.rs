//! Plain data structs for the persisted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The JSON shape every persisted value is wrapped in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The stored value.
    pub value: T,
    /// When the value was written.
    pub timestamp: DateTime<Utc>,
}

impl<T> Envelope<T> {
    /// Wrap `value` stamped with the current time.
    pub fn now(value: T) -> Self {
        Self {
            value,
            timestamp: Utc::now(),
        }
    }
}

/// One row of the `page_cache` table.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedPage {
    /// Logical list name, e.g. `"characters"`.
    pub resource_key: String,
    /// 1-based page number.
    pub page: u32,
    /// Canonical serialization of the list filters.
    pub filter_signature: String,
    /// The page payload as fetched, with its fetch time.
    pub envelope: Envelope<serde_json::Value>,
}
