use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MAX_CHAPTER;

/// Inclusive bounds a chapter number must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterRange {
    pub min: u32,
    pub max: u32,
}

impl ChapterRange {
    pub fn new(max: u32) -> Self {
        Self {
            min: crate::constants::MIN_CHAPTER,
            max,
        }
    }

    pub fn contains(&self, chapter: u32) -> bool {
        (self.min..=self.max).contains(&chapter)
    }
}

impl Default for ChapterRange {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHAPTER)
    }
}

/// Reader preferences that override progress-based gating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoilerSettings {
    /// Never hide anything.
    pub show_all_spoilers: bool,
    /// When non-zero, replaces reader progress as the gating baseline.
    pub chapter_tolerance: u32,
}

impl SpoilerSettings {
    /// Progress value gating decisions are measured against.
    pub fn effective_progress(&self, progress: u32) -> u32 {
        if self.chapter_tolerance > 0 {
            self.chapter_tolerance
        } else {
            progress
        }
    }
}

/// Anything that may reveal story details up to a given chapter.
pub trait Spoilerable {
    /// Chapter at/after which this content is safe to show. `None` is never gated.
    fn chapter_number(&self) -> Option<u32>;
}

impl Spoilerable for Option<u32> {
    fn chapter_number(&self) -> Option<u32> {
        *self
    }
}

/// Paginated envelope returned by every list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEnvelope<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
}

impl<T> PageEnvelope<T> {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One cached list page with its identity and fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage<T> {
    pub resource_key: String,
    pub page: u32,
    pub filter_signature: String,
    pub envelope: PageEnvelope<T>,
    pub fetched_at: DateTime<Utc>,
}

/// Chapter metadata, display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub number: u32,
    #[serde(default)]
    pub title: Option<String>,
}

/// The signed-in reader's profile record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub user_progress: Option<u32>,
}

/// Partial profile update sent with `PATCH /users/profile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_progress: Option<u32>,
}
