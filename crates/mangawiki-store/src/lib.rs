//! # mangawiki-store
//!
//! Client-local persistent storage for the wiki client, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the two things the
//! client keeps between sessions: namespaced preference envelopes (reading
//! progress, spoiler settings) and persisted list pages.

pub mod database;
pub mod kv;
pub mod migrations;
pub mod models;
pub mod page_cache;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
