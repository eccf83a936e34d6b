//! # mangawiki-shared
//!
//! Domain types shared by the wiki client crates: chapter bounds, spoiler
//! settings, the REST pagination envelope, the error taxonomy, and the
//! spoiler gate that decides what a reader is allowed to see.

pub mod constants;
pub mod error;
pub mod spoiler;
pub mod types;

pub use error::{CacheError, FetchError, ProgressError};
pub use spoiler::{should_hide, GateState, GateView, Placeholder, RevealClick, SpoilerGate};
pub use types::*;
