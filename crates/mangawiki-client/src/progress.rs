//! Reader progress store.
//!
//! Single source of truth for how far the reader has read.  Signed-in
//! readers keep their progress on the server profile; anonymous readers keep
//! it in the local database.  Every gate subscribes to the same watch
//! channel and re-derives its view when the value changes.
//!
//! Updates are optimistic: the new chapter is published as soon as it passes
//! validation, and only committed once persisted.  A failed write drops the
//! pending value, so subscribers fall back to the last confirmed chapter.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use mangawiki_shared::constants::{DEFAULT_PROGRESS, STORAGE_KEY_PROGRESS};
use mangawiki_shared::{ChapterRange, FetchError, ProfilePatch, ProgressError};
use mangawiki_store::Database;

use crate::api::ProfileApi;

/// Where confirmed progress lives.
#[derive(Clone)]
pub enum ProgressBackend {
    /// Signed in: `/users/profile`.
    Remote(Arc<dyn ProfileApi>),
    /// Anonymous: the local database, or memory only when there is none.
    Local(Option<Arc<Mutex<Database>>>),
}

#[derive(Debug, Clone, Copy)]
struct ProgressState {
    confirmed: u32,
    pending: Option<u32>,
}

impl ProgressState {
    fn displayed(&self) -> u32 {
        self.pending.unwrap_or(self.confirmed)
    }
}

pub struct ReaderProgressStore {
    range: ChapterRange,
    backend: ProgressBackend,
    state: Mutex<ProgressState>,
    displayed: watch::Sender<u32>,
    /// Serializes writers so one update settles before the next starts.
    writer: tokio::sync::Mutex<()>,
}

impl ReaderProgressStore {
    pub fn new(range: ChapterRange, backend: ProgressBackend) -> Self {
        let (displayed, _) = watch::channel(DEFAULT_PROGRESS);
        Self {
            range,
            backend,
            state: Mutex::new(ProgressState {
                confirmed: DEFAULT_PROGRESS,
                pending: None,
            }),
            displayed,
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn range(&self) -> ChapterRange {
        self.range
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.backend, ProgressBackend::Remote(_))
    }

    /// Current progress as the reader sees it, pending update included.
    pub fn get_progress(&self) -> u32 {
        lock(&self.state).displayed()
    }

    /// Last value known to be persisted.
    pub fn confirmed_progress(&self) -> u32 {
        lock(&self.state).confirmed
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    /// Receiver that yields the displayed progress on every change.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.displayed.subscribe()
    }

    /// Check a requested chapter against the configured bounds.
    pub fn validate(&self, value: i64) -> Result<u32, ProgressError> {
        match u32::try_from(value) {
            Ok(chapter) if self.range.contains(chapter) => Ok(chapter),
            _ => Err(ProgressError::InvalidRange {
                value,
                min: self.range.min,
                max: self.range.max,
            }),
        }
    }

    /// Hydrate the confirmed value from wherever progress is kept.
    ///
    /// Missing, malformed or out-of-range values leave the default in place.
    /// Only a failed profile fetch is reported; the store stays usable.
    pub async fn load(&self) -> Result<u32, FetchError> {
        let loaded = match &self.backend {
            ProgressBackend::Remote(api) => {
                let profile = api.get_profile().await?;
                match profile.user_progress {
                    Some(chapter) if self.range.contains(chapter) => Some(chapter),
                    Some(chapter) => {
                        warn!(chapter, "profile progress out of range, ignoring");
                        None
                    }
                    None => None,
                }
            }
            ProgressBackend::Local(Some(database)) => self.load_local(database),
            ProgressBackend::Local(None) => None,
        };

        if let Some(chapter) = loaded {
            self.commit(chapter);
        }

        let progress = self.get_progress();
        debug!(progress, "reader progress loaded");
        Ok(progress)
    }

    fn load_local(&self, database: &Arc<Mutex<Database>>) -> Option<u32> {
        let db = lock(database);
        let stored = match db.get_entry::<u32>(STORAGE_KEY_PROGRESS) {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(error = %e, "failed to read local progress");
                return None;
            }
        };

        if self.range.contains(stored.value) {
            Some(stored.value)
        } else {
            warn!(chapter = stored.value, "stored progress out of range, discarding");
            if let Err(e) = db.delete_entry(STORAGE_KEY_PROGRESS) {
                warn!(error = %e, "failed to discard local progress");
            }
            None
        }
    }

    /// Set the reader's progress to `value`.
    ///
    /// Out-of-range values are rejected before anything is published or
    /// persisted.  On a persistence failure the previously confirmed value is
    /// restored and the error is returned; the call may be retried.
    pub async fn update_progress(&self, value: i64) -> Result<u32, ProgressError> {
        let chapter = self.validate(value)?;

        let _writer = self.writer.lock().await;
        let pending = PendingUpdate::start(self, chapter);

        match self.persist(chapter).await {
            Ok(()) => {
                pending.commit();
                info!(chapter, "reading progress updated");
                Ok(chapter)
            }
            Err(e) => {
                drop(pending);
                warn!(chapter, error = %e, "failed to save reading progress");
                Err(ProgressError::Fetch(e))
            }
        }
    }

    async fn persist(&self, chapter: u32) -> Result<(), FetchError> {
        match &self.backend {
            ProgressBackend::Remote(api) => {
                let patch = ProfilePatch {
                    user_progress: Some(chapter),
                    ..Default::default()
                };
                api.patch_profile(&patch).await.map(|_| ())
            }
            ProgressBackend::Local(Some(database)) => {
                let db = lock(database);
                db.put_entry(STORAGE_KEY_PROGRESS, &chapter)
                    .map_err(|e| FetchError::Persistence(e.to_string()))
            }
            ProgressBackend::Local(None) => Ok(()),
        }
    }

    fn commit(&self, chapter: u32) {
        self.publish(|state| {
            state.confirmed = chapter;
            state.pending = None;
        });
    }

    fn publish<F: FnOnce(&mut ProgressState)>(&self, change: F) {
        let displayed = {
            let mut state = lock(&self.state);
            change(&mut state);
            state.displayed()
        };
        self.displayed.send_replace(displayed);
    }
}

/// Optimistic value published for the duration of one write.
///
/// Dropped without [`commit`](Self::commit), on failure or when the caller
/// abandons the update mid-write, it withdraws the pending value.
struct PendingUpdate<'a> {
    store: &'a ReaderProgressStore,
    chapter: u32,
    settled: bool,
}

impl<'a> PendingUpdate<'a> {
    fn start(store: &'a ReaderProgressStore, chapter: u32) -> Self {
        store.publish(|state| state.pending = Some(chapter));
        Self {
            store,
            chapter,
            settled: false,
        }
    }

    fn commit(mut self) {
        self.store.commit(self.chapter);
        self.settled = true;
    }
}

impl Drop for PendingUpdate<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(chapter = self.chapter, "withdrawing unsaved progress");
            self.store.publish(|state| state.pending = None);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
