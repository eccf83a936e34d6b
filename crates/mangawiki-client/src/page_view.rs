//! List-page consumer state.
//!
//! A [`PageView`] is what a list page holds on to: the page and filters it
//! shows, the last page it rendered, and whether a load is running or
//! failed.  Data already on screen stays there while a newer load runs and
//! after one fails.
//!
//! Results are applied only if the view is still mounted and no newer
//! refresh was started; late results are dropped, the request itself is
//! never aborted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use mangawiki_shared::{CacheError, FetchError, PageEnvelope};

use crate::cache::{CacheOptions, PagedCache};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed(CacheError),
}

/// What the list page renders right now.
#[derive(Debug, Clone)]
pub struct PageSnapshot<T> {
    pub page: u32,
    /// Last page that loaded successfully, possibly for an earlier request.
    pub current: Option<PageEnvelope<T>>,
    pub status: LoadStatus,
}

impl<T> PageSnapshot<T> {
    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    pub fn error(&self) -> Option<&CacheError> {
        match &self.status {
            LoadStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// The latest load succeeded and returned no items.
    pub fn is_empty_result(&self) -> bool {
        self.status == LoadStatus::Ready
            && self.current.as_ref().map_or(true, PageEnvelope::is_empty)
    }
}

struct ViewState<T> {
    page: u32,
    filters: Value,
    current: Option<PageEnvelope<T>>,
    status: LoadStatus,
}

pub struct PageView<T> {
    resource: String,
    state: Mutex<ViewState<T>>,
    mounted: AtomicBool,
    generation: AtomicU64,
}

impl<T> PageView<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: Mutex::new(ViewState {
                page: 1,
                filters: Value::Object(Default::default()),
                current: None,
                status: LoadStatus::Idle,
            }),
            mounted: AtomicBool::new(true),
            generation: AtomicU64::new(0),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn set_page(&self, page: u32) {
        self.lock().page = page.max(1);
    }

    /// Change the filters; the view goes back to the first page.
    pub fn set_filters(&self, filters: Value) {
        let mut state = self.lock();
        state.filters = filters;
        state.page = 1;
    }

    pub fn snapshot(&self) -> PageSnapshot<T> {
        let state = self.lock();
        PageSnapshot {
            page: state.page,
            current: state.current.clone(),
            status: state.status.clone(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// The consumer went away; anything still loading is discarded on arrival.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    /// Load the current page through `cache`.
    ///
    /// Returns `true` if the result was applied to the view.
    pub async fn refresh<F, Fut>(&self, cache: &PagedCache, fetcher: F, options: CacheOptions) -> bool
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<PageEnvelope<T>, FetchError>> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (page, filters) = {
            let mut state = self.lock();
            state.status = LoadStatus::Loading;
            (state.page, state.filters.clone())
        };

        let result = cache
            .get_page(&self.resource, page, &filters, fetcher, options)
            .await;

        if !self.is_mounted() || self.generation.load(Ordering::SeqCst) != generation {
            debug!(resource = %self.resource, page, "discarding result for a stale view");
            return false;
        }

        let mut state = self.lock();
        match result {
            Ok(cached) => {
                state.current = Some(cached.envelope);
                state.status = LoadStatus::Ready;
            }
            Err(e) => {
                state.status = LoadStatus::Failed(e);
            }
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, ViewState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
