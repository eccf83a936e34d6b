//! Client context shared by every screen.
//!
//! [`ClientContext`] is built once at startup and owns the process-wide
//! collaborators: the REST client, the local database, the page cache and
//! the two reader stores.  Consumers clone the `Arc`s they need.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use mangawiki_shared::constants::RESOURCE_USERS;
use mangawiki_shared::{GateState, ProfilePatch, SpoilerGate, Spoilerable, UserProfile};
use mangawiki_store::Database;

use crate::api::{ApiClient, ProfileApi};
use crate::cache::PagedCache;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::progress::{ProgressBackend, ReaderProgressStore};
use crate::settings::SpoilerSettingsStore;

pub struct ClientContext {
    config: ClientConfig,
    api: Arc<ApiClient>,
    database: Option<Arc<Mutex<Database>>>,
    cache: Arc<PagedCache>,
    progress: Arc<ReaderProgressStore>,
    spoilers: Arc<SpoilerSettingsStore>,
}

impl ClientContext {
    /// Open the local database and hydrate every store.
    ///
    /// A progress fetch that fails leaves the reader at the default and is
    /// only logged; a database that cannot be opened fails startup.
    pub async fn init(config: ClientConfig) -> Result<Self> {
        let database = match &config.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        let database = Arc::new(Mutex::new(database));

        Ok(Self::with_database(config, Some(database)).await)
    }

    /// Same as [`init`](Self::init), without any local database.  Nothing
    /// outlives the process.
    pub async fn in_memory(config: ClientConfig) -> Self {
        Self::with_database(config, None).await
    }

    async fn with_database(config: ClientConfig, database: Option<Arc<Mutex<Database>>>) -> Self {
        let range = config.chapter_range();
        let api = Arc::new(ApiClient::new(
            config.api_url.clone(),
            config.access_token.clone(),
        ));

        let cache = match &database {
            Some(db) => PagedCache::with_database(config.cache_max_entries, Arc::clone(db)),
            None => PagedCache::new(config.cache_max_entries),
        };
        if config.cache_persist {
            let restored = cache.rehydrate(config.cache_ttl);
            if restored > 0 {
                info!(restored, "Restored cached pages");
            }
        }

        let spoilers = SpoilerSettingsStore::new(range, database.clone());
        spoilers.load();

        let backend = if api.is_authenticated() {
            ProgressBackend::Remote(Arc::clone(&api) as Arc<dyn ProfileApi>)
        } else {
            ProgressBackend::Local(database.clone())
        };
        let progress = ReaderProgressStore::new(range, backend);
        if let Err(e) = progress.load().await {
            warn!(error = %e, "Failed to load reading progress, starting from chapter 0");
        }

        info!(
            api_url = %config.api_url,
            authenticated = api.is_authenticated(),
            progress = progress.get_progress(),
            "Client context ready"
        );

        Self {
            config,
            api,
            database,
            cache: Arc::new(cache),
            progress: Arc::new(progress),
            spoilers: Arc::new(spoilers),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> Arc<ApiClient> {
        Arc::clone(&self.api)
    }

    pub fn database(&self) -> Option<Arc<Mutex<Database>>> {
        self.database.clone()
    }

    pub fn cache(&self) -> Arc<PagedCache> {
        Arc::clone(&self.cache)
    }

    pub fn progress(&self) -> Arc<ReaderProgressStore> {
        Arc::clone(&self.progress)
    }

    pub fn spoilers(&self) -> Arc<SpoilerSettingsStore> {
        Arc::clone(&self.spoilers)
    }

    pub fn gate<C: Spoilerable>(&self, content: C) -> SpoilerGate<C> {
        SpoilerGate::new(content)
    }

    /// Evaluate `gate` against the latest settings and progress.
    pub fn gate_state<C: Spoilerable>(&self, gate: &SpoilerGate<C>) -> GateState {
        gate.state(&self.spoilers.get(), self.progress.get_progress())
    }

    /// Gate `content` and label its placeholder with the chapter title,
    /// when the chapter endpoint knows one.
    pub async fn gate_with_title<C: Spoilerable>(&self, content: C) -> SpoilerGate<C> {
        let chapter = content.chapter_number();
        let gate = self.gate(content);
        let Some(number) = chapter else {
            return gate;
        };
        if self.gate_state(&gate) == GateState::Revealed {
            return gate;
        }

        match self.api.get_chapter(number).await {
            Ok(chapter) => match chapter.title {
                Some(title) => gate.with_chapter_title(title),
                None => gate,
            },
            Err(e) => {
                warn!(chapter = number, error = %e, "Chapter title unavailable");
                gate
            }
        }
    }

    /// Rename the signed-in reader.  Cached user pages are dropped so the
    /// new name shows up on the next list load.
    pub async fn update_username(&self, username: &str) -> Result<UserProfile> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ClientError::EmptyUsername);
        }
        if !self.api.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }

        let patch = ProfilePatch {
            username: Some(username.to_string()),
            ..Default::default()
        };
        let profile = self.api.patch_profile(&patch).await?;

        let dropped = self.cache.invalidate(RESOURCE_USERS);
        info!(username = %profile.username, dropped, "Username updated");
        Ok(profile)
    }
}
