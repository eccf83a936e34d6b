pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod page_view;
pub mod progress;
pub mod settings;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use api::{ApiClient, ProfileApi};
pub use cache::{filter_signature, CacheOptions, CacheStats, PagedCache};
pub use config::ClientConfig;
pub use error::ClientError;
pub use page_view::{LoadStatus, PageSnapshot, PageView};
pub use progress::{ProgressBackend, ReaderProgressStore};
pub use settings::SpoilerSettingsStore;
pub use state::ClientContext;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the default filter.  Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mangawiki_client=debug,mangawiki_store=info,warn"));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    if installed.is_ok() {
        tracing::info!("Starting manga wiki client core");
    }
}
