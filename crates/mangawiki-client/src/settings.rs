use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{info, warn};

use mangawiki_shared::constants::STORAGE_KEY_SPOILER_SETTINGS;
use mangawiki_shared::{ChapterRange, SpoilerSettings};
use mangawiki_store::Database;

use crate::error::{ClientError, Result};

/// Process-wide spoiler preferences, kept in the local database across
/// sessions and broadcast to every gate.
pub struct SpoilerSettingsStore {
    range: ChapterRange,
    database: Option<Arc<Mutex<Database>>>,
    current: watch::Sender<SpoilerSettings>,
}

impl SpoilerSettingsStore {
    pub fn new(range: ChapterRange, database: Option<Arc<Mutex<Database>>>) -> Self {
        let (current, _) = watch::channel(SpoilerSettings::default());
        Self {
            range,
            database,
            current,
        }
    }

    /// Read the saved settings.  Anything unreadable falls back to defaults.
    pub fn load(&self) -> SpoilerSettings {
        let Some(database) = self.database.as_ref() else {
            return self.get();
        };

        let stored = {
            let db = database.lock().unwrap_or_else(PoisonError::into_inner);
            db.get_entry::<SpoilerSettings>(STORAGE_KEY_SPOILER_SETTINGS)
        };

        let settings = match stored {
            Ok(Some(envelope)) if envelope.value.chapter_tolerance <= self.range.max => {
                envelope.value
            }
            Ok(Some(envelope)) => {
                warn!(
                    tolerance = envelope.value.chapter_tolerance,
                    "stored chapter tolerance out of range, using defaults"
                );
                SpoilerSettings::default()
            }
            Ok(None) => SpoilerSettings::default(),
            Err(e) => {
                warn!(error = %e, "failed to read spoiler settings");
                SpoilerSettings::default()
            }
        };

        self.current.send_replace(settings);
        settings
    }

    pub fn get(&self) -> SpoilerSettings {
        *self.current.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SpoilerSettings> {
        self.current.subscribe()
    }

    /// Replace the settings.  They are published only once saved.
    pub fn update(&self, settings: SpoilerSettings) -> Result<SpoilerSettings> {
        if settings.chapter_tolerance > self.range.max {
            return Err(ClientError::InvalidTolerance {
                value: settings.chapter_tolerance,
                max: self.range.max,
            });
        }

        if let Some(database) = self.database.as_ref() {
            let db = database.lock().unwrap_or_else(PoisonError::into_inner);
            db.put_entry(STORAGE_KEY_SPOILER_SETTINGS, &settings)?;
        }

        self.current.send_replace(settings);
        info!(
            show_all = settings.show_all_spoilers,
            tolerance = settings.chapter_tolerance,
            "Spoiler settings updated"
        );
        Ok(settings)
    }
}
