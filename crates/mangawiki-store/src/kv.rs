use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Envelope;

impl Database {
    /// Write `value` under `key`, stamped with the current time.
    pub fn put_entry<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(&Envelope::now(value))?;
        self.conn().execute(
            "INSERT OR REPLACE INTO kv_entries (key, envelope) VALUES (?1, ?2)",
            params![key, json],
        )?;
        Ok(())
    }

    /// Read the envelope stored under `key`.
    ///
    /// A record that does not decode as `Envelope<T>` is deleted and reported
    /// as absent.
    pub fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Envelope<T>>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT envelope FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match decode_envelope(key, &raw) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(StoreError::Malformed { key, reason }) => {
                tracing::warn!(%key, %reason, "discarding malformed entry");
                self.delete_entry(&key)?;
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    pub fn delete_entry(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

pub(crate) fn decode_envelope<T: DeserializeOwned>(key: &str, raw: &str) -> Result<Envelope<T>> {
    serde_json::from_str(raw).map_err(|e| StoreError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        show_all: bool,
        tolerance: u32,
    }

    #[test]
    fn entry_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let prefs = Prefs {
            show_all: false,
            tolerance: 45,
        };
        db.put_entry("mangawiki:prefs", &prefs).unwrap();

        let loaded = db.get_entry::<Prefs>("mangawiki:prefs").unwrap().unwrap();
        assert_eq!(loaded.value, prefs);
    }

    #[test]
    fn missing_entry_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_entry::<u32>("mangawiki:progress").unwrap().is_none());
    }

    #[test]
    fn overwrite_replaces_value() {
        let db = Database::open_in_memory().unwrap();
        db.put_entry("mangawiki:progress", &30u32).unwrap();
        db.put_entry("mangawiki:progress", &31u32).unwrap();
        let loaded = db.get_entry::<u32>("mangawiki:progress").unwrap().unwrap();
        assert_eq!(loaded.value, 31);
    }

    #[test]
    fn malformed_entry_is_discarded() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO kv_entries (key, envelope) VALUES (?1, ?2)",
                params!["mangawiki:progress", "{\"value\": \"thirty\"}"],
            )
            .unwrap();

        assert!(db.get_entry::<u32>("mangawiki:progress").unwrap().is_none());
        assert!(!db.delete_entry("mangawiki:progress").unwrap());
    }

    #[test]
    fn wrong_shape_is_discarded() {
        let db = Database::open_in_memory().unwrap();
        db.put_entry("mangawiki:progress", &"not a number").unwrap();
        assert!(db.get_entry::<u32>("mangawiki:progress").unwrap().is_none());
    }
}
