use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::kv::decode_envelope;
use crate::models::{Envelope, PersistedPage};

impl Database {
    pub fn put_page(
        &self,
        resource_key: &str,
        page: u32,
        filter_signature: &str,
        envelope: &Envelope<serde_json::Value>,
    ) -> Result<()> {
        let json = serde_json::to_string(envelope)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO page_cache (resource_key, page, filter_signature, envelope)
             VALUES (?1, ?2, ?3, ?4)",
            params![resource_key, page, filter_signature, json],
        )?;
        Ok(())
    }

    /// Read one persisted page. Malformed rows are deleted and reported as absent.
    pub fn get_page(
        &self,
        resource_key: &str,
        page: u32,
        filter_signature: &str,
    ) -> Result<Option<Envelope<serde_json::Value>>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT envelope FROM page_cache
                 WHERE resource_key = ?1 AND page = ?2 AND filter_signature = ?3",
                params![resource_key, page, filter_signature],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let key = page_key(resource_key, page, filter_signature);
        match decode_envelope(&key, &raw) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(StoreError::Malformed { key, reason }) => {
                tracing::warn!(%key, %reason, "discarding malformed cached page");
                self.delete_page(resource_key, page, filter_signature)?;
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// All persisted pages, oldest fetch first.  Malformed rows are dropped.
    pub fn list_pages(&self) -> Result<Vec<PersistedPage>> {
        let mut stmt = self.conn().prepare(
            "SELECT resource_key, page, filter_signature, envelope FROM page_cache",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut pages = Vec::new();
        let mut malformed = Vec::new();
        for row in rows {
            let (resource_key, page, filter_signature, raw) = row?;
            let key = page_key(&resource_key, page, &filter_signature);
            match decode_envelope(&key, &raw) {
                Ok(envelope) => pages.push(PersistedPage {
                    resource_key,
                    page,
                    filter_signature,
                    envelope,
                }),
                Err(StoreError::Malformed { reason, .. }) => {
                    tracing::warn!(%key, %reason, "discarding malformed cached page");
                    malformed.push((resource_key, page, filter_signature));
                }
                Err(other) => return Err(other),
            }
        }

        for (resource_key, page, filter_signature) in malformed {
            self.delete_page(&resource_key, page, &filter_signature)?;
        }

        pages.sort_by_key(|p| p.envelope.timestamp);
        Ok(pages)
    }

    pub fn delete_page(&self, resource_key: &str, page: u32, filter_signature: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM page_cache
             WHERE resource_key = ?1 AND page = ?2 AND filter_signature = ?3",
            params![resource_key, page, filter_signature],
        )?;
        Ok(affected > 0)
    }

    /// Drop every page of one resource regardless of page or filters.
    pub fn delete_resource_pages(&self, resource_key: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM page_cache WHERE resource_key = ?1",
            params![resource_key],
        )?;
        Ok(affected)
    }

    pub fn clear_pages(&self) -> Result<usize> {
        Ok(self.conn().execute("DELETE FROM page_cache", [])?)
    }
}

fn page_key(resource_key: &str, page: u32, filter_signature: &str) -> String {
    format!("{resource_key}:{page}:{filter_signature}")
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::*;

    fn envelope(total: u64) -> Envelope<serde_json::Value> {
        Envelope::now(json!({"data": [], "total": total, "page": 1, "totalPages": 1}))
    }

    #[test]
    fn page_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.put_page("characters", 1, "{}", &envelope(120)).unwrap();

        let loaded = db.get_page("characters", 1, "{}").unwrap().unwrap();
        assert_eq!(loaded.value["total"], 120);
        assert!(db.get_page("characters", 2, "{}").unwrap().is_none());
        assert!(db.get_page("characters", 1, "{\"q\":\"a\"}").unwrap().is_none());
    }

    #[test]
    fn delete_resource_only_touches_that_resource() {
        let db = Database::open_in_memory().unwrap();
        db.put_page("users", 1, "{}", &envelope(3)).unwrap();
        db.put_page("users", 2, "{\"role\":\"admin\"}", &envelope(3)).unwrap();
        db.put_page("characters", 1, "{}", &envelope(120)).unwrap();

        assert_eq!(db.delete_resource_pages("users").unwrap(), 2);
        assert!(db.get_page("users", 1, "{}").unwrap().is_none());
        assert!(db.get_page("characters", 1, "{}").unwrap().is_some());
    }

    #[test]
    fn list_pages_orders_by_fetch_time_and_drops_garbage() {
        let db = Database::open_in_memory().unwrap();
        let mut older = envelope(1);
        older.timestamp = Utc::now() - Duration::minutes(5);
        db.put_page("users", 1, "{}", &envelope(2)).unwrap();
        db.put_page("characters", 1, "{}", &older).unwrap();
        db.conn()
            .execute(
                "INSERT INTO page_cache (resource_key, page, filter_signature, envelope)
                 VALUES ('guides', 1, '{}', 'not json')",
                [],
            )
            .unwrap();

        let pages = db.list_pages().unwrap();
        let keys: Vec<_> = pages.iter().map(|p| p.resource_key.as_str()).collect();
        assert_eq!(keys, vec!["characters", "users"]);
        assert!(!db.delete_page("guides", 1, "{}").unwrap());
    }
}
