//! `storage_slots` table as a key-value store.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::storage::SlotStorage;

use super::Database;

impl SlotStorage for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute_blocking(move |conn| {
            conn.query_row(
                "SELECT value FROM storage_slots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read slot {key}"))
        })
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.submit("slot set", move |conn| {
            conn.execute(
                "INSERT INTO storage_slots (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.submit("slot remove", move |conn| {
            conn.execute("DELETE FROM storage_slots WHERE key = ?1", params![key])?;
            Ok(())
        })
    }
}
