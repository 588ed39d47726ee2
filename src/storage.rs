//! Durable string-keyed slots.
//!
//! Writes are fire-and-forget from the caller's point of view: implementations
//! may queue them, but a later `get` on the same storage must observe every
//! earlier `set`/`remove`.

use anyhow::{anyhow, Result};
use std::{collections::HashMap, sync::Mutex};

pub trait SlotStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local storage, used when no database is available and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        slots.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        slots.remove(key);
        Ok(())
    }
}
