use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CommandSet, CommandStore};
use crate::{errors::Error, scope::Scope, Result};

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCommandStore {
    sets: Mutex<HashMap<Scope, CommandSet>>,
    fail_saves: AtomicBool,
}

impl MemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail (simulates a full or read-only disk).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn scope_count(&self) -> usize {
        self.sets.lock().await.len()
    }
}

#[async_trait]
impl CommandStore for MemoryCommandStore {
    async fn load(&self, scope: &Scope) -> CommandSet {
        self.sets
            .lock()
            .await
            .get(scope)
            .cloned()
            .unwrap_or_default()
    }

    async fn save(&self, scope: &Scope, commands: &CommandSet) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store configured to fail saves",
            )));
        }
        self.sets.lock().await.insert(*scope, commands.clone());
        Ok(())
    }
}
