use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{CommandSet, CommandStore};
use crate::{scope::Scope, Result};

const COMMANDS_FILE: &str = "commands.json";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem store: `<root>/<scope_key>/commands.json`.
///
/// Files are pretty-printed JSON objects so they can be inspected and edited
/// by hand. Saves go through a temp file in the same directory followed by a
/// rename, so readers only ever see a complete record.
#[derive(Clone, Debug)]
pub struct FsCommandStore {
    root: PathBuf,
}

impl FsCommandStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn scope_dir(&self, scope: &Scope) -> PathBuf {
        self.root.join(scope.storage_key())
    }

    pub fn commands_path(&self, scope: &Scope) -> PathBuf {
        self.scope_dir(scope).join(COMMANDS_FILE)
    }
}

#[async_trait]
impl CommandStore for FsCommandStore {
    async fn load(&self, scope: &Scope) -> CommandSet {
        let path = self.commands_path(scope);
        let txt = match tokio::fs::read_to_string(&path).await {
            Ok(txt) => txt,
            Err(e) if e.kind() == ErrorKind::NotFound => return CommandSet::new(),
            Err(e) => {
                warn!(%scope, path = %path.display(), error = %e, "unreadable command set, using empty");
                return CommandSet::new();
            }
        };

        if txt.trim().is_empty() {
            return CommandSet::new();
        }

        match serde_json::from_str::<CommandSet>(&txt) {
            Ok(set) => set.normalized(),
            Err(e) => {
                warn!(%scope, path = %path.display(), error = %e, "corrupt command set, using empty");
                CommandSet::new()
            }
        }
    }

    async fn save(&self, scope: &Scope, commands: &CommandSet) -> Result<()> {
        let dir = self.scope_dir(scope);
        tokio::fs::create_dir_all(&dir).await?;

        let body = to_pretty_json(commands)?;
        let target = dir.join(COMMANDS_FILE);
        let tmp = dir.join(format!(
            ".{COMMANDS_FILE}.tmp.{}.{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_synced(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(%scope, entries = commands.len(), "command set saved");
        Ok(())
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await?;
    Ok(())
}

fn to_pretty_json(commands: &CommandSet) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    commands.serialize(&mut ser)?;
    Ok(buf)
}
