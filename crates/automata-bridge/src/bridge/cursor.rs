//! Persisted scan position for the deposit bridge.
//!
//! A single JSON document `{"next_block": N}`. It is rewritten only after
//! every event below `N` has been handled, so a restart replays at most the
//! range that was in flight.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Cursor {
    next_block: u64,
}

/// File-backed cursor.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next block to scan, or `None` if nothing has been saved yet.
    pub async fn load(&self) -> anyhow::Result<Option<u64>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };

        let cursor: Cursor = serde_json::from_slice(&raw)
            .with_context(|| format!("malformed cursor file {}", self.path.display()))?;
        Ok(Some(cursor.next_block))
    }

    /// Atomically replaces the stored cursor.
    pub async fn save(&self, next_block: u64) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&Cursor { next_block })?;
        let tmp = self.path.with_extension("tmp");

        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
