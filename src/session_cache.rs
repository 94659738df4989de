use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rep_leaderboard::{normalize_rows, ParticipantRecord, RawRecord};

/// Last good record list on disk, so a restart can rank before the first
/// fetch lands. Records are read back through the normalizer.
#[derive(Clone)]
pub(crate) struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn load(&self) -> Result<Option<Vec<ParticipantRecord>>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        let rows: Vec<RawRecord> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid session cache {}", self.path.display()))?;
        Ok(Some(normalize_rows(&rows)))
    }

    pub(crate) async fn store(&self, records: &[ParticipantRecord]) -> Result<()> {
        let json = serde_json::to_vec(records).context("Failed to encode session cache")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}
