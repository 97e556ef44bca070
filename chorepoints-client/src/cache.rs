use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ClientError;
use crate::repository::Snapshot;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    server_url: String,
    saved_at: DateTime<Utc>,
    snapshot: Snapshot,
}

/// Last good snapshot on disk, so a client can show something while the
/// server is unreachable.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
    server_url: String,
}

impl SnapshotCache {
    pub fn new(path: PathBuf, server_url: &str) -> Self {
        Self {
            path,
            server_url: server_url.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when there is no cache yet, or it belongs to another server.
    pub fn load(&self) -> Result<Option<(DateTime<Utc>, Snapshot)>, ClientError> {
        let data = match std::fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: CacheFile = match serde_json::from_slice(&data) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable snapshot cache");
                return Ok(None);
            }
        };
        if file.server_url != self.server_url {
            tracing::info!(cached = %file.server_url, "snapshot cache is for another server");
            return Ok(None);
        }
        Ok(Some((file.saved_at, file.snapshot)))
    }

    /// Write through a temp file in the same directory, so readers never see
    /// a half-written cache.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), ClientError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let file = CacheFile {
            server_url: self.server_url.clone(),
            saved_at: Utc::now(),
            snapshot: snapshot.clone(),
        };
        let data = serde_json::to_vec(&file)
            .map_err(|e| ClientError::Config(format!("serialize snapshot failed: {e}")))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
