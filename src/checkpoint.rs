//! Checkpoints
//!
//! A checkpoint is the resume bound for the next run: one minute after the
//! newest emitted row. The service's range filter is inclusive, so starting
//! exactly at the last row would fetch it again.

use crate::aggregate::TIMESTAMP_FORMAT;
use crate::error::{SyncError, SyncResult};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Resume bound persisted between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checkpoint(NaiveDateTime);

impl Checkpoint {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self(timestamp)
    }

    /// Checkpoint following the newest emitted timestamp
    pub fn after(latest: NaiveDateTime) -> Self {
        Self(latest + Duration::minutes(1))
    }

    /// Parse `YYYY-MM-DD HH:MM:SS`
    pub fn parse(s: &str) -> SyncResult<Self> {
        NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
            .map(Self)
            .map_err(|e| SyncError::Config(format!("invalid checkpoint {:?}: {}", s, e)))
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl TryFrom<String> for Checkpoint {
    type Error = SyncError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Checkpoint> for String {
    fn from(c: Checkpoint) -> Self {
        c.to_string()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    last_date: Option<Checkpoint>,
}

/// JSON file holding the checkpoint between runs
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored checkpoint; a missing file means none
    pub fn load(&self) -> SyncResult<Option<Checkpoint>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: StateFile = serde_json::from_str(&content)?;
        Ok(state.last_date)
    }

    /// Replace the stored checkpoint
    pub fn save(&self, checkpoint: &Checkpoint) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let state = StateFile {
            last_date: Some(*checkpoint),
        };
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&state)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = ?self.path, checkpoint = %checkpoint, "checkpoint saved");
        Ok(())
    }
}
