//! Persisted resume points
//!
//! A checkpoint records where a run can safely continue: `next_line` and
//! `byte_offset` always point just past the last line whose outcome is
//! durable. Resuming seeks straight to the offset instead of re-reading the
//! prefix.

use crate::error::CheckpointError;
use crate::models::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source_path: PathBuf,
    pub kind: EntityKind,
    pub next_line: u64,
    pub byte_offset: u64,
    /// Lines processed across every run that contributed to this checkpoint
    pub lines_processed: u64,
    pub records_committed: u64,
    pub run_id: Uuid,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Write atomically: a crash mid-save leaves the previous checkpoint intact.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Check that this checkpoint belongs to `source` read as `kind`.
    pub fn validate(
        &self,
        source: &Path,
        kind: EntityKind,
        total_bytes: u64,
    ) -> Result<(), CheckpointError> {
        if !same_file(&self.source_path, source) {
            return Err(CheckpointError::Mismatch(format!(
                "saved for {}, not {}",
                self.source_path.display(),
                source.display()
            )));
        }
        if self.kind != kind {
            return Err(CheckpointError::Mismatch(format!(
                "saved for kind {}, not {}",
                self.kind, kind
            )));
        }
        if self.byte_offset > total_bytes {
            return Err(CheckpointError::Mismatch(format!(
                "offset {} is past the end of a {} byte file",
                self.byte_offset, total_bytes
            )));
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
