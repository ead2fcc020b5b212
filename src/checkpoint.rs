use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::CheckpointConfig;
use crate::models::ItemOutcome;
use crate::Result;

/// Durable progress of one processing batch, keyed by item id. Outcomes
/// are write-once: the first recorded outcome for an item sticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub batch_id: String,
    pub outcomes: HashMap<String, ItemOutcome>,
    pub last_saved_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    unflushed: usize,
}

impl CheckpointState {
    pub fn new(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            outcomes: HashMap::new(),
            last_saved_at: None,
            unflushed: 0,
        }
    }

    pub fn is_processed(&self, item_id: &str) -> bool {
        self.outcomes.contains_key(item_id)
    }

    /// Record an item outcome. Returns false when the item already has
    /// one; recorded outcomes never change.
    pub fn record_outcome(&mut self, item_id: &str, outcome: ItemOutcome) -> bool {
        if self.outcomes.contains_key(item_id) {
            return false;
        }
        self.outcomes.insert(item_id.to_string(), outcome);
        self.unflushed += 1;
        true
    }

    pub fn processed_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn count_of(&self, outcome: ItemOutcome) -> usize {
        self.outcomes.values().filter(|&&o| o == outcome).count()
    }
}

/// Writes checkpoint state to one JSON file per batch, atomically via a
/// temp file rename. A crash leaves either the previous checkpoint or the
/// new one, never a torn file; at worst the tail since the last flush is
/// reprocessed.
pub struct CheckpointManager {
    dir: PathBuf,
    flush_every: usize,
}

impl CheckpointManager {
    pub fn new(config: &CheckpointConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            flush_every: config.flush_every.max(1),
        }
    }

    fn path_for(&self, batch_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", batch_id))
    }

    /// Resume a batch from its checkpoint file, or start fresh when no
    /// file exists.
    pub async fn load_or_start(&self, batch_id: &str) -> Result<CheckpointState> {
        let path = self.path_for(batch_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let state: CheckpointState = serde_json::from_str(&contents)?;
                info!(
                    batch_id,
                    processed = state.processed_count(),
                    "resuming batch from checkpoint"
                );
                Ok(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(batch_id, "no checkpoint found, starting fresh");
                Ok(CheckpointState::new(batch_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Time to flush? Based on outcomes recorded since the last flush.
    pub fn should_flush(&self, state: &CheckpointState) -> bool {
        state.unflushed >= self.flush_every
    }

    pub async fn flush(&self, state: &mut CheckpointState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        state.last_saved_at = Some(Utc::now());
        let serialized = serde_json::to_string_pretty(state)?;

        let path = self.path_for(&state.batch_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(
            batch_id = %state.batch_id,
            processed = state.processed_count(),
            "checkpoint flushed"
        );
        state.unflushed = 0;
        Ok(())
    }

    /// Remove a finished batch's checkpoint file.
    pub async fn clear(&self, batch_id: &str) -> Result<()> {
        let path = self.path_for(batch_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
