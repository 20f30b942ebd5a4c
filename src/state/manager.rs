//! Bookmark store implementation
//!
//! File-based persistence with atomic writes. Bookmarks advance in memory
//! after each page and are flushed at checkpoint boundaries; a restart can
//! therefore never see a value newer than what was actually emitted.

use super::types::TapState;
use crate::error::{Error, Result};
use crate::types::{newer_than, parse_datetime, JsonValue, RequestContext};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Bookmark store for persisting and loading replication state
#[derive(Debug)]
pub struct BookmarkStore {
    /// Path to the state file
    path: PathBuf,
    /// Current state (cached)
    state: Arc<RwLock<TapState>>,
    /// Whether to persist on every bookmark write
    auto_save: bool,
}

impl BookmarkStore {
    /// Create a new store backed by the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Arc::new(RwLock::new(TapState::new())),
            auto_save: false,
        }
    }

    /// Create an in-memory store (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(TapState::new())),
            auto_save: false,
        }
    }

    /// Create a store from a file, loading existing state if present
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| Error::State {
                message: format!("Failed to read state file: {e}"),
            })?;
            serde_json::from_str(&contents).map_err(|e| Error::State {
                message: format!("Failed to parse state file: {e}"),
            })?
        } else {
            TapState::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
            auto_save: false,
        })
    }

    /// Create a store from inline JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let state: TapState = serde_json::from_str(json).map_err(|e| Error::State {
            message: format!("Failed to parse state JSON: {e}"),
        })?;

        Ok(Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(state)),
            auto_save: false,
        })
    }

    /// Persist on every bookmark write instead of waiting for checkpoints
    #[must_use]
    pub fn with_auto_save(mut self) -> Self {
        self.auto_save = true;
        self
    }

    /// Load state from file
    pub async fn load(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to read state file: {e}"),
            })?;

        let loaded: TapState = serde_json::from_str(&contents).map_err(|e| Error::State {
            message: format!("Failed to parse state file: {e}"),
        })?;

        let mut state = self.state.write().await;
        *state = loaded;

        Ok(())
    }

    /// Save current state to file
    pub async fn save(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(()); // In-memory mode
        }

        let state = self.state.read().await;
        let contents = serde_json::to_string_pretty(&*state).map_err(|e| Error::State {
            message: format!("Failed to serialize state: {e}"),
        })?;
        drop(state);

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::Checkpoint {
                message: format!("Failed to write state file: {e}"),
            })?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::Checkpoint {
                message: format!("Failed to rename state file: {e}"),
            })?;

        Ok(())
    }

    /// Create a checkpoint (alias for save)
    pub async fn checkpoint(&self) -> Result<()> {
        self.save().await
    }

    /// Export state as JSON string
    pub async fn to_json(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string(&*state).map_err(|e| Error::State {
            message: format!("Failed to serialize state: {e}"),
        })
    }

    /// Export one stream's state as a JSON value, if any exists
    pub async fn export_stream(&self, stream: &str) -> Result<Option<JsonValue>> {
        let state = self.state.read().await;
        state
            .get_stream(stream)
            .map(|s| serde_json::to_value(s).map_err(Error::JsonParse))
            .transpose()
    }

    // ========================================================================
    // Bookmarks
    // ========================================================================

    /// Get the bookmark value for a (stream, partition) pair
    ///
    /// An empty context addresses the stream's flat bookmark.
    pub async fn bookmark(&self, stream: &str, context: &RequestContext) -> Result<Option<String>> {
        let state = self.state.read().await;
        let Some(stream_state) = state.get_stream(stream) else {
            return Ok(None);
        };

        if context.is_empty() {
            return Ok(stream_state.replication_key_value.clone());
        }

        Ok(stream_state
            .partition(stream, context)?
            .and_then(|p| p.replication_key_value.clone()))
    }

    /// Advance the bookmark for a (stream, partition) pair
    ///
    /// Never decreases a stored value; a partition entry is created if one
    /// does not exist yet.
    pub async fn advance(
        &self,
        stream: &str,
        context: &RequestContext,
        value: &str,
    ) -> Result<()> {
        {
            let mut state = self.state.write().await;
            let stream_state = state.get_stream_mut(stream);

            if context.is_empty() {
                advance_slot(&mut stream_state.replication_key_value, value);
            } else {
                if stream_state.partition(stream, context)?.is_none() {
                    stream_state.insert_partition(stream, context.clone())?;
                }
                let entry = stream_state
                    .partition_mut(stream, context)?
                    .ok_or_else(|| Error::state("partition entry missing after insert"))?;
                advance_slot(&mut entry.replication_key_value, value);
            }
        }

        if self.auto_save {
            self.save().await?;
        }

        Ok(())
    }

    // ========================================================================
    // Partitions
    // ========================================================================

    /// Check whether a partition entry exists
    pub async fn has_partition(&self, stream: &str, context: &RequestContext) -> Result<bool> {
        let state = self.state.read().await;
        match state.get_stream(stream) {
            Some(stream_state) => Ok(stream_state.partition(stream, context)?.is_some()),
            None => Ok(false),
        }
    }

    /// Insert a new partition entry, rejecting duplicates
    pub async fn insert_partition(&self, stream: &str, context: RequestContext) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state
                .get_stream_mut(stream)
                .insert_partition(stream, context)?;
        }

        if self.auto_save {
            self.save().await?;
        }

        Ok(())
    }

    /// Keep only the given partition for a stream
    ///
    /// Streams that re-derive their partitions from the parent every run
    /// store just the most recently seen one.
    pub async fn retain_latest_partition(
        &self,
        stream: &str,
        context: RequestContext,
    ) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.get_stream_mut(stream).retain_latest(context);
        }

        if self.auto_save {
            self.save().await?;
        }

        Ok(())
    }

    /// The partition contexts recorded for a stream, in stored order
    pub async fn partitions_for(&self, stream: &str) -> Result<Vec<RequestContext>> {
        let state = self.state.read().await;
        match state.get_stream(stream) {
            Some(stream_state) => {
                stream_state.check_distinct(stream)?;
                Ok(stream_state
                    .partitions
                    .iter()
                    .map(|p| p.context.clone())
                    .collect())
            }
            None => Ok(Vec::new()),
        }
    }

    // ========================================================================
    // Starting point
    // ========================================================================

    /// Compute where the next run of a partition should start
    ///
    /// A prior bookmark yields `value + 1 second`: the upstream filter is an
    /// inclusive-boundary range, so starting exactly at the bookmark would
    /// re-fetch the record already seen at that timestamp. With no bookmark
    /// the configured start date applies.
    pub async fn starting_point(
        &self,
        stream: &str,
        context: &RequestContext,
        start_date: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>> {
        match self.bookmark(stream, context).await? {
            Some(value) => {
                let parsed = parse_datetime(&value).ok_or_else(|| {
                    Error::state(format!(
                        "Unparseable bookmark value '{value}' for stream '{stream}'"
                    ))
                })?;
                Ok(Some(parsed + Duration::seconds(1)))
            }
            None => Ok(start_date),
        }
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

/// Monotonic bookmark update: never decreases a stored value
fn advance_slot(slot: &mut Option<String>, value: &str) {
    match slot {
        Some(current) if !newer_than(value, current) => {}
        _ => *slot = Some(value.to_string()),
    }
}

impl Clone for BookmarkStore {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            state: Arc::clone(&self.state),
            auto_save: self.auto_save,
        }
    }
}
