//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs. A stream
//! holds either a flat bookmark (parentless streams) or a `partitions` list
//! of `{context, ...bookmark}` entries (child streams). Structural equality
//! of the context object is the partition identity.

use crate::error::{Error, Result};
use crate::types::{JsonObject, RequestContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete persisted state for a sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapState {
    /// Per-stream state
    #[serde(default)]
    pub streams: HashMap<String, StreamState>,
}

impl TapState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&StreamState> {
        self.streams.get(stream)
    }

    /// Get mutable state for a stream, creating if needed
    pub fn get_stream_mut(&mut self, stream: &str) -> &mut StreamState {
        self.streams.entry(stream.to_string()).or_default()
    }
}

/// State for a single stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamState {
    /// Flat bookmark for streams without partitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key_value: Option<String>,

    /// Per-partition bookmarks, keyed by structural equality of `context`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionState>,
}

impl StreamState {
    /// Create a new empty stream state
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the partition entry matching a context
    ///
    /// More than one structural match means the persisted state is
    /// ambiguous and is rejected rather than silently collapsed.
    pub fn partition(&self, stream: &str, context: &RequestContext) -> Result<Option<&PartitionState>> {
        let mut found = None;
        for entry in &self.partitions {
            if &entry.context == context {
                if found.is_some() {
                    return Err(Error::duplicate_partition(stream, context));
                }
                found = Some(entry);
            }
        }
        Ok(found)
    }

    /// Find the partition entry matching a context, mutably
    pub fn partition_mut(
        &mut self,
        stream: &str,
        context: &RequestContext,
    ) -> Result<Option<&mut PartitionState>> {
        let mut index = None;
        for (i, entry) in self.partitions.iter().enumerate() {
            if &entry.context == context {
                if index.is_some() {
                    return Err(Error::duplicate_partition(stream, context));
                }
                index = Some(i);
            }
        }
        Ok(index.map(move |i| &mut self.partitions[i]))
    }

    /// Insert a new partition entry
    ///
    /// Inserting a second entry for an already-present context is a
    /// programming error, not a merge.
    pub fn insert_partition(
        &mut self,
        stream: &str,
        context: RequestContext,
    ) -> Result<&mut PartitionState> {
        if self.partition(stream, &context)?.is_some() {
            return Err(Error::duplicate_partition(stream, &context));
        }
        self.partitions.push(PartitionState::new(context));
        Ok(self.partitions.last_mut().expect("just pushed"))
    }

    /// Drop every partition entry except one for the given context
    ///
    /// Used for streams whose partitions are re-derived from the parent on
    /// every run; only the most recently seen partition is kept.
    pub fn retain_latest(&mut self, context: RequestContext) -> &mut PartitionState {
        let existing = self
            .partitions
            .iter()
            .position(|entry| entry.context == context)
            .map(|i| self.partitions.swap_remove(i));
        self.partitions.clear();
        self.partitions
            .push(existing.unwrap_or_else(|| PartitionState::new(context)));
        self.partitions.last_mut().expect("just pushed")
    }

    /// Reject state that carries two entries for the same context
    pub fn check_distinct(&self, stream: &str) -> Result<()> {
        for (i, entry) in self.partitions.iter().enumerate() {
            for other in &self.partitions[i + 1..] {
                if entry.context == other.context {
                    return Err(Error::duplicate_partition(stream, &entry.context));
                }
            }
        }
        Ok(())
    }
}

/// State for a single partition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionState {
    /// The context object identifying this partition
    pub context: RequestContext,

    /// Bookmark value within this partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key_value: Option<String>,

    /// Arbitrary extra state carried alongside the bookmark
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl PartitionState {
    /// Create a new empty partition state for a context
    pub fn new(context: RequestContext) -> Self {
        Self {
            context,
            replication_key_value: None,
            extra: JsonObject::new(),
        }
    }
}
