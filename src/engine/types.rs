//! Engine types
//!
//! Message types, configuration, and statistics for the sync engine.

use crate::types::JsonValue;
use serde_json::json;

/// A message emitted during sync
#[derive(Debug, Clone)]
pub enum Message {
    /// One extracted record
    Record {
        /// Stream name
        stream: String,
        /// The record payload
        record: JsonValue,
    },
    /// State update
    State {
        /// Stream name
        stream: String,
        /// State data (bookmark, partition info)
        data: JsonValue,
    },
    /// Log message
    Log {
        /// Log level
        level: LogLevel,
        /// Log message
        message: String,
    },
}

/// Log level for engine messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// General information
    Info,
    /// Warning
    Warn,
    /// Error (non-fatal)
    Error,
}

impl Message {
    /// Create a record message
    pub fn record(stream: impl Into<String>, record: JsonValue) -> Self {
        Self::Record {
            stream: stream.into(),
            record,
        }
    }

    /// Create a state message
    pub fn state(stream: impl Into<String>, data: JsonValue) -> Self {
        Self::State {
            stream: stream.into(),
            data,
        }
    }

    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Create an info log
    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    /// Create a debug log
    pub fn debug(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Debug, message)
    }

    /// Create a warning log
    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    /// Create an error log
    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Render as a JSON-line value for output
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Record { stream, record } => json!({
                "type": "RECORD",
                "stream": stream,
                "record": record,
            }),
            Self::State { stream, data } => json!({
                "type": "STATE",
                "stream": stream,
                "value": data,
            }),
            Self::Log { level, message } => json!({
                "type": "LOG",
                "level": format!("{level:?}").to_uppercase(),
                "message": message,
            }),
        }
    }
}

/// Per-stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Not started (or skipped because an ancestor failed)
    Pending,
    /// Currently syncing
    Running,
    /// Finished; bookmarks flushed
    Completed,
    /// Aborted; unstarted descendants are skipped
    Failed,
}

/// Configuration for a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Persist state after every page instead of only at checkpoints
    pub checkpoint_per_page: bool,
    /// Maximum records per stream (0 = unlimited)
    pub max_records: usize,
    /// Abort the whole run on the first stream failure
    pub fail_fast: bool,
}

impl SyncConfig {
    /// Create a new sync config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist state after every page
    #[must_use]
    pub fn with_checkpoint_per_page(mut self, enabled: bool) -> Self {
        self.checkpoint_per_page = enabled;
        self
    }

    /// Set max records per stream
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    /// Set fail fast mode
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Statistics from a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total records emitted
    pub records_synced: usize,
    /// Total pages fetched
    pub pages_fetched: usize,
    /// Total streams completed
    pub streams_synced: usize,
    /// Total partitions completed
    pub partitions_synced: usize,
    /// Stream failures
    pub errors: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records
    pub fn add_records(&mut self, count: usize) {
        self.records_synced += count;
    }

    /// Add a page
    pub fn add_page(&mut self) {
        self.pages_fetched += 1;
    }

    /// Add a completed stream
    pub fn add_stream(&mut self) {
        self.streams_synced += 1;
    }

    /// Add a completed partition
    pub fn add_partition(&mut self) {
        self.partitions_synced += 1;
    }

    /// Add an error
    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}
