//! Execution engine
//!
//! The dependency scheduler walks the stream graph parents-first, resolves
//! the partitions for each stream, drives the paginator per partition, and
//! advances bookmarks as pages complete. Child-partition contexts queue up
//! as parent records are yielded, so a child sync never runs ahead of its
//! parent. A failed stream aborts its own remaining partitions and skips
//! its unstarted descendants; independent sibling subtrees continue.

mod paginator;
mod types;

pub use paginator::{PageEvent, Paginator, PartitionSummary};
pub use types::{LogLevel, Message, StreamStatus, SyncConfig, SyncStats};

use crate::auth::TokenCache;
use crate::config::TapConfig;
use crate::error::{Error, Result};
use crate::http::{FailureClassifier, HttpClient};
use crate::partition::{Partition, PartitionResolver};
use crate::state::BookmarkStore;
use crate::streams::StreamDefinition;
use crate::types::{JsonValue, RequestContext};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sync engine orchestrating incremental extraction
pub struct SyncEngine {
    client: HttpClient,
    tokens: TokenCache,
    store: BookmarkStore,
    resolver: PartitionResolver,
    classifier: FailureClassifier,
    start_date: DateTime<Utc>,
    config: SyncConfig,
    stats: SyncStats,
    statuses: HashMap<&'static str, StreamStatus>,
}

impl SyncEngine {
    /// Create an engine from configuration and a bookmark store
    pub fn new(config: &TapConfig, store: BookmarkStore) -> Result<Self> {
        let client = HttpClient::with_config(config.http_client_config());
        let tokens = TokenCache::new(config.auth_url.clone(), config.credentials());
        let resolver = PartitionResolver::new(store.clone());

        Ok(Self {
            client,
            tokens,
            resolver,
            classifier: config.classifier(),
            start_date: config.start_datetime()?,
            store,
            config: SyncConfig::default(),
            stats: SyncStats::default(),
            statuses: HashMap::new(),
        })
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_sync_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the bookmark store
    pub fn store(&self) -> &BookmarkStore {
        &self.store
    }

    /// Get the token cache
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// The lifecycle state a stream ended the run in
    pub fn status(&self, stream: &str) -> Option<StreamStatus> {
        self.statuses.get(stream).copied()
    }

    /// Run a sync over the given streams
    ///
    /// Messages (records, state, logs) flow to `out` as they are produced.
    /// Stream failures are isolated unless `fail_fast` is set; the returned
    /// stats carry the error count.
    pub async fn run(
        &mut self,
        streams: &[Arc<StreamDefinition>],
        out: &mpsc::Sender<Message>,
    ) -> Result<SyncStats> {
        let started = Instant::now();
        let ordered = dependency_order(streams)?;

        self.statuses = ordered
            .iter()
            .map(|s| (s.name, StreamStatus::Pending))
            .collect();
        self.stats = SyncStats::default();

        // Child contexts queued per parent stream as its records are yielded
        let mut queued: HashMap<&'static str, Vec<RequestContext>> = HashMap::new();

        for stream in &ordered {
            if let Some(parent) = stream.parent {
                if self.status(parent) != Some(StreamStatus::Completed) {
                    warn!(
                        stream = stream.name,
                        parent, "Skipping stream because its parent did not complete"
                    );
                    emit(
                        out,
                        Message::warn(format!(
                            "Skipping stream {} because parent {parent} did not complete",
                            stream.name
                        )),
                    )
                    .await?;
                    continue;
                }
            }

            self.statuses.insert(stream.name, StreamStatus::Running);
            info!(stream = stream.name, "Starting sync");
            emit(out, Message::info(format!("Starting sync for stream: {}", stream.name))).await?;

            let result = self.run_stream(stream, &mut queued, out).await;

            match result {
                Ok(()) => {
                    self.statuses.insert(stream.name, StreamStatus::Completed);
                    self.stats.add_stream();
                    // Completion flushes bookmarks
                    self.store.checkpoint().await?;
                    emit(
                        out,
                        Message::info(format!("Completed sync for stream: {}", stream.name)),
                    )
                    .await?;
                }
                Err(e) => {
                    self.statuses.insert(stream.name, StreamStatus::Failed);
                    self.stats.add_error();
                    warn!(stream = stream.name, error = %e, "Stream failed");
                    emit(out, Message::error(format!("Stream {} failed: {e}", stream.name))).await?;
                    if self.config.fail_fast {
                        return Err(e);
                    }
                }
            }
        }

        self.stats.set_duration(started.elapsed().as_millis() as u64);
        Ok(self.stats.clone())
    }

    /// Sync every partition of one stream
    async fn run_stream(
        &mut self,
        stream: &Arc<StreamDefinition>,
        queued: &mut HashMap<&'static str, Vec<RequestContext>>,
        out: &mpsc::Sender<Message>,
    ) -> Result<()> {
        // Live contexts from the parent take precedence; stored partitions
        // are the resume path for runs where the parent yielded nothing
        let (partitions, register) = match stream.parent {
            None => (vec![Partition::root()], false),
            Some(parent) => {
                let live = queued.get(parent).cloned().unwrap_or_default();
                if live.is_empty() {
                    (self.resolver.resolve(stream).await?, false)
                } else {
                    (live.into_iter().map(Partition::new).collect(), true)
                }
            }
        };

        let mut records_this_stream = 0usize;

        for partition in partitions {
            if register {
                if stream.transient_partitions {
                    self.store
                        .retain_latest_partition(stream.name, partition.context.clone())
                        .await?;
                } else if !self.store.has_partition(stream.name, &partition.context).await? {
                    self.store
                        .insert_partition(stream.name, partition.context.clone())
                        .await?;
                }
            }

            let truncated = match self
                .run_partition(stream, &partition, queued, out, &mut records_this_stream)
                .await
            {
                Ok(truncated) => truncated,
                Err(error) => {
                    // Report with enough context to resume after the root
                    // cause is fixed
                    let bookmark = self
                        .store
                        .bookmark(stream.name, &partition.context)
                        .await
                        .unwrap_or(None)
                        .unwrap_or_else(|| "<none>".to_string());
                    return Err(Error::partition(
                        stream.name,
                        format!(
                            "partition {} failed after bookmark {bookmark}: {error}",
                            partition.describe()
                        ),
                    ));
                }
            };

            // Partition completion is a checkpoint boundary
            self.store.checkpoint().await?;
            if let Some(state) = self.store.export_stream(stream.name).await? {
                emit(out, Message::state(stream.name, state)).await?;
            }
            self.stats.add_partition();

            if truncated {
                emit(
                    out,
                    Message::warn(format!(
                        "Stream {} reached the record cap, stopping early",
                        stream.name
                    )),
                )
                .await?;
                break;
            }
        }

        Ok(())
    }

    /// Drive the paginator for one partition and consume its events
    ///
    /// Returns true when the per-stream record cap cut the sync short.
    async fn run_partition(
        &mut self,
        stream: &Arc<StreamDefinition>,
        partition: &Partition,
        queued: &mut HashMap<&'static str, Vec<RequestContext>>,
        out: &mpsc::Sender<Message>,
        records_this_stream: &mut usize,
    ) -> Result<bool> {
        let starting = self
            .store
            .starting_point(
                stream.name,
                &partition.context,
                stream.replication_key.map(|_| self.start_date),
            )
            .await?;

        let paginator = Paginator::new(
            self.client.clone(),
            self.tokens.clone(),
            self.classifier.clone(),
        );
        let (tx, mut rx) = mpsc::channel(64);
        let task = tokio::spawn({
            let stream = Arc::clone(stream);
            let partition = partition.clone();
            async move { paginator.run(stream, partition, starting, tx).await }
        });

        let mut truncated = false;

        while let Some(event) = rx.recv().await {
            // Events already buffered when the cap closed the channel are
            // drained but not processed
            if truncated {
                continue;
            }
            match event {
                PageEvent::Record {
                    record,
                    child_context,
                } => {
                    self.stats.add_records(1);
                    *records_this_stream += 1;
                    emit(out, Message::record(stream.name, JsonValue::Object(record))).await?;

                    if let Some(context) = child_context {
                        queued.entry(stream.name).or_default().push(context);
                    }

                    if self.config.max_records > 0 && *records_this_stream >= self.config.max_records
                    {
                        truncated = true;
                        rx.close();
                    }
                }
                PageEvent::PageComplete {
                    max_replication_value,
                } => {
                    self.stats.add_page();
                    if let Some(value) = max_replication_value {
                        self.store
                            .advance(stream.name, &partition.context, &value)
                            .await?;
                    }
                    if self.config.checkpoint_per_page {
                        self.store.checkpoint().await?;
                        if let Some(state) = self.store.export_stream(stream.name).await? {
                            emit(out, Message::state(stream.name, state)).await?;
                        }
                    }
                }
            }
        }

        let result = task
            .await
            .map_err(|e| Error::Other(format!("paginator task panicked: {e}")))?;

        match result {
            Ok(summary) => {
                debug!(
                    stream = stream.name,
                    pages = summary.pages,
                    records = summary.records,
                    "Partition finished"
                );
                Ok(truncated)
            }
            // Closing the channel at the cap makes the paginator's next send
            // fail; that is expected, not a stream failure
            Err(_) if truncated => Ok(true),
            Err(e) => Err(e),
        }
    }
}

/// Emit a message, surfacing a closed output channel as an error
async fn emit(out: &mpsc::Sender<Message>, message: Message) -> Result<()> {
    out.send(message)
        .await
        .map_err(|_| Error::Other("output channel closed".to_string()))
}

/// Order streams so every parent precedes its children
///
/// Preserves catalog order among streams whose parents are already placed.
pub fn dependency_order(
    streams: &[Arc<StreamDefinition>],
) -> Result<Vec<Arc<StreamDefinition>>> {
    let names: HashSet<&str> = streams.iter().map(|s| s.name).collect();
    for stream in streams {
        if let Some(parent) = stream.parent {
            if !names.contains(parent) {
                return Err(Error::StreamNotFound {
                    stream: parent.to_string(),
                });
            }
        }
    }

    let mut ordered = Vec::with_capacity(streams.len());
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<Arc<StreamDefinition>> = streams.to_vec();

    while !remaining.is_empty() {
        let before = ordered.len();
        remaining.retain(|stream| {
            let ready = stream.parent.map_or(true, |p| placed.contains(p));
            if ready {
                placed.insert(stream.name);
                ordered.push(Arc::clone(stream));
            }
            !ready
        });
        if ordered.len() == before {
            return Err(Error::DependencyCycle {
                stream: remaining[0].name.to_string(),
            });
        }
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests;
