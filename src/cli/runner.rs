//! Command execution

use super::commands::{Cli, Commands};
use crate::config::TapConfig;
use crate::engine::{Message, SyncConfig, SyncEngine};
use crate::error::{Error, Result};
use crate::state::BookmarkStore;
use crate::streams::all_streams;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;

/// Runs a parsed CLI invocation
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Execute the selected command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Check => self.check().await,
            Commands::Streams => self.list_streams(),
            Commands::Read {
                streams,
                max_records,
                state_per_page,
            } => {
                self.read(streams.as_deref(), *max_records, *state_per_page)
                    .await
            }
        }
    }

    fn load_config(&self) -> Result<TapConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("--config is required"))?;
        TapConfig::from_file(path)
    }

    fn load_store(&self) -> Result<BookmarkStore> {
        if let Some(json) = &self.cli.state_json {
            return BookmarkStore::from_json(json);
        }
        match &self.cli.state {
            Some(path) => BookmarkStore::from_file(path),
            None => Ok(BookmarkStore::in_memory()),
        }
    }

    async fn check(&self) -> Result<()> {
        let config = self.load_config()?;
        let engine = SyncEngine::new(&config, BookmarkStore::in_memory())?;

        match engine.tokens().bearer().await {
            Ok(_) => {
                println!("{}", json!({"connectionStatus": "succeeded"}));
                Ok(())
            }
            Err(e) => {
                println!(
                    "{}",
                    json!({"connectionStatus": "failed", "message": e.to_string()})
                );
                Err(e)
            }
        }
    }

    fn list_streams(&self) -> Result<()> {
        let config = self.load_config()?;
        for stream in all_streams(&config) {
            println!("{}", stream.name);
        }
        Ok(())
    }

    async fn read(
        &self,
        selected: Option<&str>,
        max_records: Option<usize>,
        state_per_page: bool,
    ) -> Result<()> {
        let config = self.load_config()?;
        let store = self.load_store()?;

        let streams = match selected {
            Some(filter) => {
                let wanted: Vec<&str> = filter.split(',').map(str::trim).collect();
                all_streams(&config)
                    .into_iter()
                    .filter(|s| wanted.contains(&s.name))
                    .collect()
            }
            None => all_streams(&config),
        };
        if streams.is_empty() {
            return Err(Error::config("no streams selected"));
        }

        let sync_config = SyncConfig::new()
            .with_checkpoint_per_page(state_per_page)
            .with_max_records(max_records.unwrap_or(0));
        let mut engine = SyncEngine::new(&config, store)?.with_sync_config(sync_config);

        let (tx, mut rx) = mpsc::channel::<Message>(256);
        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                println!("{}", message.to_json());
            }
        });

        let result = engine.run(&streams, &tx).await;
        drop(tx);
        writer
            .await
            .map_err(|e| Error::Other(format!("output writer failed: {e}")))?;

        let stats = result?;
        info!(
            records = stats.records_synced,
            pages = stats.pages_fetched,
            streams = stats.streams_synced,
            partitions = stats.partitions_synced,
            errors = stats.errors,
            duration_ms = stats.duration_ms,
            "Sync finished"
        );

        if stats.errors > 0 {
            return Err(Error::Other(format!(
                "{} stream(s) failed; see log output",
                stats.errors
            )));
        }
        Ok(())
    }
}
