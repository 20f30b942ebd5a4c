//! # Linnworks Source
//!
//! An incremental extraction engine for the Linnworks API: paginated HTTP
//! polling, per-partition replication bookmarks, parent/child stream
//! dependencies, and transient-vs-fatal failure classification.
//!
//! ## Features
//!
//! - **Incremental Sync**: per-stream and per-partition bookmarks with a
//!   one-second guard band against the upstream's inclusive range filter
//! - **Parent/Child Streams**: child partitions are seeded live from parent
//!   records and resumed from persisted state
//! - **Failure Classification**: retriable, fatal, and benign end-of-data
//!   outcomes decided from status and body, with per-stream overrides
//! - **Bounded Retries**: exponential backoff plus token-bucket rate
//!   limiting on every outbound call
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use linnworks_source::config::TapConfig;
//! use linnworks_source::engine::{Message, SyncEngine};
//! use linnworks_source::state::BookmarkStore;
//! use linnworks_source::streams::all_streams;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> linnworks_source::Result<()> {
//!     let config = TapConfig::from_file("config.json")?;
//!     let store = BookmarkStore::from_file("state.json")?;
//!     let mut engine = SyncEngine::new(&config, store)?;
//!
//!     let (tx, mut rx) = mpsc::channel::<Message>(256);
//!     tokio::spawn(async move {
//!         while let Some(msg) = rx.recv().await {
//!             println!("{}", msg.to_json());
//!         }
//!     });
//!
//!     engine.run(&all_streams(&config), &tx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Dependency Scheduler                       │
//! │   orders streams parent-first, queues child contexts, advances  │
//! │   bookmarks per page, checkpoints per partition                 │
//! └──────────────────────────────┬──────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │   Auth   │   HTTP    │   Paginator   │ Partition │   State     │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Token    │ Retry     │ Page tokens   │ Implicit  │ Bookmarks   │
//! │ exchange │ Backoff   │ Record paths  │ Parent-   │ Guard band  │
//! │ (once)   │ Rate limit│ Child context │ derived   │ Checkpoints │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(missing_docs)] // TODO: Add docs before 1.0 release

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the crate
pub mod error;

/// Common types and type aliases
pub mod types;

/// Configuration loading
pub mod config;

/// Token cache and authorization exchange
pub mod auth;

/// HTTP client with retry, rate limiting, and response classification
pub mod http;

/// Bookmark store and checkpointing
pub mod state;

/// Partition types and resolution
pub mod partition;

/// Stream definitions and the capability contract
pub mod streams;

/// Scheduler and page loop
pub mod engine;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
