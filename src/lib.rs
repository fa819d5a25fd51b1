//! # EPG Guide Engine
//!
//! Local cache and ingestion engine for electronic program guide data:
//! - SQLite persistence behind one strictly serialized operation queue
//! - Lock-contention retry with bounded exponential backoff
//! - Transactional batch inserts with hard deduplication
//! - Signature + refresh-interval cache validity, time-based prune
//! - Pluggable ingestion backends (in-process batch, platform-native bridge)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use epg_guide_engine::{GuideEngine, GuideSource};
//! use epg_guide_engine::feed::ProgramFeed;
//!
//! async fn run(feed: Arc<dyn ProgramFeed>) -> anyhow::Result<()> {
//!     let engine = GuideEngine::new("guide.db", feed).await?;
//!
//!     let source = GuideSource {
//!         id: "playlist-1".to_string(),
//!         updated_at: chrono::Utc::now(),
//!         feed_urls: vec!["https://example.com/guide.xml".to_string()],
//!         channel_ids: vec!["ch1".to_string()],
//!     };
//!     engine.set_source(Some(source)).await?;
//!
//!     let programs = engine.programs_for_channel("ch1").await?;
//!     println!("cached programs: {}", programs.len());
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod engine;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod store;

// Re-export primary types
pub use crate::core::{GuideSource, Program, SourceMetadata};
pub use engine::{cache_is_fresh, EngineOptions, GuideEngine, IngestStatus};
pub use error::{GuideEngineError, Result};
pub use ingest::{IngestReport, IngestionBackend};
pub use store::{GuideStore, SqliteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
