pub mod batch;
pub mod native;

use async_trait::async_trait;

use crate::core::GuideSource;
use crate::error::Result;

pub use batch::BatchIngestBackend;
pub use native::{IngestProgress, NativeBridge, NativeIngestBackend, NativeIngestRequest};

/// One ingestion path for a guide source.
///
/// Two implementations share the same schema and metadata-ledger contract so
/// the UI cannot tell them apart: the in-process batch path
/// ([`BatchIngestBackend`]) and the platform-native fast path
/// ([`NativeIngestBackend`]). Which one runs is a capability decision made at
/// startup by whoever builds the engine.
#[async_trait]
pub trait IngestionBackend: Send + Sync {
    /// Re-ingest the source: prune stale rows, pull every configured feed
    /// (continuing past individual feed failures), then record the new
    /// signature in the metadata ledger.
    ///
    /// Fails only when every feed for the source failed; previously cached
    /// rows are never cleared on failure.
    async fn ingest(&self, source: &GuideSource, signature: &str) -> Result<IngestReport>;
}

/// Outcome of one source ingestion
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source_id: String,
    /// Rows handed to the store, not net of duplicates
    pub rows: usize,
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    /// One message per failed feed
    pub errors: Vec<String>,
}
