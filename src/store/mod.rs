pub mod connection;
pub mod queue;
pub mod retry;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{Program, SourceMetadata};
use crate::error::Result;

pub use queue::{OpQueue, QueueState};
pub use retry::RetryPolicy;
pub use sqlite::SqliteStore;

/// Trait for guide cache store implementations.
///
/// The store exclusively owns the program and metadata tables; the engine and
/// ingestion backends only go through these operations, never the connection.
#[async_trait]
pub trait GuideStore: Send + Sync {
    /// Insert a batch of programs for one source in a single all-or-nothing
    /// transaction, skipping rows that collide with the uniqueness constraint.
    ///
    /// Returns the number of rows the caller intended to insert, not
    /// net-of-duplicates.
    async fn insert_programs(&self, source_id: &str, programs: &[Program]) -> Result<usize>;

    /// All cached programs for the given channels, ordered by start time.
    ///
    /// Every requested channel is present in the result, with an empty list
    /// when nothing is cached for it.
    async fn programs_for_channels(
        &self,
        source_id: &str,
        channel_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Program>>>;

    /// Current metadata row for the source, or absent
    async fn metadata(&self, source_id: &str) -> Result<Option<SourceMetadata>>;

    /// Upsert the metadata row for the source
    async fn set_metadata(&self, meta: &SourceMetadata) -> Result<()>;

    /// Delete program rows for the source whose end time is before `cutoff`.
    /// Returns the number of rows deleted.
    async fn prune(&self, source_id: &str, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Remove all program rows and the metadata row for the source
    async fn clear_source(&self, source_id: &str) -> Result<()>;

    /// Cache-wide statistics
    async fn stats(&self) -> Result<CacheStats>;
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub program_rows: u64,
    pub sources: u64,
    pub oldest_end: Option<DateTime<Utc>>,
    pub newest_end: Option<DateTime<Utc>>,
}
