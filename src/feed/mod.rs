use async_trait::async_trait;

use crate::core::Program;
use crate::error::Result;

/// Boundary with the external fetcher/parser.
///
/// Implementations own the wire format and the schedule-source vendor; the
/// cache engine only ever sees normalized program records. Failures are
/// isolated per feed URL by the ingestion backend.
#[async_trait]
pub trait ProgramFeed: Send + Sync {
    /// Fetch and parse one guide feed URL into normalized program records
    /// for the given source.
    async fn fetch_programs(&self, source_id: &str, url: &str) -> Result<Vec<Program>>;

    /// Feed implementation name, for logging
    fn name(&self) -> &str;
}
