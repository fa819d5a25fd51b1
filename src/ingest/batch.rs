use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::core::{GuideSource, SourceMetadata};
use crate::error::{GuideEngineError, Result};
use crate::feed::ProgramFeed;
use crate::ingest::{IngestReport, IngestionBackend};
use crate::store::GuideStore;

/// In-process ingestion path: fetch each configured feed through the
/// [`ProgramFeed`] boundary and write the parsed records with the store's
/// batch insert.
pub struct BatchIngestBackend {
    store: Arc<dyn GuideStore>,
    feed: Arc<dyn ProgramFeed>,
    retention: Duration,
}

impl BatchIngestBackend {
    pub fn new(store: Arc<dyn GuideStore>, feed: Arc<dyn ProgramFeed>, retention: Duration) -> Self {
        Self {
            store,
            feed,
            retention,
        }
    }
}

#[async_trait]
impl IngestionBackend for BatchIngestBackend {
    async fn ingest(&self, source: &GuideSource, signature: &str) -> Result<IngestReport> {
        // Prune piggybacks on the same serialized queue, before fresh data lands
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| chrono::Duration::hours(12));
        let pruned = self.store.prune(&source.id, cutoff).await?;
        if pruned > 0 {
            tracing::info!(source = %source.id, pruned, "pruned stale programs");
        }

        let mut report = IngestReport {
            source_id: source.id.clone(),
            rows: 0,
            feeds_ok: 0,
            feeds_failed: 0,
            errors: Vec::new(),
        };
        for url in &source.feed_urls {
            let outcome = async {
                let programs = self.feed.fetch_programs(&source.id, url).await?;
                self.store.insert_programs(&source.id, &programs).await
            }
            .await;
            match outcome {
                Ok(rows) => {
                    tracing::info!(source = %source.id, url = %url, rows, "feed ingested");
                    report.rows += rows;
                    report.feeds_ok += 1;
                }
                Err(e) => {
                    // One bad feed must not sink the others
                    tracing::warn!(source = %source.id, url = %url, error = %e, "feed failed");
                    report.feeds_failed += 1;
                    report.errors.push(e.to_string());
                }
            }
        }

        if report.feeds_ok == 0 && report.feeds_failed > 0 {
            return Err(GuideEngineError::IngestFailed(source.id.clone()));
        }

        self.store
            .set_metadata(&SourceMetadata {
                source_id: source.id.clone(),
                last_updated: Utc::now(),
                signature: signature.to_string(),
            })
            .await?;
        Ok(report)
    }
}
