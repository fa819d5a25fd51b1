use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::core::{GuideSource, SourceMetadata};
use crate::error::{GuideEngineError, Result};
use crate::ingest::{IngestReport, IngestionBackend};
use crate::store::GuideStore;

/// Work order handed to the platform-native fast path for one feed URL
#[derive(Debug, Clone)]
pub struct NativeIngestRequest {
    pub feed_url: String,
    pub source_id: String,
    /// Channel list for feed-to-channel matching, serialized as JSON
    pub channel_manifest_json: String,
    pub signature: String,
}

/// Notifications emitted by the native side while it works
#[derive(Debug, Clone)]
pub enum IngestProgress {
    /// Fraction complete, 0.0..=1.0
    Progress(f32),
    /// Fetch+parse+insert finished; `rows` is the intended insert count
    Complete { rows: usize },
    /// The feed failed; the message is surfaced per-feed
    Error(String),
}

/// Boundary with the platform-native ingestion path.
///
/// The implementation performs fetch, parse and insert itself off the engine's
/// queue, but must honor the same program uniqueness constraint so the two
/// ingestion paths stay interchangeable.
#[async_trait]
pub trait NativeBridge: Send + Sync {
    async fn run(
        &self,
        request: NativeIngestRequest,
        events: mpsc::Sender<IngestProgress>,
    ) -> Result<()>;
}

/// Adapter that drives a [`NativeBridge`] per feed URL and maps its event
/// stream onto the common [`IngestionBackend`] contract, including the
/// metadata-ledger upsert the bridge itself does not own.
pub struct NativeIngestBackend {
    bridge: Arc<dyn NativeBridge>,
    store: Arc<dyn GuideStore>,
    retention: Duration,
}

impl NativeIngestBackend {
    pub fn new(
        bridge: Arc<dyn NativeBridge>,
        store: Arc<dyn GuideStore>,
        retention: Duration,
    ) -> Self {
        Self {
            bridge,
            store,
            retention,
        }
    }

    async fn run_one_feed(&self, source: &GuideSource, url: &str, signature: &str) -> Result<usize> {
        let manifest = serde_json::to_string(&source.channel_ids)?;
        let request = NativeIngestRequest {
            feed_url: url.to_string(),
            source_id: source.id.clone(),
            channel_manifest_json: manifest,
            signature: signature.to_string(),
        };
        let (tx, mut rx) = mpsc::channel(16);
        let bridge = Arc::clone(&self.bridge);
        let handle = tokio::spawn(async move { bridge.run(request, tx).await });

        let mut rows = None;
        while let Some(event) = rx.recv().await {
            match event {
                IngestProgress::Progress(frac) => {
                    tracing::debug!(source = %source.id, url = %url, progress = frac, "native ingest progress");
                }
                IngestProgress::Complete { rows: n } => rows = Some(n),
                IngestProgress::Error(message) => {
                    handle.abort();
                    return Err(GuideEngineError::Feed {
                        url: url.to_string(),
                        message,
                    });
                }
            }
        }
        handle
            .await
            .map_err(|e| GuideEngineError::Other(format!("join error: {e}")))??;
        rows.ok_or_else(|| GuideEngineError::Feed {
            url: url.to_string(),
            message: "bridge exited without completion event".to_string(),
        })
    }
}

#[async_trait]
impl IngestionBackend for NativeIngestBackend {
    async fn ingest(&self, source: &GuideSource, signature: &str) -> Result<IngestReport> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| chrono::Duration::hours(12));
        self.store.prune(&source.id, cutoff).await?;

        let mut report = IngestReport {
            source_id: source.id.clone(),
            rows: 0,
            feeds_ok: 0,
            feeds_failed: 0,
            errors: Vec::new(),
        };
        for url in &source.feed_urls {
            match self.run_one_feed(source, url, signature).await {
                Ok(rows) => {
                    report.rows += rows;
                    report.feeds_ok += 1;
                }
                Err(e) => {
                    tracing::warn!(source = %source.id, url = %url, error = %e, "native feed failed");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::TimeZone;

    struct ScriptedBridge {
        fail_urls: Vec<String>,
    }

    #[async_trait]
    impl NativeBridge for ScriptedBridge {
        async fn run(
            &self,
            request: NativeIngestRequest,
            events: mpsc::Sender<IngestProgress>,
        ) -> Result<()> {
            // The manifest must round-trip as a channel list
            let channels: Vec<String> = serde_json::from_str(&request.channel_manifest_json)?;
            assert!(!channels.is_empty());

            if self.fail_urls.contains(&request.feed_url) {
                let _ = events.send(IngestProgress::Error("parse failed".into())).await;
                return Ok(());
            }
            let _ = events.send(IngestProgress::Progress(0.5)).await;
            let _ = events.send(IngestProgress::Complete { rows: 4 }).await;
            Ok(())
        }
    }

    fn source(urls: &[&str]) -> GuideSource {
        GuideSource {
            id: "src1".to_string(),
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            feed_urls: urls.iter().map(|s| s.to_string()).collect(),
            channel_ids: vec!["ch1".to_string()],
        }
    }

    async fn backend(fail_urls: &[&str]) -> (Arc<SqliteStore>, NativeIngestBackend) {
        let store = Arc::new(SqliteStore::new(":memory:").await.unwrap());
        let bridge = Arc::new(ScriptedBridge {
            fail_urls: fail_urls.iter().map(|s| s.to_string()).collect(),
        });
        let backend = NativeIngestBackend::new(
            bridge,
            Arc::clone(&store) as Arc<dyn GuideStore>,
            Duration::from_secs(12 * 3600),
        );
        (store, backend)
    }

    #[tokio::test]
    async fn test_native_completion_maps_to_report_and_metadata() {
        let (store, backend) = backend(&[]).await;
        let report = backend.ingest(&source(&["u1", "u2"]), "sig-n").await.unwrap();
        assert_eq!(report.rows, 8);
        assert_eq!(report.feeds_ok, 2);
        assert_eq!(store.metadata("src1").await.unwrap().unwrap().signature, "sig-n");
    }

    #[tokio::test]
    async fn test_native_error_event_is_isolated_per_feed() {
        let (store, backend) = backend(&["bad"]).await;
        let report = backend.ingest(&source(&["bad", "good"]), "sig-n").await.unwrap();
        assert_eq!(report.feeds_failed, 1);
        assert_eq!(report.feeds_ok, 1);
        assert!(store.metadata("src1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_native_all_feeds_failed() {
        let (store, backend) = backend(&["bad"]).await;
        let out = backend.ingest(&source(&["bad"]), "sig-n").await;
        assert!(matches!(out, Err(GuideEngineError::IngestFailed(_))));
        assert!(store.metadata("src1").await.unwrap().is_none());
    }
}
