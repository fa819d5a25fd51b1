use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::{GuideSource, Program, SourceMetadata};
use crate::error::Result;
use crate::feed::ProgramFeed;
use crate::ingest::{BatchIngestBackend, IngestionBackend};
use crate::store::{CacheStats, GuideStore, SqliteStore};

/// Orchestration knobs
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How long cached guide data stays fresh after a successful ingest
    pub refresh_interval: Duration,
    /// Trailing window of past programs kept by the prune cutoff
    pub retention: Duration,
    /// Channels warmed from the cache immediately after a source is set
    pub prefetch_channels: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(2 * 3600),
            retention: Duration::from_secs(12 * 3600),
            prefetch_channels: 12,
        }
    }
}

/// Ingestion state surfaced to the UI
#[derive(Debug, Clone, Default)]
pub struct IngestStatus {
    pub loading: bool,
    pub error: Option<String>,
}

/// Cached data is fresh when the ledger row exists, its signature matches the
/// current source definition, and the refresh interval has not elapsed. Any
/// mismatch means re-ingest.
pub fn cache_is_fresh(
    meta: &SourceMetadata,
    signature: &str,
    now: DateTime<Utc>,
    refresh_interval: Duration,
) -> bool {
    if meta.signature != signature {
        return false;
    }
    let age = now.signed_duration_since(meta.last_updated);
    age >= chrono::Duration::zero()
        && age < chrono::Duration::from_std(refresh_interval).unwrap_or_else(|_| chrono::Duration::hours(2))
}

struct Session {
    source: Option<GuideSource>,
    /// Per-channel programs memoized for this session. A present (possibly
    /// empty) entry means the channel has been loaded; "genuinely no data"
    /// is an empty list, never a missing key.
    channels: HashMap<String, Vec<Program>>,
}

/// Consumer-facing guide engine: decides per source whether to skip (cache
/// fresh), re-ingest, or pull channels lazily as the UI asks for them.
pub struct GuideEngine {
    store: Arc<dyn GuideStore>,
    backend: Arc<dyn IngestionBackend>,
    options: EngineOptions,
    session: tokio::sync::Mutex<Session>,
    status: std::sync::Mutex<IngestStatus>,
}

impl GuideEngine {
    /// Create an engine over a SQLite store with the in-process batch
    /// ingestion path.
    pub async fn new(db_path: impl AsRef<str>, feed: Arc<dyn ProgramFeed>) -> Result<Self> {
        let options = EngineOptions::default();
        let store: Arc<dyn GuideStore> = Arc::new(SqliteStore::new(db_path.as_ref()).await?);
        let backend = Arc::new(BatchIngestBackend::new(
            Arc::clone(&store),
            feed,
            options.retention,
        ));
        Ok(Self::with_backend(store, backend, options))
    }

    /// Create an engine over an explicit store and ingestion backend. This is
    /// how the platform-native fast path is plugged in at startup.
    pub fn with_backend(
        store: Arc<dyn GuideStore>,
        backend: Arc<dyn IngestionBackend>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            backend,
            options,
            session: tokio::sync::Mutex::new(Session {
                source: None,
                channels: HashMap::new(),
            }),
            status: std::sync::Mutex::new(IngestStatus::default()),
        }
    }

    fn set_status(&self, loading: bool, error: Option<String>) {
        let mut status = self.status.lock().expect("status mutex poisoned");
        status.loading = loading;
        status.error = error;
    }

    /// Current ingestion status for the UI
    pub fn status(&self) -> IngestStatus {
        self.status.lock().expect("status mutex poisoned").clone()
    }

    /// Point the engine at a (possibly changed) guide source.
    ///
    /// `None`, or a source with no channels, clears the session cache without
    /// touching the database. Otherwise the cache validity is re-evaluated
    /// against the source's current signature and a bounded prefetch warms the
    /// first channels either way. An ingestion failure is surfaced through
    /// [`status`](Self::status) while previously cached data keeps being served.
    pub async fn set_source(&self, source: Option<GuideSource>) -> Result<()> {
        let source = match source {
            Some(s) if !s.channel_ids.is_empty() => s,
            _ => {
                let mut session = self.session.lock().await;
                session.source = None;
                session.channels.clear();
                self.set_status(false, None);
                return Ok(());
            }
        };
        {
            let mut session = self.session.lock().await;
            session.source = Some(source.clone());
            session.channels.clear();
        }
        // The session lock is released before any ingestion work: a feed
        // fetch can take seconds, and channel reads must keep answering from
        // whatever is cached meanwhile. Only the store's queue linearizes I/O.
        self.set_status(true, None);

        let signature = source.signature();
        let fresh = match self.store.metadata(&source.id).await {
            Ok(Some(meta)) => {
                cache_is_fresh(&meta, &signature, Utc::now(), self.options.refresh_interval)
            }
            Ok(None) => false,
            Err(e) => {
                self.set_status(false, Some(e.to_string()));
                return Err(e);
            }
        };

        let ingest_error = if fresh {
            tracing::info!(source = %source.id, "guide cache fresh, skipping ingest");
            None
        } else {
            match self.backend.ingest(&source, &signature).await {
                Ok(report) => {
                    tracing::info!(
                        source = %source.id,
                        rows = report.rows,
                        feeds_ok = report.feeds_ok,
                        feeds_failed = report.feeds_failed,
                        "guide ingested"
                    );
                    None
                }
                Err(e) => {
                    // Keep serving whatever is cached; the UI sees the error
                    tracing::warn!(source = %source.id, error = %e, "guide ingest failed");
                    Some(e.to_string())
                }
            }
        };

        match self.prefetch(&source).await {
            Ok(()) => {
                self.set_status(false, ingest_error);
                Ok(())
            }
            Err(e) => {
                // Never leave the UI on an indefinite spinner: clear loading
                // and surface an error before propagating
                let surfaced = ingest_error.unwrap_or_else(|| e.to_string());
                self.set_status(false, Some(surfaced));
                Err(e)
            }
        }
    }

    async fn prefetch(&self, source: &GuideSource) -> Result<()> {
        let warm: Vec<String> = source
            .channel_ids
            .iter()
            .take(self.options.prefetch_channels)
            .cloned()
            .collect();
        if warm.is_empty() {
            return Ok(());
        }
        let map = self.store.programs_for_channels(&source.id, &warm).await?;
        let mut session = self.session.lock().await;
        // A newer set_source may have swapped the source while we fetched
        if session.source.as_ref().is_some_and(|s| s.id == source.id) {
            session.channels.extend(map);
        }
        Ok(())
    }

    /// Programs for one channel, ordered by start time.
    ///
    /// The first request for a channel this session issues a store query; the
    /// result (empty included) is memoized so repeat requests are free.
    pub async fn programs_for_channel(&self, channel_id: &str) -> Result<Vec<Program>> {
        let mut session = self.session.lock().await;
        let source = match &session.source {
            Some(s) => s.clone(),
            None => return Ok(Vec::new()),
        };
        if let Some(cached) = session.channels.get(channel_id) {
            return Ok(cached.clone());
        }
        let mut map = self
            .store
            .programs_for_channels(&source.id, &[channel_id.to_string()])
            .await?;
        let programs = map.remove(channel_id).unwrap_or_default();
        session
            .channels
            .insert(channel_id.to_string(), programs.clone());
        Ok(programs)
    }

    /// The program on air now for the channel, else the first cached program,
    /// else absent.
    pub async fn current_program(&self, channel_id: &str) -> Result<Option<Program>> {
        let programs = self.programs_for_channel(channel_id).await?;
        let now = Utc::now();
        Ok(programs
            .iter()
            .find(|p| p.is_on_air(now))
            .or_else(|| programs.first())
            .cloned())
    }

    /// Remove a source entirely: programs, metadata row and session state
    pub async fn remove_source(&self, source_id: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.source.as_ref().is_some_and(|s| s.id == source_id) {
            session.source = None;
            session.channels.clear();
        }
        self.store.clear_source(source_id).await
    }

    /// Cache-wide statistics
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta(age: chrono::Duration, signature: &str, now: DateTime<Utc>) -> SourceMetadata {
        SourceMetadata {
            source_id: "src1".to_string(),
            last_updated: now - age,
            signature: signature.to_string(),
        }
    }

    #[test]
    fn test_fresh_within_interval_and_matching_signature() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let interval = Duration::from_secs(2 * 3600);
        let m = meta(chrono::Duration::hours(1), "sig", now);
        assert!(cache_is_fresh(&m, "sig", now, interval));
    }

    #[test]
    fn test_stale_when_interval_expired() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let interval = Duration::from_secs(2 * 3600);
        let m = meta(chrono::Duration::hours(3), "sig", now);
        assert!(!cache_is_fresh(&m, "sig", now, interval));
    }

    #[test]
    fn test_stale_when_signature_changed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let interval = Duration::from_secs(2 * 3600);
        let m = meta(chrono::Duration::minutes(5), "sig-old", now);
        assert!(!cache_is_fresh(&m, "sig-new", now, interval));
    }

    #[test]
    fn test_stale_at_exact_interval_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let interval = Duration::from_secs(2 * 3600);
        let m = meta(chrono::Duration::hours(2), "sig", now);
        assert!(!cache_is_fresh(&m, "sig", now, interval));
    }
}
