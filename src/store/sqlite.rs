use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::{Program, SourceMetadata};
use crate::error::{GuideEngineError, Result};
use crate::store::connection::ConnectionManager;
use crate::store::queue::OpQueue;
use crate::store::retry::RetryPolicy;
use crate::store::{CacheStats, GuideStore};

/// Rows per multi-row INSERT statement inside the batch transaction
const SUB_BATCH: usize = 64;

/// Tuning knobs for the SQLite store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Hard execution budget per queued operation
    pub op_timeout: Duration,
    /// Consecutive failures before the queue resets itself
    pub failure_threshold: u32,
    /// Minimum interval between connection health probes
    pub probe_interval: Duration,
    /// Lock-contention retry policy
    pub retry: RetryPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(30),
            failure_threshold: 3,
            probe_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// SQLite-backed guide cache.
///
/// All operations are funneled through one FIFO queue onto one lazily-opened
/// connection; rusqlite work runs on the blocking pool with lock-contention
/// retry inside the queued slot.
pub struct SqliteStore {
    conn: Arc<ConnectionManager>,
    queue: Arc<OpQueue>,
    retry: RetryPolicy,
}

impl SqliteStore {
    /// Open (or create) the guide database at `db_path` with default options
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_options(db_path, StoreOptions::default()).await
    }

    pub async fn with_options(db_path: &str, options: StoreOptions) -> Result<Self> {
        let store = Self {
            conn: Arc::new(ConnectionManager::new(db_path, options.probe_interval)),
            queue: Arc::new(OpQueue::new(options.op_timeout, options.failure_threshold)),
            retry: options.retry,
        };
        // Open eagerly so a bad path fails here, not on first ingest
        store.run_blocking("open", |_| Ok(())).await?;
        Ok(store)
    }

    /// Observable queue state, for diagnostics and tests
    pub fn queue(&self) -> &OpQueue {
        &self.queue
    }

    /// Drain the queue behind any pending operations, then drop the
    /// connection. The next use after `close` reopens it.
    pub async fn close(&self) {
        let mgr = Arc::clone(&self.conn);
        let _ = self
            .queue
            .run("close", || async move {
                mgr.reset();
                Ok(())
            })
            .await;
    }

    async fn run_blocking<T, F>(&self, name: &'static str, f: F) -> Result<T>
    where
        F: Fn(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mgr = Arc::clone(&self.conn);
        let retry = self.retry.clone();
        self.queue
            .run(name, || async move {
                tokio::task::spawn_blocking(move || retry.run(|| mgr.with_conn(|conn| f(conn))))
                    .await
                    .map_err(|e| GuideEngineError::Other(format!("join error: {e}")))?
            })
            .await
    }
}

fn insert_batch_tx(conn: &mut Connection, source_id: &str, programs: &[Program]) -> Result<usize> {
    let tx = conn.transaction()?;
    for chunk in programs.chunks(SUB_BATCH) {
        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() * 7);
        for p in chunk {
            p.validate()?;
            values.push(source_id.to_string().into());
            values.push(p.channel_id.clone().into());
            values.push(p.title.clone().into());
            values.push(match &p.description {
                Some(d) => rusqlite::types::Value::Text(d.clone()),
                None => rusqlite::types::Value::Null,
            });
            values.push(p.start.timestamp_millis().into());
            values.push(p.end.timestamp_millis().into());
            values.push(match &p.external_channel_id {
                Some(x) => rusqlite::types::Value::Text(x.clone()),
                None => rusqlite::types::Value::Null,
            });
        }
        let placeholders = vec!["(?,?,?,?,?,?,?)"; chunk.len()].join(",");
        let sql = format!(
            "INSERT OR IGNORE INTO programs\
             (source_id,channel_id,title,description,start_ms,end_ms,external_channel_id) \
             VALUES {placeholders}"
        );
        let mut stmt = tx.prepare(&sql)?;
        stmt.execute(rusqlite::params_from_iter(values))?;
    }
    tx.commit()?;
    Ok(programs.len())
}

fn row_to_program(row: &rusqlite::Row<'_>) -> rusqlite::Result<Program> {
    let start_ms: i64 = row.get(4)?;
    let end_ms: i64 = row.get(5)?;
    Ok(Program {
        source_id: row.get(0)?,
        channel_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start: DateTime::from_timestamp_millis(start_ms).unwrap_or_else(Utc::now),
        end: DateTime::from_timestamp_millis(end_ms).unwrap_or_else(Utc::now),
        external_channel_id: row.get(6)?,
    })
}

#[async_trait]
impl GuideStore for SqliteStore {
    async fn insert_programs(&self, source_id: &str, programs: &[Program]) -> Result<usize> {
        if programs.is_empty() {
            return Ok(0);
        }
        let source_id = source_id.to_string();
        let programs = programs.to_vec();
        self.run_blocking("insert_programs", move |conn| {
            insert_batch_tx(conn, &source_id, &programs)
        })
        .await
    }

    async fn programs_for_channels(
        &self,
        source_id: &str,
        channel_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Program>>> {
        let source_id = source_id.to_string();
        let channel_ids = channel_ids.to_vec();
        self.run_blocking("programs_for_channels", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT source_id,channel_id,title,description,start_ms,end_ms,external_channel_id \
                 FROM programs WHERE source_id=? AND channel_id=? ORDER BY start_ms ASC",
            )?;
            let mut out = BTreeMap::new();
            for channel in &channel_ids {
                let rows = stmt
                    .query_map(params![source_id, channel], row_to_program)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out.insert(channel.clone(), rows);
            }
            Ok(out)
        })
        .await
    }

    async fn metadata(&self, source_id: &str) -> Result<Option<SourceMetadata>> {
        let source_id = source_id.to_string();
        self.run_blocking("metadata", move |conn| {
            let row = conn
                .query_row(
                    "SELECT source_id,last_updated_ms,signature FROM guide_metadata WHERE source_id=?",
                    params![source_id],
                    |row| {
                        let ms: i64 = row.get(1)?;
                        Ok(SourceMetadata {
                            source_id: row.get(0)?,
                            last_updated: DateTime::from_timestamp_millis(ms)
                                .unwrap_or_else(Utc::now),
                            signature: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn set_metadata(&self, meta: &SourceMetadata) -> Result<()> {
        let meta = meta.clone();
        self.run_blocking("set_metadata", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO guide_metadata(source_id,last_updated_ms,signature) \
                 VALUES(?,?,?)",
                params![
                    meta.source_id,
                    meta.last_updated.timestamp_millis(),
                    meta.signature
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn prune(&self, source_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let source_id = source_id.to_string();
        let cutoff_ms = cutoff.timestamp_millis();
        self.run_blocking("prune", move |conn| {
            let deleted = conn.execute(
                "DELETE FROM programs WHERE source_id=? AND end_ms < ?",
                params![source_id, cutoff_ms],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn clear_source(&self, source_id: &str) -> Result<()> {
        let source_id = source_id.to_string();
        self.run_blocking("clear_source", move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM programs WHERE source_id=?", params![source_id])?;
            tx.execute(
                "DELETE FROM guide_metadata WHERE source_id=?",
                params![source_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<CacheStats> {
        self.run_blocking("stats", |conn| {
            let program_rows: u64 =
                conn.query_row("SELECT COUNT(*) FROM programs", [], |r| r.get(0))?;
            let sources: u64 =
                conn.query_row("SELECT COUNT(*) FROM guide_metadata", [], |r| r.get(0))?;
            let (oldest, newest): (Option<i64>, Option<i64>) = conn.query_row(
                "SELECT MIN(end_ms), MAX(end_ms) FROM programs",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok(CacheStats {
                program_rows,
                sources,
                oldest_end: oldest.and_then(DateTime::from_timestamp_millis),
                newest_end: newest.and_then(DateTime::from_timestamp_millis),
            })
        })
        .await
    }
}
