use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS programs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    start_ms INTEGER NOT NULL,
    end_ms INTEGER NOT NULL,
    external_channel_id TEXT,
    UNIQUE(source_id, channel_id, start_ms, end_ms, title)
);
CREATE INDEX IF NOT EXISTS idx_programs_channel ON programs(source_id, channel_id, start_ms);
CREATE INDEX IF NOT EXISTS idx_programs_end ON programs(source_id, end_ms);

CREATE TABLE IF NOT EXISTS guide_metadata (
    source_id TEXT PRIMARY KEY,
    last_updated_ms INTEGER NOT NULL,
    signature TEXT NOT NULL
);
"#;

/// Owns the one logical connection to the guide database.
///
/// The connection is opened lazily on first use, schema statements are applied
/// idempotently on every (re)open, and a throttled health probe discards a
/// handle that stops answering so the next use reopens it. Callers never see
/// reconnection logic; the one operation in flight during a failure is the
/// only one affected.
pub struct ConnectionManager {
    path: String,
    conn: Mutex<Option<Connection>>,
    last_probe: Mutex<Option<Instant>>,
    probe_interval: Duration,
}

impl ConnectionManager {
    pub fn new(path: impl Into<String>, probe_interval: Duration) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
            last_probe: Mutex::new(None),
            probe_interval,
        }
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        // WAL is a no-op for in-memory databases; ignore pragma failures there
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    /// Run `f` against the live connection, opening it first if needed.
    ///
    /// Must only be called from the store's own serialized operations; handing
    /// the raw connection out would void the queue's guarantee.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut slot = self.conn.lock().expect("connection mutex poisoned");
        if slot.is_some() && self.probe_due() {
            // Probing the metadata table also catches a handle whose schema
            // has gone missing underneath it, not just a dead handle
            let healthy = slot
                .as_ref()
                .map(|c| {
                    c.query_row("SELECT COUNT(*) FROM guide_metadata", [], |_| Ok(()))
                        .is_ok()
                })
                .unwrap_or(false);
            if !healthy {
                tracing::warn!(path = %self.path, "health probe failed, discarding connection");
                *slot = None;
            }
        }
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        let conn = slot.as_mut().expect("connection just opened");
        f(conn)
    }

    fn probe_due(&self) -> bool {
        let mut last = self.last_probe.lock().expect("probe mutex poisoned");
        match *last {
            Some(at) if at.elapsed() < self.probe_interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    /// Drop the current handle; the next use reopens and re-applies schema.
    pub fn reset(&self) {
        *self.conn.lock().expect("connection mutex poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(":memory:", Duration::from_secs(30))
    }

    #[test]
    fn test_schema_applied_on_first_use() {
        let mgr = manager();
        let tables: i64 = mgr
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('programs','guide_metadata')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_schema_reapplied_after_reset() {
        let mgr = manager();
        mgr.with_conn(|_| Ok(())).unwrap();
        mgr.reset();
        let n: i64 = mgr
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM programs", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_probe_is_throttled() {
        let mgr = ConnectionManager::new(":memory:", Duration::from_secs(3600));
        assert!(mgr.probe_due());
        assert!(!mgr.probe_due());
    }

    #[test]
    fn test_failed_probe_discards_handle_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.sqlite");
        // Zero interval: every use runs the probe
        let mgr = ConnectionManager::new(path.to_string_lossy(), Duration::ZERO);
        mgr.with_conn(|_| Ok(())).unwrap();

        // Knock the probed table out from under the live handle
        mgr.with_conn(|conn| {
            conn.execute_batch("DROP TABLE guide_metadata")?;
            Ok(())
        })
        .unwrap();

        // The next probe fails, the handle is discarded, and the reopen
        // re-applies the schema, so this query succeeds again
        let n: i64 = mgr
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM guide_metadata", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_file_backed_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.sqlite");
        let mgr = ConnectionManager::new(path.to_string_lossy(), Duration::from_secs(30));
        mgr.with_conn(|conn| {
            conn.execute(
                "INSERT INTO guide_metadata(source_id,last_updated_ms,signature) VALUES(?,?,?)",
                rusqlite::params!["src1", 0i64, "sig"],
            )?;
            Ok(())
        })
        .unwrap();
        mgr.reset();
        let n: i64 = mgr
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM guide_metadata", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(n, 1);
    }
}
