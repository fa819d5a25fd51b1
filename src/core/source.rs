use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A named guide feed configuration: one or more feed URLs tied to a channel list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideSource {
    /// Stable source identifier (the owning playlist)
    pub id: String,

    /// When the source definition itself was last changed
    pub updated_at: DateTime<Utc>,

    /// Guide feed URLs, in fetch order
    pub feed_urls: Vec<String>,

    /// Channels the guide covers, in display order
    pub channel_ids: Vec<String>,
}

impl GuideSource {
    /// Opaque fingerprint of the source identity, channel set and feed URLs.
    ///
    /// Matching signatures mean "nothing relevant changed" and cached guide
    /// data can be reused without re-fetching.
    pub fn signature(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.id.as_bytes());
        h.update(self.updated_at.timestamp_millis().to_le_bytes());
        for ch in &self.channel_ids {
            h.update(ch.as_bytes());
            h.update([0u8]);
        }
        for url in &self.feed_urls {
            h.update(url.as_bytes());
            h.update([0u8]);
        }
        format!("{:x}", h.finalize())
    }
}

/// Cache-validity ledger row: one per guide source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Owning source id (primary key)
    pub source_id: String,

    /// When the source was last successfully ingested
    pub last_updated: DateTime<Utc>,

    /// Signature of the source definition at ingest time
    pub signature: String,
}
