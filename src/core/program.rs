use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GuideEngineError, Result};

/// One scheduled broadcast slot as normalized by the external feed parser.
///
/// Identity is synthesized from `(source_id, channel_id, start, end, title)`;
/// the feed's own identifiers are carried only as `external_channel_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Guide source (playlist) that owns this row
    pub source_id: String,

    /// Channel the program airs on
    pub channel_id: String,

    /// Program title
    pub title: String,

    /// Short description, when the feed provides one
    #[serde(default)]
    pub description: Option<String>,

    /// Start of the slot, inclusive
    pub start: DateTime<Utc>,

    /// End of the slot, exclusive
    pub end: DateTime<Utc>,

    /// The feed's own channel identifier, for correlation
    #[serde(default)]
    pub external_channel_id: Option<String>,
}

impl Program {
    /// Create a program with required fields only
    pub fn new(
        source_id: impl Into<String>,
        channel_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            channel_id: channel_id.into(),
            title: title.into(),
            description: None,
            start,
            end,
            external_channel_id: None,
        }
    }

    /// Check the record against the schema invariants: non-empty title and
    /// channel, `start < end`.
    pub fn validate(&self) -> Result<()> {
        if self.channel_id.trim().is_empty() {
            return Err(GuideEngineError::InvalidProgram(
                "empty channel id".to_string(),
            ));
        }
        if self.title.trim().is_empty() {
            return Err(GuideEngineError::InvalidProgram(format!(
                "empty title on channel '{}'",
                self.channel_id
            )));
        }
        if self.start >= self.end {
            return Err(GuideEngineError::InvalidProgram(format!(
                "'{}' has start >= end ({} >= {})",
                self.title, self.start, self.end
            )));
        }
        Ok(())
    }

    /// Whether the slot contains the given instant (start inclusive, end exclusive)
    pub fn is_on_air(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }

    /// Display name for logging/UI
    pub fn display_name(&self) -> String {
        format!("{} [{} - {}]", self.title, self.start, self.end)
    }
}
