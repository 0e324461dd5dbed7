use crate::domain::ledger::LedgerId;
use crate::domain::notification::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CallbackId(pub u64);

/// One received webhook, kept forever as an audit trail.
///
/// `is_done` flips exactly once, when the entry's effects have been applied or it has been
/// recognised as a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackEntry {
    pub id: CallbackId,
    pub ledger: LedgerId,
    pub event_type: EventType,
    pub tid: String,
    pub parent_tid: Option<String>,
    pub checksum: String,
    pub payload: Value,
    pub is_done: bool,
    pub comment: Option<String>,
    pub commented_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Key under which two deliveries count as the same event.
pub type DedupeKey = (String, String, String);

/// Callback fields before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCallback {
    pub ledger: LedgerId,
    pub event_type: EventType,
    pub tid: String,
    pub parent_tid: Option<String>,
    pub checksum: String,
    pub payload: Value,
}

impl CallbackEntry {
    pub fn new(id: CallbackId, new: NewCallback, now: DateTime<Utc>) -> Self {
        Self {
            id,
            ledger: new.ledger,
            event_type: new.event_type,
            tid: new.tid,
            parent_tid: new.parent_tid,
            checksum: new.checksum,
            payload: new.payload,
            is_done: false,
            comment: None,
            commented_at: None,
            created_at: now,
        }
    }

    pub fn dedupe_key(&self) -> DedupeKey {
        (
            self.event_type.to_string(),
            self.tid.clone(),
            self.checksum.clone(),
        )
    }

    pub fn record_comment(&mut self, comment: impl Into<String>, at: DateTime<Utc>) {
        self.comment = Some(comment.into());
        self.commented_at = Some(at);
    }

    /// Returns false if the entry was already done.
    pub fn mark_done(&mut self) -> bool {
        if self.is_done {
            return false;
        }
        self.is_done = true;
        true
    }
}
