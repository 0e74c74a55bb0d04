//! Append-only status history entries.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::order::OrderStatus;

/// Whether an entry records a status change or only a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Written exactly once per accepted status change.
    Transition,
    /// A note against the current status; the status did not change.
    Annotation,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Transition => "transition",
            EntryKind::Annotation => "annotation",
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transition" => Ok(EntryKind::Transition),
            "annotation" => Ok(EntryKind::Annotation),
            other => Err(DomainError::UnknownValue {
                kind: "history entry kind",
                value: other.to_string(),
            }),
        }
    }
}

/// One line of an order's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub kind: EntryKind,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
    /// Assigned by the store; orders entries that share a timestamp.
    pub sequence: i64,
}

impl StatusHistoryEntry {
    pub fn transition(order_id: OrderId, status: OrderStatus, note: impl Into<String>) -> Self {
        Self::new(order_id, status, EntryKind::Transition, note)
    }

    pub fn annotation(order_id: OrderId, status: OrderStatus, note: impl Into<String>) -> Self {
        Self::new(order_id, status, EntryKind::Annotation, note)
    }

    fn new(order_id: OrderId, status: OrderStatus, kind: EntryKind, note: impl Into<String>) -> Self {
        Self {
            order_id,
            status,
            kind,
            note: note.into(),
            recorded_at: Utc::now(),
            sequence: 0,
        }
    }

    pub fn is_transition(&self) -> bool {
        self.kind == EntryKind::Transition
    }
}
