//! Human moderation records.

use chrono::{DateTime, Utc};
use common::{ArtifactId, ReviewId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// The stage a review gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    /// The generated artwork shown to the customer.
    Proof,
    /// The upscaled file that goes to the printer.
    HighresPrintFile,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::Proof => "proof",
            ReviewType::HighresPrintFile => "highres_print_file",
        }
    }
}

impl std::fmt::Display for ReviewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReviewType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "proof" => Ok(ReviewType::Proof),
            "highres_print_file" => Ok(ReviewType::HighresPrintFile),
            other => Err(DomainError::UnknownValue {
                kind: "review type",
                value: other.to_string(),
            }),
        }
    }
}

/// Review state machine: `Pending → Approved | Rejected`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReviewStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(DomainError::UnknownValue {
                kind: "review status",
                value: other.to_string(),
            }),
        }
    }
}

/// A moderator's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
}

impl ReviewOutcome {
    pub fn as_status(&self) -> ReviewStatus {
        match self {
            ReviewOutcome::Approved => ReviewStatus::Approved,
            ReviewOutcome::Rejected => ReviewStatus::Rejected,
        }
    }
}

impl std::fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_status())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub artifact_id: ArtifactId,
    pub review_type: ReviewType,
    pub status: ReviewStatus,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(artifact_id: ArtifactId, review_type: ReviewType) -> Self {
        Self {
            id: ReviewId::new(),
            artifact_id,
            review_type,
            status: ReviewStatus::Pending,
            reviewer: None,
            notes: None,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    /// Records the moderator's decision. Only a pending review can be decided.
    pub fn decide(
        &mut self,
        outcome: ReviewOutcome,
        reviewer: impl Into<String>,
        notes: Option<String>,
    ) -> Result<()> {
        if !self.status.is_pending() {
            return Err(DomainError::ReviewAlreadyDecided(self.id));
        }
        self.status = outcome.as_status();
        self.reviewer = Some(reviewer.into());
        self.notes = notes;
        self.decided_at = Some(Utc::now());
        Ok(())
    }
}
