//! The generated artwork being sold and its enhancement lifecycle.

use chrono::{DateTime, Utc};
use common::ArtifactId;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Progress of the upscaling step for an artifact.
///
/// ```text
/// Pending ──► Processing ──┬──► Completed
///    ▲                     └──► Failed ──► Processing (manual reprocess)
///    └─ NotRequired (digital only, set before any enhancement)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementStatus {
    /// The artifact is never sent to physical production.
    NotRequired,

    /// Enhancement has not been attempted yet.
    #[default]
    Pending,

    /// An enhancement call is in flight.
    Processing,

    /// The enhanced asset passed verification and is stored.
    Completed,

    /// The last attempt failed; the primary asset is used instead.
    Failed,
}

impl EnhancementStatus {
    /// Returns true if an enhancement call may be started from this status.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            EnhancementStatus::Pending | EnhancementStatus::Processing | EnhancementStatus::Failed
        )
    }

    /// Returns true if the status can move to `next`.
    pub fn can_transition_to(&self, next: EnhancementStatus) -> bool {
        use EnhancementStatus::*;
        matches!(
            (self, next),
            (Pending, NotRequired)
                | (Failed, NotRequired)
                | (Pending, Processing)
                | (Failed, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Returns true if no external call will ever be made for this artifact again.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            EnhancementStatus::Completed | EnhancementStatus::NotRequired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnhancementStatus::NotRequired => "not_required",
            EnhancementStatus::Pending => "pending",
            EnhancementStatus::Processing => "processing",
            EnhancementStatus::Completed => "completed",
            EnhancementStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EnhancementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EnhancementStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_required" => Ok(EnhancementStatus::NotRequired),
            "pending" => Ok(EnhancementStatus::Pending),
            "processing" => Ok(EnhancementStatus::Processing),
            "completed" => Ok(EnhancementStatus::Completed),
            "failed" => Ok(EnhancementStatus::Failed),
            other => Err(DomainError::UnknownValue {
                kind: "enhancement status",
                value: other.to_string(),
            }),
        }
    }
}

/// A generated image asset.
///
/// `enhanced_url` is only ever set together with [`EnhancementStatus::Completed`];
/// the mutators below are the only way to change either field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub primary_url: String,
    enhanced_url: Option<String>,
    enhancement_status: EnhancementStatus,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates a freshly generated artifact awaiting enhancement.
    pub fn new(primary_url: impl Into<String>) -> Self {
        Self {
            id: ArtifactId::new(),
            primary_url: primary_url.into(),
            enhanced_url: None,
            enhancement_status: EnhancementStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Rebuilds an artifact from persisted columns, checking the url/status invariant.
    pub fn restore(
        id: ArtifactId,
        primary_url: String,
        enhanced_url: Option<String>,
        enhancement_status: EnhancementStatus,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if enhanced_url.is_some() && enhancement_status != EnhancementStatus::Completed {
            return Err(DomainError::InvalidEnhancementTransition {
                from: enhancement_status,
                to: EnhancementStatus::Completed,
            });
        }
        Ok(Self {
            id,
            primary_url,
            enhanced_url,
            enhancement_status,
            created_at,
        })
    }

    pub fn enhanced_url(&self) -> Option<&str> {
        self.enhanced_url.as_deref()
    }

    pub fn enhancement_status(&self) -> EnhancementStatus {
        self.enhancement_status
    }

    /// The best asset currently available: enhanced when completed, primary otherwise.
    pub fn best_url(&self) -> &str {
        self.enhanced_url.as_deref().unwrap_or(&self.primary_url)
    }

    pub fn mark_processing(&mut self) -> Result<()> {
        self.transition(EnhancementStatus::Processing)
    }

    pub fn mark_completed(&mut self, enhanced_url: impl Into<String>) -> Result<()> {
        self.transition(EnhancementStatus::Completed)?;
        self.enhanced_url = Some(enhanced_url.into());
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<()> {
        self.transition(EnhancementStatus::Failed)
    }

    pub fn mark_not_required(&mut self) -> Result<()> {
        if self.enhancement_status == EnhancementStatus::NotRequired {
            return Ok(());
        }
        self.transition(EnhancementStatus::NotRequired)
    }

    fn transition(&mut self, next: EnhancementStatus) -> Result<()> {
        if !self.enhancement_status.can_transition_to(next) {
            return Err(DomainError::InvalidEnhancementTransition {
                from: self.enhancement_status,
                to: next,
            });
        }
        self.enhancement_status = next;
        if next != EnhancementStatus::Completed {
            self.enhanced_url = None;
        }
        Ok(())
    }
}
