//! Orchestration settings.

use domain::ReviewType;
use resilience::{DependencyPolicy, IntegrityPolicy};
use serde::{Deserialize, Serialize};

use crate::services::EnhancementParams;

/// Whether artifacts wait for a human decision before production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub enabled: bool,
    /// The review an order needs approved before it goes to the vendor.
    pub review_type: ReviewType,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            review_type: ReviewType::HighresPrintFile,
        }
    }
}

/// Settings for the fulfillment pipeline.
///
/// One [`DependencyPolicy`] per external dependency; each becomes one
/// breaker and one queue shared by every call to that dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentConfig {
    pub moderation: ModerationConfig,
    pub enhancement: DependencyPolicy,
    pub vendor: DependencyPolicy,
    /// Asset downloads used by the integrity check.
    pub storage: DependencyPolicy,
    pub integrity: IntegrityPolicy,
    pub enhancement_params: EnhancementParams,
    /// With enhancement off, artifacts are marked not required and the
    /// original asset is sent without calling the enhancement service.
    pub enhancement_enabled: bool,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            moderation: ModerationConfig::default(),
            enhancement: DependencyPolicy::enhancement(),
            vendor: DependencyPolicy::vendor(),
            storage: DependencyPolicy::storage(),
            integrity: IntegrityPolicy::default(),
            enhancement_params: EnhancementParams::default(),
            enhancement_enabled: true,
        }
    }
}

impl FulfillmentConfig {
    pub fn with_moderation(mut self, review_type: ReviewType) -> Self {
        self.moderation = ModerationConfig {
            enabled: true,
            review_type,
        };
        self
    }

    pub fn without_enhancement(mut self) -> Self {
        self.enhancement_enabled = false;
        self
    }
}
