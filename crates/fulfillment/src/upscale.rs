//! Enhancement of an artifact before production, with fallback to the original.

use std::sync::Arc;

use common::ArtifactId;
use domain::{Artifact, EnhancementStatus};
use resilience::{DependencyGuard, IntegrityVerifier, RequestDeduplicator};
use serde::Serialize;
use store::{EnhancementUpdate, FulfillmentStore, FulfillmentStoreExt};
use tracing::{info, warn};

use crate::config::FulfillmentConfig;
use crate::error::{FulfillmentError, Result};
use crate::services::{AssetSource, EnhancementParams, EnhancementRequest, EnhancementService};

/// The asset to send downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnhancedAsset {
    pub url: String,
    /// True when enhancement failed and `url` is the original asset.
    pub used_fallback: bool,
    /// Why enhancement was skipped or failed, for the ledger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl EnhancedAsset {
    fn enhanced(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            used_fallback: false,
            fallback_reason: None,
        }
    }

    fn original(artifact: &Artifact) -> Self {
        Self::enhanced(artifact.primary_url.clone())
    }

    fn fallback(artifact: &Artifact, reason: String) -> Self {
        Self {
            url: artifact.primary_url.clone(),
            used_fallback: true,
            fallback_reason: Some(reason),
        }
    }
}

/// Sole writer of an artifact's enhancement status and enhanced URL.
///
/// Enhancement failures never propagate: they turn into a fallback to the
/// original asset. Only store errors and unknown artifacts are returned as
/// errors.
pub struct UpscaleOrchestrator<S> {
    store: Arc<S>,
    enhancer: Arc<dyn EnhancementService>,
    assets: Arc<dyn AssetSource>,
    enhancement_guard: DependencyGuard,
    storage_guard: DependencyGuard,
    dedup: RequestDeduplicator<Result<EnhancedAsset>>,
    verifier: IntegrityVerifier,
    params: EnhancementParams,
    enabled: bool,
}

impl<S: FulfillmentStore> UpscaleOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        enhancer: Arc<dyn EnhancementService>,
        assets: Arc<dyn AssetSource>,
        config: &FulfillmentConfig,
    ) -> Self {
        Self {
            store,
            enhancer,
            assets,
            enhancement_guard: DependencyGuard::new("enhancement", config.enhancement),
            storage_guard: DependencyGuard::new("storage", config.storage),
            dedup: RequestDeduplicator::new("enhancement"),
            verifier: IntegrityVerifier::new(config.integrity),
            params: config.enhancement_params.clone(),
            enabled: config.enhancement_enabled,
        }
    }

    pub fn enhancement_guard(&self) -> &DependencyGuard {
        &self.enhancement_guard
    }

    pub fn storage_guard(&self) -> &DependencyGuard {
        &self.storage_guard
    }

    /// Returns the enhanced asset URL, enhancing it first if needed.
    ///
    /// Concurrent calls for the same artifact share one upstream call.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_enhanced(&self, artifact_id: ArtifactId) -> Result<EnhancedAsset> {
        let artifact = self.store.require_artifact(artifact_id).await?;
        if let Some(asset) = Self::settled(&artifact) {
            return Ok(asset);
        }
        if !self.enabled {
            let artifact = self.mark_not_required(artifact_id).await?;
            return Ok(EnhancedAsset::original(&artifact));
        }

        self.dedup
            .run(&artifact_id.to_string(), || self.enhance(artifact_id))
            .await
    }

    /// Marks the artifact as not needing enhancement, if it has not been enhanced.
    #[tracing::instrument(skip(self))]
    pub async fn mark_not_required(&self, artifact_id: ArtifactId) -> Result<Artifact> {
        let artifact = self.store.require_artifact(artifact_id).await?;
        if !artifact
            .enhancement_status()
            .can_transition_to(EnhancementStatus::NotRequired)
        {
            return Ok(artifact);
        }
        Ok(self
            .store
            .update_enhancement(artifact_id, EnhancementUpdate::NotRequired)
            .await?)
    }

    /// The answer for an artifact that needs no upstream call.
    fn settled(artifact: &Artifact) -> Option<EnhancedAsset> {
        match artifact.enhancement_status() {
            EnhancementStatus::Completed => artifact.enhanced_url().map(EnhancedAsset::enhanced),
            EnhancementStatus::NotRequired => Some(EnhancedAsset::original(artifact)),
            _ => None,
        }
    }

    async fn enhance(&self, artifact_id: ArtifactId) -> Result<EnhancedAsset> {
        // A previous leader may have finished since the caller's read.
        let artifact = self.store.require_artifact(artifact_id).await?;
        if let Some(asset) = Self::settled(&artifact) {
            return Ok(asset);
        }
        let artifact = self
            .store
            .update_enhancement(artifact_id, EnhancementUpdate::Processing)
            .await?;

        match self.call_and_verify(&artifact).await {
            Ok(enhanced_url) => {
                self.store
                    .update_enhancement(
                        artifact.id,
                        EnhancementUpdate::Completed {
                            enhanced_url: enhanced_url.clone(),
                        },
                    )
                    .await?;
                metrics::counter!("enhancement_completed_total").increment(1);
                info!(artifact_id = %artifact.id, %enhanced_url, "Artifact enhanced");
                Ok(EnhancedAsset::enhanced(enhanced_url))
            }
            Err(e) => {
                self.store
                    .update_enhancement(artifact.id, EnhancementUpdate::Failed)
                    .await?;
                metrics::counter!("enhancement_fallback_total").increment(1);
                warn!(
                    artifact_id = %artifact.id,
                    error = %e,
                    kind = %e.kind(),
                    "Enhancement failed, falling back to original asset"
                );
                Ok(EnhancedAsset::fallback(&artifact, e.to_string()))
            }
        }
    }

    /// Calls the enhancement service and checks the result against the original.
    async fn call_and_verify(&self, artifact: &Artifact) -> Result<String> {
        let request = EnhancementRequest {
            image_url: artifact.primary_url.clone(),
            params: self.params.clone(),
        };
        let result = self
            .enhancement_guard
            .call(|| self.enhancer.enhance(&request))
            .await
            .map_err(|e| FulfillmentError::from_dependency("enhancement", e))?;

        let original = self.download(&artifact.primary_url).await?;
        let enhanced = self.download(&result.image_url).await?;
        let verified = self.verifier.verify(original.len(), &enhanced)?;
        info!(
            width = verified.width,
            height = verified.height,
            size_ratio = verified.size_ratio,
            "Enhanced asset passed integrity check"
        );
        Ok(result.image_url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.storage_guard
            .call(|| self.assets.fetch(url))
            .await
            .map_err(|e| FulfillmentError::from_dependency("storage", e))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use futures_util::future::join_all;
    use image::{ImageFormat, RgbImage};
    use resilience::{CircuitState, DependencyPolicy};
    use store::InMemoryFulfillmentStore;

    use super::*;
    use crate::services::{InMemoryAssetSource, InMemoryEnhancementService};

    const ORIGINAL: &str = "https://cdn.example.com/art.png";
    const ENHANCED: &str = "https://cdn.example.com/art.png?enhanced=1";

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    struct Fixture {
        store: Arc<InMemoryFulfillmentStore>,
        enhancer: InMemoryEnhancementService,
        assets: InMemoryAssetSource,
        upscale: Arc<UpscaleOrchestrator<InMemoryFulfillmentStore>>,
        artifact_id: ArtifactId,
    }

    async fn fixture(config: FulfillmentConfig) -> Fixture {
        let store = Arc::new(InMemoryFulfillmentStore::new());
        let artifact = Artifact::new(ORIGINAL);
        store.insert_artifact(&artifact).await.unwrap();

        let enhancer = InMemoryEnhancementService::new();
        let assets = InMemoryAssetSource::new();
        assets.insert(ORIGINAL, png(32, 32));
        assets.insert(ENHANCED, png(96, 96));

        let upscale = Arc::new(UpscaleOrchestrator::new(
            store.clone(),
            Arc::new(enhancer.clone()),
            Arc::new(assets.clone()),
            &config,
        ));
        Fixture {
            store,
            enhancer,
            assets,
            upscale,
            artifact_id: artifact.id,
        }
    }

    #[tokio::test]
    async fn test_enhances_and_caches() {
        let f = fixture(FulfillmentConfig::default()).await;

        let asset = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert_eq!(asset, EnhancedAsset::enhanced(ENHANCED));

        let artifact = f.store.get_artifact(f.artifact_id).await.unwrap().unwrap();
        assert_eq!(artifact.enhancement_status(), EnhancementStatus::Completed);
        assert_eq!(artifact.enhanced_url(), Some(ENHANCED));

        // Completed artifacts never call the service again.
        let again = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert_eq!(again.url, ENHANCED);
        assert_eq!(f.enhancer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_not_required_skips_service() {
        let f = fixture(FulfillmentConfig::default()).await;
        f.upscale.mark_not_required(f.artifact_id).await.unwrap();

        let asset = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert_eq!(asset.url, ORIGINAL);
        assert!(!asset.used_fallback);
        assert_eq!(f.enhancer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_enhancement_sends_original() {
        let f = fixture(FulfillmentConfig::default().without_enhancement()).await;

        let asset = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert_eq!(asset.url, ORIGINAL);
        assert!(!asset.used_fallback);
        assert_eq!(f.enhancer.call_count(), 0);
        assert_eq!(f.assets.fetch_count(), 0);
        assert_eq!(f.upscale.storage_guard().state(), CircuitState::Closed);

        let artifact = f.store.get_artifact(f.artifact_id).await.unwrap().unwrap();
        assert_eq!(artifact.enhancement_status(), EnhancementStatus::NotRequired);
    }

    #[tokio::test]
    async fn test_service_failure_falls_back() {
        let f = fixture(FulfillmentConfig::default()).await;
        f.enhancer.set_fail_on_enhance(true);

        let asset = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert_eq!(asset.url, ORIGINAL);
        assert!(asset.used_fallback);
        assert!(asset.fallback_reason.is_some());

        let artifact = f.store.get_artifact(f.artifact_id).await.unwrap().unwrap();
        assert_eq!(artifact.enhancement_status(), EnhancementStatus::Failed);
        assert_eq!(artifact.enhanced_url(), None);
    }

    #[tokio::test]
    async fn test_integrity_failure_falls_back() {
        let f = fixture(FulfillmentConfig::default()).await;
        // Far smaller than the original: looks truncated.
        f.assets.insert(ENHANCED, vec![0u8; 8]);
        f.assets.insert(ORIGINAL, png(256, 256));

        let asset = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert!(asset.used_fallback);
        assert!(
            asset
                .fallback_reason
                .as_deref()
                .is_some_and(|r| r.contains("Integrity"))
        );
    }

    #[tokio::test]
    async fn test_failed_artifact_is_retried() {
        let f = fixture(FulfillmentConfig::default()).await;
        f.enhancer.set_fail_on_enhance(true);
        assert!(f.upscale.ensure_enhanced(f.artifact_id).await.unwrap().used_fallback);

        f.enhancer.set_fail_on_enhance(false);
        let asset = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert!(!asset.used_fallback);
        assert_eq!(f.enhancer.call_count(), 2);
    }

    #[tokio::test]
    async fn test_open_breaker_falls_back_without_calling() {
        let config = FulfillmentConfig {
            enhancement: DependencyPolicy::new(3, Duration::from_secs(60)),
            ..FulfillmentConfig::default()
        };
        let f = fixture(config).await;
        f.enhancer.set_fail_on_enhance(true);

        for _ in 0..3 {
            assert!(f.upscale.ensure_enhanced(f.artifact_id).await.unwrap().used_fallback);
        }
        assert_eq!(f.upscale.enhancement_guard().state(), CircuitState::Open);

        let asset = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert!(asset.used_fallback);
        assert_eq!(asset.url, ORIGINAL);
        assert_eq!(f.enhancer.call_count(), 3);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let config = FulfillmentConfig {
            enhancement: DependencyPolicy::new(3, Duration::from_secs(60))
                .with_call_timeout(Duration::from_millis(20)),
            ..FulfillmentConfig::default()
        };
        let f = fixture(config).await;
        f.enhancer.set_delay(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let asset = f.upscale.ensure_enhanced(f.artifact_id).await.unwrap();
        assert!(asset.used_fallback);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_upstream_call() {
        let f = fixture(FulfillmentConfig::default()).await;
        f.enhancer.set_delay(Duration::from_millis(30));

        let calls = (0..6).map(|_| {
            let upscale = f.upscale.clone();
            let artifact_id = f.artifact_id;
            tokio::spawn(async move { upscale.ensure_enhanced(artifact_id).await })
        });
        for result in join_all(calls).await {
            assert_eq!(result.unwrap().unwrap().url, ENHANCED);
        }
        assert_eq!(f.enhancer.call_count(), 1);
    }
}
