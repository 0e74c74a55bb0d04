//! Asset download, used to check enhanced files against their originals.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{ServiceError, check_status};

#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Downloads the asset at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryAssetState {
    assets: HashMap<String, Vec<u8>>,
    fetches: usize,
    fail_on_fetch: bool,
}

/// In-memory asset store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAssetSource {
    state: Arc<RwLock<InMemoryAssetState>>,
}

impl InMemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.state.write().unwrap().assets.insert(url.into(), bytes);
    }

    pub fn set_fail_on_fetch(&self, fail: bool) {
        self.state.write().unwrap().fail_on_fetch = fail;
    }

    pub fn fetch_count(&self) -> usize {
        self.state.read().unwrap().fetches
    }
}

#[async_trait]
impl AssetSource for InMemoryAssetSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.fetches += 1;
        if state.fail_on_fetch {
            return Err(ServiceError::Unavailable("storage offline".to_string()));
        }
        state.assets.get(url).cloned().ok_or(ServiceError::Status {
            status: 404,
            message: format!("no asset at {url}"),
        })
    }
}

/// Downloads assets over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: reqwest::Client,
}

impl HttpAssetSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self.client.get(url).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_known_and_unknown() {
        let source = InMemoryAssetSource::new();
        source.insert("https://cdn.example.com/a.png", vec![1, 2, 3]);

        assert_eq!(
            source.fetch("https://cdn.example.com/a.png").await.unwrap(),
            vec![1, 2, 3]
        );
        let missing = source.fetch("https://cdn.example.com/b.png").await;
        assert!(matches!(missing, Err(ServiceError::Status { status: 404, .. })));
        assert_eq!(source.fetch_count(), 2);
    }
}
