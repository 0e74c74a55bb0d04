//! Image enhancement (upscaling) service.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ServiceError, check_status};

/// Fixed parameters sent with every enhancement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementParams {
    pub prompt: String,
    pub upscale_factor: u32,
    pub negative_prompt: String,
    pub creativity: f32,
    pub resemblance: f32,
    pub guidance_scale: f32,
    pub num_inference_steps: u32,
    pub enable_safety_checker: bool,
}

impl Default for EnhancementParams {
    fn default() -> Self {
        Self {
            prompt: "masterpiece, best quality, highres, visible paintstroke texture, oil painting style"
                .to_string(),
            upscale_factor: 3,
            negative_prompt: "(worst quality, low quality, normal quality:2), blurry, pixelated, artifacts"
                .to_string(),
            creativity: 0.35,
            resemblance: 0.8,
            guidance_scale: 4.0,
            num_inference_steps: 18,
            enable_safety_checker: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhancementRequest {
    pub image_url: String,
    #[serde(flatten)]
    pub params: EnhancementParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementResult {
    pub image_url: String,
}

/// Trait for the image enhancement collaborator: URL in, URL out.
#[async_trait]
pub trait EnhancementService: Send + Sync {
    async fn enhance(&self, request: &EnhancementRequest)
    -> Result<EnhancementResult, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryEnhancementState {
    requests: Vec<EnhancementRequest>,
    fail_on_enhance: bool,
    delay: Option<Duration>,
    /// Overrides the URL returned for every request.
    result_url: Option<String>,
}

/// In-memory enhancement service for testing.
///
/// Returns `<input>?enhanced=1` unless a result URL is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEnhancementService {
    state: Arc<RwLock<InMemoryEnhancementState>>,
}

impl InMemoryEnhancementService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail every enhance call.
    pub fn set_fail_on_enhance(&self, fail: bool) {
        self.state.write().unwrap().fail_on_enhance = fail;
    }

    /// Makes every call take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state.write().unwrap().delay = Some(delay);
    }

    pub fn set_result_url(&self, url: impl Into<String>) {
        self.state.write().unwrap().result_url = Some(url.into());
    }

    /// Number of calls that reached the service, failed ones included.
    pub fn call_count(&self) -> usize {
        self.state.read().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<EnhancementRequest> {
        self.state.read().unwrap().requests.clone()
    }
}

#[async_trait]
impl EnhancementService for InMemoryEnhancementService {
    async fn enhance(
        &self,
        request: &EnhancementRequest,
    ) -> Result<EnhancementResult, ServiceError> {
        let delay = {
            let mut state = self.state.write().unwrap();
            state.requests.push(request.clone());
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.read().unwrap();
        if state.fail_on_enhance {
            return Err(ServiceError::Unavailable("enhancement backend down".to_string()));
        }
        let image_url = state
            .result_url
            .clone()
            .unwrap_or_else(|| format!("{}?enhanced=1", request.image_url));
        Ok(EnhancementResult { image_url })
    }
}

#[derive(Debug, Deserialize)]
struct UpscaleResponse {
    image: UpscaleImage,
}

#[derive(Debug, Deserialize)]
struct UpscaleImage {
    url: String,
}

/// Client for a hosted clarity-upscaler endpoint.
///
/// Posts the request as JSON with `Authorization: Key <api key>` and reads
/// `image.url` from the response.
#[derive(Debug, Clone)]
pub struct HttpEnhancementService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpEnhancementService {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl EnhancementService for HttpEnhancementService {
    #[tracing::instrument(skip(self, request), fields(endpoint = %self.endpoint))]
    async fn enhance(
        &self,
        request: &EnhancementRequest,
    ) -> Result<EnhancementResult, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Key {}", self.api_key))
            .json(request)
            .send()
            .await?;
        let body: UpscaleResponse = check_status(response).await?.json().await?;
        Ok(EnhancementResult {
            image_url: body.image.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EnhancementRequest {
        EnhancementRequest {
            image_url: "https://cdn.example.com/a.png".to_string(),
            params: EnhancementParams::default(),
        }
    }

    #[tokio::test]
    async fn test_enhance_records_request() {
        let service = InMemoryEnhancementService::new();
        let result = service.enhance(&request()).await.unwrap();
        assert_eq!(result.image_url, "https://cdn.example.com/a.png?enhanced=1");
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_enhance_still_counts_call() {
        let service = InMemoryEnhancementService::new();
        service.set_fail_on_enhance(true);
        assert!(service.enhance(&request()).await.is_err());
        assert_eq!(service.call_count(), 1);
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(request()).unwrap();
        assert_eq!(body["image_url"], "https://cdn.example.com/a.png");
        assert_eq!(body["upscale_factor"], 3);
        assert_eq!(body["num_inference_steps"], 18);
        assert_eq!(body["enable_safety_checker"], true);
    }
}
