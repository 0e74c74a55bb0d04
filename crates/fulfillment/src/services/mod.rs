//! External collaborator traits with in-memory and HTTP implementations.

pub mod assets;
pub mod enhancement;
pub mod notifier;
pub mod vendor;

use thiserror::Error;

pub use assets::{AssetSource, HttpAssetSource, InMemoryAssetSource};
pub use enhancement::{
    EnhancementParams, EnhancementRequest, EnhancementResult, EnhancementService,
    HttpEnhancementService, InMemoryEnhancementService,
};
pub use notifier::{InMemoryNotifier, LoggingNotifier, Notification, Notifier};
pub use vendor::{
    CreatedProduct, HttpVendorApi, InMemoryVendorApi, VendorApi, VendorOrderRequest,
    VendorProductRequest,
};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The request never got a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The collaborator answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The collaborator is down or refused to work.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Returns true if repeating the same request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ServiceError::Status { status, .. }
                if (400..500).contains(status) && !matches!(*status, 408 | 429)
        )
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ServiceError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => ServiceError::InvalidResponse(err.to_string()),
            None => ServiceError::Transport(err.to_string()),
        }
    }
}

/// Turns a non-success response into `ServiceError::Status`, keeping the body
/// as the message.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    Err(ServiceError::Status {
        status: status.as_u16(),
        message,
    })
}
