pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod webhooks;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path segment into one of the id newtypes.
pub(crate) fn parse_id<T: FromStr>(kind: &str, raw: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id {raw:?}: {e}")))
}
