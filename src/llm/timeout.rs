//! Timeout wrapper for completion-service calls.
//!
//! Expiry converts into a retryable [`DocError::Timeout`]; cancellation is
//! scoped to the wrapped future only, never the surrounding call chain.

use std::future::Future;
use std::time::Duration;

use crate::types::{DocError, Result};

/// Execute an async operation with a timeout.
///
/// Returns `DocError::Timeout` naming `operation` if the future does not
/// complete within `timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(DocError::timeout(operation, timeout)),
    }
}
