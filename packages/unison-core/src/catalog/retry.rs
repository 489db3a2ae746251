//! Retry logic for transient catalog errors.
//!
//! Provides exponential backoff for catalog requests that fail with
//! timeouts, connection errors or 5xx responses.

use std::future::Future;
use std::time::Duration;

use super::CatalogResult;
use crate::protocol_constants::CATALOG_RETRY_DELAYS_MS;

/// Executes a catalog request with retry logic for transient errors.
///
/// Retries transient failures with exponential backoff (200ms, 500ms, 1000ms).
/// Non-transient errors and the error of the final attempt are returned as-is.
///
/// # Arguments
/// * `action` - Action name for logging
/// * `operation` - Closure that performs the request
pub(crate) async fn with_retry<T, F, Fut>(action: &str, mut operation: F) -> CatalogResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CatalogResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() && attempt < CATALOG_RETRY_DELAYS_MS.len() => {
                let delay_ms = CATALOG_RETRY_DELAYS_MS[attempt];
                attempt += 1;
                log::warn!("[Catalog] {} transient error: {}", action, e);
                log::info!(
                    "[Catalog] Retrying {} (attempt {}/{}) after {}ms",
                    action,
                    attempt + 1,
                    CATALOG_RETRY_DELAYS_MS.len() + 1,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
