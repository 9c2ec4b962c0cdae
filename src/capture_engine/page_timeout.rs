//! Timeout wrapper for page operations
//!
//! Keeps a hung navigation or screenshot from stalling a lane forever.

use std::future::Future;
use std::time::Duration;

use super::capture_types::CaptureError;

/// Run `operation` with an upper bound of `timeout`.
///
/// Elapsing maps to [`CaptureError::Timeout`] naming the operation and URL;
/// an operation error passes through unchanged.
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &'static str,
    url: &str,
) -> Result<T, CaptureError>
where
    F: Future<Output = Result<T, CaptureError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(CaptureError::Timeout {
            operation: operation_name,
            url: url.to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_operation_becomes_timeout_error() {
        let result: Result<(), _> = with_page_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(10),
            "navigation",
            "https://example.com/",
        )
        .await;

        assert!(matches!(
            result,
            Err(CaptureError::Timeout { operation: "navigation", .. })
        ));
    }

    #[tokio::test]
    async fn fast_operation_passes_through() {
        let value = with_page_timeout(async { Ok(7) }, Duration::from_secs(1), "capture", "u")
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
