//! Resilient provider wrapper with bounded retry
//!
//! Wraps any ProviderPort implementation with retry logic for the synchronous
//! calls (prompt enrichment, image generation). Video submission, polling,
//! download and consistency analysis pass straight through.

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::ports::{
    ConsistencyRequest, GeneratedImage, ImageGenerationRequest, OperationHandle, ProviderError,
    ProviderPort, VideoGenerationRequest, VideoOperation,
};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// base * 2^(attempt-1)
    Exponential,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Base delay in milliseconds before first retry
    pub base_delay_ms: u64,
    pub backoff: Backoff,
    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing delays
    pub jitter_factor: f64,
}

impl RetryConfig {
    /// Prompt enrichment: 3 attempts, fixed delay.
    pub fn enrichment() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff: Backoff::Fixed,
            max_delay_ms: 1000,
            jitter_factor: 0.2,
        }
    }

    /// Image generation: 3 attempts, exponential delay.
    pub fn image_generation() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            backoff: Backoff::Exponential,
            max_delay_ms: 30000,
            jitter_factor: 0.2,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let base = self.base_delay_ms;
        let raw = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
            }
        };
        let capped = raw.min(self.max_delay_ms.max(base));

        let jitter_range = (capped as f64 * self.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }
}

/// Wrapper that adds retry logic to any provider
pub struct ResilientProvider {
    inner: Arc<dyn ProviderPort>,
    enrichment: RetryConfig,
    image_generation: RetryConfig,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn ProviderPort>) -> Self {
        Self::with_configs(inner, RetryConfig::enrichment(), RetryConfig::image_generation())
    }

    pub fn with_configs(
        inner: Arc<dyn ProviderPort>,
        enrichment: RetryConfig,
        image_generation: RetryConfig,
    ) -> Self {
        Self {
            inner,
            enrichment,
            image_generation,
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts `config.max_attempts`. The final error is returned unchanged.
pub async fn execute_with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        attempt,
                        operation = operation_name,
                        "Provider request succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!(
                    error = %e,
                    status = e.status,
                    operation = operation_name,
                    "Provider request failed with non-retryable error"
                );
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!(
                    attempts = attempt,
                    error = %e,
                    operation = operation_name,
                    "Provider request failed after all retry attempts"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay,
                    error = %e,
                    operation = operation_name,
                    "Provider request failed, retrying..."
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

#[async_trait]
impl ProviderPort for ResilientProvider {
    async fn enrich_prompt(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        execute_with_retry(&self.enrichment, "enrich_prompt", || {
            self.inner.enrich_prompt(system_prompt, user_prompt)
        })
        .await
    }

    async fn generate_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<GeneratedImage, ProviderError> {
        let inner = Arc::clone(&self.inner);
        execute_with_retry(&self.image_generation, "generate_image", || {
            let inner = Arc::clone(&inner);
            let request = request.clone();
            async move { inner.generate_image(request).await }
        })
        .await
    }

    async fn generate_video_from_image(
        &self,
        request: VideoGenerationRequest,
    ) -> Result<OperationHandle, ProviderError> {
        self.inner.generate_video_from_image(request).await
    }

    async fn poll_operation(
        &self,
        handle: &OperationHandle,
    ) -> Result<VideoOperation, ProviderError> {
        self.inner.poll_operation(handle).await
    }

    async fn download_video(&self, operation: &VideoOperation) -> Result<Vec<u8>, ProviderError> {
        self.inner.download_video(operation).await
    }

    async fn analyze_image_consistency(
        &self,
        request: ConsistencyRequest,
    ) -> Result<String, ProviderError> {
        self.inner.analyze_image_consistency(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockProviderPort;
    use mockall::Sequence;

    fn fast(backoff: Backoff) -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            backoff,
            max_delay_ms: 10,
            jitter_factor: 0.0,
        }
    }

    fn transient() -> ProviderError {
        ProviderError::from_backend("gemini", "generate_image", Some(503), "Service Unavailable")
    }

    fn image() -> GeneratedImage {
        GeneratedImage {
            bytes: vec![1, 2, 3],
            mime_type: "image/png".into(),
            cost: 0.04,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let mut mock = MockProviderPort::new();
        let mut seq = Sequence::new();
        mock.expect_generate_image()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(transient()));
        mock.expect_generate_image()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(image()));

        let provider = ResilientProvider::with_configs(
            Arc::new(mock),
            fast(Backoff::Fixed),
            fast(Backoff::Exponential),
        );
        let result = provider
            .generate_image(ImageGenerationRequest::new("a chair"))
            .await;

        assert_eq!(result.unwrap().bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn final_failure_propagates_after_max_attempts() {
        let mut mock = MockProviderPort::new();
        mock.expect_enrich_prompt()
            .times(3)
            .returning(|_, _| {
                Err(ProviderError::from_backend("gemini", "enrich_prompt", Some(429), "slow down"))
            });

        let provider = ResilientProvider::with_configs(
            Arc::new(mock),
            fast(Backoff::Fixed),
            fast(Backoff::Exponential),
        );
        let err = provider.enrich_prompt("system", "user").await.unwrap_err();

        assert_eq!(err.status, 429);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_on_first_attempt() {
        let mut mock = MockProviderPort::new();
        mock.expect_generate_image().times(1).returning(|_| {
            Err(ProviderError::from_backend(
                "gemini",
                "generate_image",
                Some(404),
                "model not found",
            ))
        });

        let provider = ResilientProvider::with_configs(
            Arc::new(mock),
            fast(Backoff::Fixed),
            fast(Backoff::Exponential),
        );
        let err = provider
            .generate_image(ImageGenerationRequest::new("a chair"))
            .await
            .unwrap_err();

        assert_eq!(err.status, 404);
    }

    #[tokio::test]
    async fn video_submission_is_not_retried() {
        let mut mock = MockProviderPort::new();
        mock.expect_generate_video_from_image()
            .times(1)
            .returning(|_| Err(transient()));

        let provider = ResilientProvider::new(Arc::new(mock));
        let request = VideoGenerationRequest {
            prompt: "orbit".into(),
            image: crate::infrastructure::ports::ReferenceImage::new(vec![0], "image/png"),
            duration_seconds: 8,
            aspect_ratio: "16:9".into(),
        };

        assert!(provider.generate_video_from_image(request).await.is_err());
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 6,
            base_delay_ms: 1000,
            backoff: Backoff::Exponential,
            max_delay_ms: 30000,
            jitter_factor: 0.0,
        };

        assert_eq!(config.delay_for(1), 1000);
        assert_eq!(config.delay_for(2), 2000);
        assert_eq!(config.delay_for(3), 4000);
        assert_eq!(config.delay_for(5), 16000);
        assert_eq!(config.delay_for(6), 30000);
    }

    #[test]
    fn fixed_backoff_keeps_the_base_delay() {
        let config = RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::enrichment()
        };
        assert_eq!(config.delay_for(1), 1000);
        assert_eq!(config.delay_for(3), 1000);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(RetryConfig::image_generation().max_attempts, 3);
    }

    #[test]
    fn jitter_stays_within_factor_of_the_delay() {
        let config = RetryConfig::image_generation();
        for _ in 0..50 {
            let delay = config.delay_for(2);
            assert!((3200..=4800).contains(&delay), "{delay}");
        }
    }
}
