// src/utils/retry.rs

//! Retry with linear backoff.
//!
//! Delays go through [`Pause`] so callers (and tests) decide whether time
//! actually passes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Something that can wait.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Real waiting on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Attempt ceiling plus linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number. Only errors for which
    /// [`crate::error::AppError::is_transient`] holds are retried; the last error is
    /// returned once the ceiling is reached.
    pub async fn run<T, F, Fut>(&self, pause: &dyn Pause, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => return Err(error),
                Err(error) if attempt >= self.max_attempts => return Err(error),
                Err(error) => {
                    log::debug!("Attempt {} failed: {}", attempt, error);
                    pause.pause(self.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Convenience for building a policy straight from crawler settings.
impl From<&crate::models::CrawlerConfig> for RetryPolicy {
    fn from(config: &crate::models::CrawlerConfig) -> Self {
        Self::new(config.max_attempts, config.retry_base_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testing::RecordingPause;

    fn transient() -> AppError {
        AppError::ContentMissing {
            page: 1,
            selector: ".card".into(),
        }
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(2000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_succeeds_before_ceiling() {
        let pause = RecordingPause::default();
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        let result = policy
            .run(&pause, |attempt| async move {
                if attempt < 3 { Err(transient()) } else { Ok(attempt) }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            pause.recorded(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_ceiling() {
        let pause = RecordingPause::default();
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let mut calls = 0;

        let result: Result<()> = policy
            .run(&pause, |_| {
                calls += 1;
                async { Err(transient()) }
            })
            .await;

        assert!(matches!(result, Err(AppError::ContentMissing { .. })));
        assert_eq!(calls, 3);
        assert_eq!(pause.recorded().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let pause = RecordingPause::default();
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let mut calls = 0;

        let result: Result<()> = policy
            .run(&pause, |_| {
                calls += 1;
                async { Err(AppError::selector("[[", "bad")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
        assert!(pause.recorded().is_empty());
    }
}
