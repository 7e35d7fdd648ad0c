use std::{future::Future, time::Duration};

use tracing::warn;

/// Fixed-delay retry schedule. `max_retries: None` retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_retries.is_none_or(|max| attempt < max)
    }

    pub async fn wait(&self) {
        tokio::time::sleep(self.delay).await;
    }

    pub async fn retry<T, E, F, Fut>(&self, what: &str, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.retry_if(what, operation, |_| true).await
    }

    /// Like [`RetryPolicy::retry`], but errors rejected by `retryable` are returned at once.
    pub async fn retry_if<T, E, F, Fut, P>(
        &self,
        what: &str,
        mut operation: F,
        retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !retryable(&e) || !self.should_retry(attempt) => return Err(e),
                Err(e) => {
                    warn!(
                        "{} failed (attempt {}): {}, retrying in {:?}",
                        what,
                        attempt + 1,
                        e,
                        self.delay
                    );
                    attempt += 1;
                    self.wait().await;
                }
            }
        }
    }
}
