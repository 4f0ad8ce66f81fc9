use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use log::debug;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_ms: u64,
}
impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 500,
        }
    }
}
impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Runs `op` until it succeeds, at most `settings.attempts` times, sleeping a
/// fixed delay in between. Only meant for reads that may lag behind a write
/// the server just made. Coupon submission is never retried.
pub async fn with_fixed_delay<T, F, Fut>(settings: RetrySettings, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = settings.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                return Err(e.context(format!("gave up after {} attempts", attempts)))
            }
            Err(e) => {
                debug!("Attempt {}/{} failed: {:#}", attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(settings.delay()).await;
            }
        }
    }
}
