use std::future::Future;
use std::time::Duration;

use mako_settings::RetrySettings;

/// Exponential backoff policy for fallible async operations.
///
/// The policy is an immutable value; every `run*` call keeps its own attempt
/// state, so independent operations can share one policy concurrently.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            exponential_base: settings.exponential_base,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `initial * base^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Run `op`, retrying every failure.
    pub async fn run<T, E, Op, Fut>(&self, op: Op) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(op, |_| true, |_, _| {}).await
    }

    /// Run `op`, retrying every failure and reporting each retry to `on_retry`.
    pub async fn run_observed<T, E, Op, Fut, Obs>(&self, op: Op, on_retry: Obs) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Obs: FnMut(u32, &E),
    {
        self.run_if(op, |_| true, on_retry).await
    }

    /// Run `op`, retrying failures accepted by `should_retry`.
    ///
    /// `on_retry` receives the 1-based retry number and the failure before
    /// the backoff sleep. A disabled policy invokes `op` exactly once. When
    /// attempts are exhausted the last failure is returned unchanged.
    pub async fn run_if<T, E, Op, Fut, Pred, Obs>(
        &self,
        mut op: Op,
        should_retry: Pred,
        mut on_retry: Obs,
    ) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Pred: Fn(&E) -> bool,
        Obs: FnMut(u32, &E),
    {
        if !self.enabled {
            return op().await;
        }

        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !should_retry(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    on_retry(attempt, &err);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
