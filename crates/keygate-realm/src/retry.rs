//! Back-off strategies for transient infrastructure failures.
//!
//! Domain rejections are terminal and must never pass through a retry loop;
//! callers classify errors with the `is_retriable` predicate.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Fail on the first error.
    Never,
    /// A single retry after `delay`.
    Once { delay: Duration },
    /// Up to `max_retries` retries with a fixed delay.
    Constant { delay: Duration, max_retries: u32 },
    /// Geometric back-off capped at `max_delay`, jittered by `random_factor`.
    Exponential {
        initial: Duration,
        factor: f64,
        max_delay: Duration,
        max_retries: u32,
        random_factor: f64,
    },
}

impl RetryStrategy {
    /// Exponential back-off with the conventional factor 2 and 20% jitter.
    pub fn exponential(initial: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self::Exponential {
            initial,
            factor: 2.0,
            max_delay,
            max_retries,
            random_factor: 0.2,
        }
    }

    /// The deterministic delay schedule, before jitter.
    pub fn delays(&self) -> Vec<Duration> {
        match self {
            Self::Never => Vec::new(),
            Self::Once { delay } => vec![*delay],
            Self::Constant { delay, max_retries } => vec![*delay; *max_retries as usize],
            Self::Exponential {
                initial,
                factor,
                max_delay,
                max_retries,
                ..
            } => {
                let cap = max_delay.as_secs_f64();
                let mut delays = Vec::with_capacity(*max_retries as usize);
                let mut next = initial.as_secs_f64();
                for _ in 0..*max_retries {
                    delays.push(Duration::from_secs_f64(next.min(cap)));
                    next *= factor;
                }
                delays
            }
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let random_factor = match self {
            Self::Exponential { random_factor, .. } => *random_factor,
            _ => 0.0,
        };
        if random_factor <= 0.0 {
            return delay;
        }
        let spread = delay.as_secs_f64() * random_factor;
        let jitter = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }
}

/// Run `op`, sleeping between attempts according to `strategy` as long as the
/// failure is classified retriable. The sleep is an ordinary future, so
/// dropping the returned future cancels any pending back-off.
pub async fn retry<T, E, F, Fut, P>(
    strategy: &RetryStrategy,
    is_retriable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut delays = strategy.delays().into_iter();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retriable(&err) => match delays.next() {
                Some(delay) => tokio::time::sleep(strategy.jittered(delay)).await,
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}
