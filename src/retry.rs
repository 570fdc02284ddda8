#![allow(missing_docs)]
//! Bounded retry with exponential backoff and jitter for storage operations.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::StorageError;

/// Errors the retry loop can classify
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_transient(&self) -> bool;
}

impl Retryable for StorageError {
    fn is_transient(&self) -> bool {
        StorageError::is_transient(self)
    }
}

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random delay added to every backoff
    pub jitter_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            jitter_max_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts; for tests and batch tooling
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_max_ms: 0,
        }
    }

    /// `min(base * 2^(attempt - 1), max)` for a 1-based attempt number
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        self.base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }

    /// Backoff after a failed attempt, including jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_max_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_max_ms)
        };
        Duration::from_millis(self.backoff_ms(attempt) + jitter)
    }

    /// Upper bound on the total time spent sleeping before the last error is returned
    pub fn max_total_delay(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let total: u64 = (1..attempts)
            .map(|attempt| self.backoff_ms(attempt) + self.jitter_max_ms)
            .sum();
        Duration::from_millis(total)
    }
}

/// Run `f` until it succeeds, fails with a non-transient error, or the attempt budget is spent.
///
/// The error returned is the one produced by the last attempt, unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut f: F,
    config: &RetryConfig,
    operation: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                error!(operation, attempts = attempt, error = %e, "Operation failed after retries");
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient database error, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(feature = "native")]
async fn sleep(delay: Duration) {
    tokio::time::sleep(delay).await;
}

#[cfg(all(not(feature = "native"), feature = "wasm", target_arch = "wasm32"))]
async fn sleep(delay: Duration) {
    use wasm_bindgen::JsCast;

    let ms = delay.as_millis().min(i32::MAX as u128) as i32;
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let set_timeout = js_sys::Reflect::get(
            &js_sys::global(),
            &wasm_bindgen::JsValue::from_str("setTimeout"),
        )
        .ok()
        .and_then(|f| f.dyn_into::<js_sys::Function>().ok());
        match set_timeout {
            Some(set_timeout) => {
                let _ = set_timeout.call2(
                    &wasm_bindgen::JsValue::NULL,
                    &resolve,
                    &wasm_bindgen::JsValue::from(ms),
                );
            }
            None => {
                let _ = resolve.call0(&wasm_bindgen::JsValue::NULL);
            }
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}

#[cfg(not(any(feature = "native", all(feature = "wasm", target_arch = "wasm32"))))]
async fn sleep(delay: Duration) {
    tracing::debug!(delay_ms = delay.as_millis() as u64, "No timer available, retrying immediately");
}
