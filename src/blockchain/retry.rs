// src/blockchain/retry.rs
//! Bounded, immediate retry.
//!
//! Each attempt returns a `Result`; failures are recorded with their reason so
//! the terminal error carries the full attempt history. Attempts are issued
//! back to back with no backoff, which is only safe while the caller holds the
//! per-account lock.

use crate::error::AttemptFailure;
use std::fmt::Display;
use std::future::Future;

/// Runs `attempt` until it succeeds or `max_attempts` attempts have failed.
///
/// The closure receives the 1-based attempt number.
pub async fn retry_bounded<T, E, F, Fut>(
    max_attempts: usize,
    mut attempt: F,
) -> Result<T, Vec<AttemptFailure>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut failures = Vec::with_capacity(max_attempts);
    for n in 1..=max_attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("attempt {}/{} failed: {}", n, max_attempts, e);
                failures.push(AttemptFailure {
                    attempt: n,
                    reason: e.to_string(),
                });
            }
        }
    }
    Err(failures)
}
