//! Process-wide token-bucket rate limiter. Every cloud
//! call passes through `RateLimiter::global().wait(cancel)` first. Modeled
//! as the one sanctioned global, `OnceLock`-backed the same way `oxid`
//! treats its registry client as a per-process singleton.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{DriftError, ErrorCode};

static GLOBAL: OnceLock<RateLimiter> = OnceLock::new();

/// A token bucket refilled to `permits_per_second` once a second by a
/// detached background task spawned at `init` time.
pub struct RateLimiter {
    semaphore: Semaphore,
    permits_per_second: usize,
    waits: AtomicU64,
}

impl RateLimiter {
    /// Initialize the global rate limiter exactly once and spawn its
    /// refill task. `requests_per_second` is clamped to `[1, 100]`.
    /// Subsequent calls are no-ops (idempotent) — the closure only runs
    /// (and only one refill task is ever spawned) on the first call.
    pub fn init(requests_per_second: u32) {
        let clamped = requests_per_second.clamp(1, 100) as usize;
        let first_init = GLOBAL.get().is_none();
        let limiter = GLOBAL.get_or_init(|| RateLimiter {
            semaphore: Semaphore::new(clamped),
            permits_per_second: clamped,
            waits: AtomicU64::new(0),
        });

        if first_init {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                loop {
                    interval.tick().await;
                    let deficit = limiter.permits_per_second.saturating_sub(limiter.semaphore.available_permits());
                    if deficit > 0 {
                        limiter.semaphore.add_permits(deficit);
                    }
                }
            });
        }
    }

    /// Access the global limiter. Using it before `init` is a programmer
    /// error — callers (the CLI) must call `init` at startup.
    pub fn global() -> Result<&'static RateLimiter, DriftError> {
        GLOBAL.get().ok_or_else(|| {
            DriftError::new(ErrorCode::Internal, "rate limiter used before RateLimiter::init")
        })
    }

    /// Await a token, respecting cancellation.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), DriftError> {
        self.waits.fetch_add(1, Ordering::Relaxed);
        if cancel.is_cancelled() {
            return Err(DriftError::new(ErrorCode::Timeout, "rate limiter wait cancelled"));
        }
        tokio::select! {
            permit = self.semaphore.acquire() => {
                match permit {
                    Ok(permit) => {
                        permit.forget();
                        Ok(())
                    }
                    Err(_) => Err(DriftError::new(ErrorCode::Internal, "rate limiter semaphore closed")),
                }
            }
            _ = cancel.cancelled() => Err(DriftError::new(ErrorCode::Timeout, "rate limiter wait cancelled")),
        }
    }

    #[cfg(test)]
    pub(crate) fn wait_count(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

/// Await a token from the process-wide limiter. Convenience wrapper used
/// by every handler sub-fetch.
pub async fn throttle(cancel: &CancellationToken) -> Result<(), DriftError> {
    RateLimiter::global()?.wait(cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_succeeds_once_initialized() {
        RateLimiter::init(20);
        let cancel = CancellationToken::new();
        let before = RateLimiter::global().unwrap().wait_count();
        RateLimiter::global().unwrap().wait(&cancel).await.unwrap();
        assert_eq!(RateLimiter::global().unwrap().wait_count(), before + 1);
    }

    #[tokio::test]
    async fn cancellation_returns_timeout_error() {
        RateLimiter::init(1);
        let limiter = RateLimiter::global().unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        // A cancelled token always loses the `select!` race immediately,
        // regardless of whether a permit happens to be available.
        let err = limiter.wait(&cancelled).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }
}
