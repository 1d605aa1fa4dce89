// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry loop with exponential backoff.
//!
//! Wraps a long-running operation that should be restarted whenever it
//! fails: failures are logged and retried with growing delays, and a run
//! that stayed healthy for a while resets the delay curve. The loop only
//! ends through the cancellation token.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Factor applied per consecutive failure.
    pub multiplier: f64,
    /// Ceiling on the delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32);
        self.max.min(Duration::from_secs_f64(scaled))
    }
}

/// Run the futures produced by `op` forever, restarting with backoff on
/// every failure.
///
/// `op` is called once per attempt and must return a self-contained
/// future; state that survives attempts belongs in the closure's captures,
/// cloned into each future. Keeping the future free of borrows from `op`
/// is what lets callers `tokio::spawn` a loop like this one.
///
/// An attempt that ran for at least the maximum backoff delay before
/// failing counts as having been healthy, and the next retry starts back
/// at the initial delay. Returns when `token` is cancelled, whether an
/// attempt is mid-flight or the loop is sleeping between retries.
pub async fn retry_with_backoff<E, F, Fut>(token: &CancellationToken, backoff: Backoff, mut op: F)
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut attempt: u32 = 0;
    loop {
        // op() runs closure code before the select polls anything, so an
        // already-cancelled token must short-circuit here
        if token.is_cancelled() {
            return;
        }
        let started = tokio::time::Instant::now();
        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = op() => result,
        };

        match result {
            Ok(()) => return,
            Err(e) => {
                if started.elapsed() >= backoff.max {
                    attempt = 0;
                }
                let delay = backoff.delay(attempt);
                attempt = attempt.saturating_add(1);
                warn!(error = %e, delay_ms = delay.as_millis() as u64, "operation failed, retrying");
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
