// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry logic for async calls
//!
//! Every external call the keeper makes (HTTP request, JSON-RPC call) goes
//! through [`with_timeout`]: a per-attempt timeout plus a bounded backoff
//! policy. A call either produces a value within its attempt budget or the
//! caller gets the last error back and decides what to drop.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::{probe, Error, Result};

/// Per-attempt timeout applied to every external call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Total attempts for an external call (the first try plus retries).
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;
/// Base interval of the exponential backoff between attempts.
pub const BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Upper cap of the backoff interval.
pub const BACKOFF_CAP: Duration = Duration::from_millis(500);

/// Exponential backoff with a maximum retry count, after which it returns
/// `None` to indicate that we should stop retrying.
#[derive(Debug)]
pub struct ExponentialWithMaxRetryCount {
    inner: ExponentialBackoff,
    max_retry_count: usize,
    count: usize,
}

impl ExponentialWithMaxRetryCount {
    /// Creates a new exponential backoff starting at `interval`, doubling up
    /// to `cap`, with jitter, allowing at most `max_retry_count` retries.
    pub fn new(
        interval: Duration,
        cap: Duration,
        max_retry_count: usize,
    ) -> Self {
        let inner = ExponentialBackoff {
            current_interval: interval,
            initial_interval: interval,
            max_interval: cap,
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_elapsed_time: None,
            ..Default::default()
        };
        Self {
            inner,
            max_retry_count,
            count: 0,
        }
    }
}

impl Default for ExponentialWithMaxRetryCount {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_CAP, DEFAULT_MAX_ATTEMPTS - 1)
    }
}

impl Backoff for ExponentialWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            self.count += 1;
            self.inner.next_backoff().unwrap_or(BACKOFF_CAP)
        })
    }

    fn reset(&mut self) {
        self.count = 0;
        self.inner.reset();
    }
}

/// Runs `op` with a per-attempt `timeout`, retrying per `policy`.
///
/// Returns the first successful value, or the error of the last attempt once
/// the policy stops yielding backoff intervals. An attempt that outlives the
/// timeout is abandoned and counted as a failed attempt with
/// [`Error::Timeout`].
pub async fn with_timeout<T, B, F, Fut>(
    mut policy: B,
    timeout: Duration,
    mut op: F,
) -> Result<T>
where
    B: Backoff,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    loop {
        let error = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout(timeout),
        };
        match policy.next_backoff() {
            Some(delay) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::TRACE,
                    kind = %probe::Kind::Retry,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                );
                tokio::time::sleep(delay).await;
            }
            None => return Err(error),
        }
    }
}

/// Same as [`with_timeout`] with the default policy and timeout.
pub async fn with_defaults<T, F, Fut>(op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_timeout(
        ExponentialWithMaxRetryCount::default(),
        DEFAULT_TIMEOUT,
        op,
    )
    .await
}
