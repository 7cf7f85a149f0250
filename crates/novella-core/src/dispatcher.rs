//! Concurrent unit dispatch
//!
//! Runs one generation call per unit, at most `parallelism` at a time, each
//! bounded by the per-call timeout and retried with exponential backoff on
//! transient failures. Results come back in unit order.

use crate::config::RetryConfig;
use crate::error::GenerationError;
use crate::generator::{GenerationOutput, GenerationRequest, Generator};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Final result of one unit after retries
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub scene_index: usize,
    pub result: Result<GenerationOutput, GenerationError>,
    /// Calls made, including the first
    pub calls: u32,
}

/// Bounded, retrying fan-out over a generator
#[derive(Clone)]
pub struct Dispatcher {
    generator: Arc<dyn Generator>,
    parallelism: usize,
    call_timeout: Duration,
    retry: RetryConfig,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("parallelism", &self.parallelism)
            .field("call_timeout", &self.call_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create dispatcher
    #[must_use]
    pub fn new(
        generator: Arc<dyn Generator>,
        parallelism: usize,
        call_timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            generator,
            parallelism: parallelism.max(1),
            call_timeout,
            retry,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// No new calls start once `token` is cancelled
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// No new calls start after `deadline`
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether new calls are still allowed
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && self.deadline.map_or(true, |d| Instant::now() < d)
    }

    /// Generate every request; outcomes ordered by scene index
    pub async fn dispatch(&self, requests: Vec<GenerationRequest>) -> Vec<UnitOutcome> {
        let mut outcomes: Vec<UnitOutcome> = stream::iter(requests)
            .map(|request| self.generate_with_retry(request))
            .buffer_unordered(self.parallelism)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.scene_index);
        outcomes
    }

    async fn generate_with_retry(&self, request: GenerationRequest) -> UnitOutcome {
        let scene_index = request.unit.index;
        let mut calls = 0;

        loop {
            if !self.is_open() {
                return UnitOutcome {
                    scene_index,
                    result: Err(GenerationError::Cancelled),
                    calls,
                };
            }

            calls += 1;
            let result = match tokio::time::timeout(
                self.call_timeout,
                self.generator.generate(request.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(self.call_timeout)),
            };

            match result {
                Ok(output) => {
                    if calls > 1 {
                        tracing::info!(scene_index, calls, "Generation succeeded after retry");
                    }
                    return UnitOutcome {
                        scene_index,
                        result: Ok(output),
                        calls,
                    };
                }
                Err(e) if e.is_retryable() && calls <= self.retry.max_retries => {
                    let delay = self.retry.delay(calls);
                    tracing::warn!(
                        scene_index,
                        attempt = calls,
                        max_retries = self.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Generation failed, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.cancel.cancelled() => {}
                    }
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(scene_index, calls, error = %e, "Generation retries exhausted");
                    } else {
                        tracing::error!(scene_index, error = %e, "Generation failed with non-retryable error");
                    }
                    return UnitOutcome {
                        scene_index,
                        result: Err(e),
                        calls,
                    };
                }
            }
        }
    }
}
