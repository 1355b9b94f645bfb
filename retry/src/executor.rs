//! Retry loop.
//!
//! Attempts are strictly sequential: attempt N+1 starts only after attempt N
//! has failed, been normalized and classified, and its delay has elapsed.
//! Every call owns its attempt counter and schedule; the shared
//! [`RetryConfig`] is read-only.

use std::future::Future;
use std::sync::Arc;

use gws_api_errors::{ApiFailure, NormalizedError, RetrySummary, TerminalState};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::next_delay;
use crate::eligibility::evaluate;
use crate::observer::{AttemptRecord, Decision, RetryObserver, TracingObserver};
use crate::policy::RetryConfig;

/// Status reported when the deadline expires before any attempt failed.
const DEADLINE_STATUS: u16 = 504;

/// Status reported when the caller cancels before any attempt failed.
const CANCELLED_STATUS: u16 = 499;

/// Wraps remote operations with bounded, jittered retries.
#[derive(Clone)]
pub struct RetryExecutor {
    config: Arc<RetryConfig>,
    observer: Arc<dyn RetryObserver>,
}

impl RetryExecutor {
    pub fn new(config: Arc<RetryConfig>) -> Self {
        Self {
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails ineligibly, or runs out of
    /// attempts. `max_elapsed_ms`, when configured, bounds the whole call.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, NormalizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ApiFailure,
    {
        self.run(operation, None, None).await
    }

    /// Like [`execute`](Self::execute), bounded by an overall deadline.
    pub async fn execute_with_deadline<F, Fut, T, E>(
        &self,
        operation: F,
        deadline: Instant,
    ) -> Result<T, NormalizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ApiFailure,
    {
        self.run(operation, None, Some(deadline)).await
    }

    /// Like [`execute`](Self::execute), abandoning the loop when `cancel`
    /// fires, including mid-attempt and mid-sleep.
    pub async fn execute_cancellable<F, Fut, T, E>(
        &self,
        operation: F,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<T, NormalizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ApiFailure,
    {
        self.run(operation, Some(cancel), deadline).await
    }

    async fn run<F, Fut, T, E>(
        &self,
        mut operation: F,
        cancel: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<T, NormalizedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ApiFailure,
    {
        let config = self.config.as_ref();
        let start = Instant::now();
        let deadline = earliest(deadline, config.max_elapsed().map(|budget| start + budget));
        let mut last_error: Option<NormalizedError> = None;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(abandon(last_error, attempt, start, TerminalState::Cancelled));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(abandon(
                    last_error,
                    attempt,
                    start,
                    TerminalState::DeadlineExceeded,
                ));
            }

            attempt = attempt.saturating_add(1);
            let failure = match race(operation(), cancel, deadline).await {
                Raced::Completed(Ok(value)) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Raced::Completed(Err(failure)) => failure,
                Raced::Cancelled => {
                    return Err(abandon(last_error, attempt, start, TerminalState::Cancelled));
                }
                Raced::DeadlineExpired => {
                    return Err(abandon(
                        last_error,
                        attempt,
                        start,
                        TerminalState::DeadlineExceeded,
                    ));
                }
            };

            let error = failure.normalized();
            let eligibility = evaluate(config, &error, failure.self_reported_retryable());
            let elapsed = start.elapsed();

            let decision = if !eligibility.is_eligible() {
                Decision::GiveUp(TerminalState::Rejected)
            } else if attempt >= config.max_attempts() {
                Decision::GiveUp(TerminalState::Exhausted)
            } else {
                let (delay, source) = next_delay(config, attempt, error.retry_after());
                if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                    Decision::GiveUp(TerminalState::DeadlineExceeded)
                } else {
                    Decision::Retry { delay, source }
                }
            };

            self.observer.on_attempt(&AttemptRecord {
                attempt,
                max_attempts: config.max_attempts(),
                elapsed,
                http_status: error.http_status,
                error_kind: error.kind(),
                eligibility,
                decision,
            });

            let delay = match decision {
                Decision::GiveUp(terminal) => {
                    return Err(error.with_retry_summary(summary(attempt, start, terminal)));
                }
                Decision::Retry { delay, .. } => delay,
            };

            last_error = Some(error);
            if let Raced::Cancelled = race(tokio::time::sleep(delay), cancel, None).await {
                return Err(abandon(last_error, attempt, start, TerminalState::Cancelled));
            }
        }
    }
}

/// Runs `operation` once per attempt under `config`, reporting through
/// `tracing`.
pub async fn execute_with_backoff<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
) -> Result<T, NormalizedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ApiFailure,
{
    RetryExecutor::new(Arc::new(config.clone()))
        .execute(operation)
        .await
}

enum Raced<T> {
    Completed(T),
    Cancelled,
    DeadlineExpired,
}

async fn race<Fut: Future>(
    future: Fut,
    cancel: Option<&CancellationToken>,
    deadline: Option<Instant>,
) -> Raced<Fut::Output> {
    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancelled => Raced::Cancelled,
        _ = expired => Raced::DeadlineExpired,
        output = future => Raced::Completed(output),
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn summary(attempts: u32, start: Instant, terminal: TerminalState) -> RetrySummary {
    RetrySummary {
        attempts,
        elapsed_ms: start.elapsed().as_millis() as u64,
        terminal,
    }
}

/// Returns the most recent failure, or a synthesized one when the loop was
/// abandoned before any attempt failed.
fn abandon(
    last_error: Option<NormalizedError>,
    attempts: u32,
    start: Instant,
    terminal: TerminalState,
) -> NormalizedError {
    tracing::warn!(attempts, terminal = %terminal, "retry loop abandoned");
    let error = last_error.unwrap_or_else(|| match terminal {
        TerminalState::Cancelled => {
            NormalizedError::synthesized(CANCELLED_STATUS, "operation cancelled")
        }
        _ => NormalizedError::synthesized(
            DEADLINE_STATUS,
            "deadline exceeded before the operation completed",
        ),
    });
    error.with_retry_summary(summary(attempts, start, terminal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(max_attempts: u32) -> Arc<RetryConfig> {
        Arc::new(
            RetryConfig::builder()
                .max_attempts(max_attempts)
                .initial_delay_ms(100)
                .max_delay_ms(1_000)
                .backoff_multiplier(2.0)
                .jitter_factor(0.0)
                .build()
                .expect("valid config"),
        )
    }

    fn recording(executor: RetryExecutor) -> (RetryExecutor, Arc<Mutex<Vec<AttemptRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();
        let executor = executor.with_observer(Arc::new(move |record: &AttemptRecord| {
            sink.lock().unwrap().push(record.clone());
        }));
        (executor, records)
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let calls = AtomicUsize::new(0);
        let executor = RetryExecutor::new(config(3));

        let result = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Value>(42) }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let calls = AtomicUsize::new(0);
        let (executor, records) = recording(RetryExecutor::new(config(5)));

        let result = executor
            .execute(|| {
                let current = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if current < 3 {
                        Err(json!({ "response": { "status": 503 } }))
                    } else {
                        Ok(current)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        let delays: Vec<_> = records
            .lock()
            .unwrap()
            .iter()
            .filter_map(AttemptRecord::delay)
            .collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_failure_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let (executor, records) = recording(RetryExecutor::new(config(5)));

        let err = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(json!({ "response": { "status": 404 } })) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.http_status, 404);
        let summary = err.retry.expect("summary attached");
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.terminal, TerminalState::Rejected);
        assert_eq!(
            records.lock().unwrap()[0].decision,
            Decision::GiveUp(TerminalState::Rejected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retriable_status_overrides_non_retryable_claim() {
        let calls = AtomicUsize::new(0);
        let executor = RetryExecutor::new(config(2));

        let err = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(json!({ "code": 502, "retryable": false })) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            err.retry.map(|s| s.terminal),
            Some(TerminalState::Exhausted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn self_reported_retryable_outside_codes() {
        let calls = AtomicUsize::new(0);
        let executor = RetryExecutor::new(config(3));

        let _ = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(json!({ "code": 409, "retryable": true })) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_is_honored_and_capped() {
        let (executor, records) = recording(RetryExecutor::new(config(3)));

        let _ = executor
            .execute(|| async {
                Err::<(), _>(json!({
                    "response": { "status": 429, "headers": { "retry-after": "30" } }
                }))
            })
            .await;

        let records = records.lock().unwrap();
        assert_eq!(
            records[0].decision,
            Decision::Retry {
                delay: Duration::from_millis(1_000),
                source: crate::backoff::DelaySource::RetryAfter,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_new_attempts() {
        let calls = AtomicUsize::new(0);
        let executor = RetryExecutor::new(config(10));
        let deadline = Instant::now() + Duration::from_millis(250);

        let err = executor
            .execute_with_deadline(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(json!({ "response": { "status": 500 } })) }
                },
                deadline,
            )
            .await
            .unwrap_err();

        // 0ms fail, sleep 100, 100ms fail, next sleep of 200 would cross 250ms.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.http_status, 500);
        assert_eq!(
            err.retry.map(|s| s.terminal),
            Some(TerminalState::DeadlineExceeded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_slow_first_attempt() {
        let executor = RetryExecutor::new(config(3));
        let deadline = Instant::now() + Duration::from_millis(50);

        let err = executor
            .execute_with_deadline(
                || async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, Value>(())
                },
                deadline,
            )
            .await
            .unwrap_err();

        assert_eq!(err.http_status, DEADLINE_STATUS);
        let summary = err.retry.expect("summary attached");
        assert_eq!(summary.terminal, TerminalState::DeadlineExceeded);
        assert_eq!(summary.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn max_elapsed_budget_applies_without_caller_deadline() {
        let calls = AtomicUsize::new(0);
        let config = Arc::new(
            RetryConfig::builder()
                .max_attempts(100)
                .initial_delay_ms(50)
                .max_delay_ms(100)
                .backoff_multiplier(1.5)
                .jitter_factor(0.0)
                .max_elapsed_ms(Some(100))
                .build()
                .expect("valid config"),
        );

        let err = RetryExecutor::new(config)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(json!({ "response": { "status": 503 } })) }
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.retry.map(|s| s.terminal),
            Some(TerminalState::DeadlineExceeded)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellable_aborted() {
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = RetryExecutor::new(config(3))
            .execute_cancellable(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, Value>(42) }
                },
                &cancel,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(err.http_status, CANCELLED_STATUS);
        assert_eq!(
            err.retry.map(|s| s.terminal),
            Some(TerminalState::Cancelled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_sleep_returns_last_error() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let executor = RetryExecutor::new(config(5)).with_observer(Arc::new(
            move |record: &AttemptRecord| {
                if record.attempt == 2 {
                    trigger.cancel();
                }
            },
        ));

        let err = executor
            .execute_cancellable(
                || async { Err::<(), _>(json!({ "response": { "status": 502 } })) },
                &cancel,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.http_status, 502);
        let summary = err.retry.expect("summary attached");
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.terminal, TerminalState::Cancelled);
    }
}
