use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deferred::Deferred;
use crate::error::ReconcileError;

/// How often and how long a predicate is observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed delay between two observations.
    pub delay: Duration,
    /// `None` keeps observing until the predicate settles.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(15),
            max_attempts: Some(240),
        }
    }
}

/// Repeats an observation until it succeeds, fails fatally, runs out of
/// attempts or is cancelled.
///
/// Retryable errors (see [`ReconcileError::is_retryable`]) are swallowed and
/// observed again after `delay`; anything else ends the loop.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Every loop started by this poller stops once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn wait_for<'a, T, F, Fut>(
        &self,
        label: impl Into<String>,
        mut predicate: F,
    ) -> Deferred<'a, T>
    where
        T: Send + 'a,
        F: FnMut() -> Fut + Send + 'a,
        Fut: Future<Output = crate::Result<T>> + Send + 'a,
    {
        let policy = self.policy.clone();
        let cancel = self.cancel.clone();
        let label = label.into();

        Box::pin(async move {
            let mut attempt: u32 = 0;
            loop {
                if cancel.is_cancelled() {
                    return Err(ReconcileError::Cancelled(label));
                }
                attempt += 1;

                match predicate().await {
                    Ok(value) => {
                        info!(%label, attempt, "converged");
                        return Ok(value);
                    }
                    Err(err) if err.is_retryable() => {
                        debug!(%label, attempt, error = %err, "not converged yet");
                    }
                    Err(err) => {
                        warn!(%label, attempt, error = %err, "polling stopped");
                        return Err(err);
                    }
                }

                if let Some(max) = policy.max_attempts {
                    if attempt >= max {
                        warn!(%label, attempt, "attempts exhausted");
                        return Err(ReconcileError::PollingTimeout {
                            label,
                            attempts: attempt,
                        });
                    }
                }

                tokio::select! {
                    () = cancel.cancelled() => return Err(ReconcileError::Cancelled(label)),
                    () = tokio::time::sleep(policy.delay) => {}
                }
            }
        })
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(PollPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn poller(max_attempts: Option<u32>) -> Poller {
        Poller::new(PollPolicy {
            delay: Duration::from_secs(15),
            max_attempts,
        })
    }

    /// Predicate that stays unconverged for the first `pending` calls.
    fn settles_after(
        pending: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> futures_util::future::Ready<crate::Result<u32>> + Send {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > pending {
                futures_util::future::ready(Ok(n))
            } else {
                futures_util::future::ready(Err(ReconcileError::NotConverged(format!(
                    "call {n}"
                ))))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_converged_with_fixed_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = poller(Some(10))
            .wait_for("service", settles_after(2, calls.clone()))
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = poller(None)
            .wait_for("service", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                futures_util::future::ready(Err::<(), _>(ReconcileError::Polling(
                    "no services".into(),
                )))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Polling(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = poller(Some(5))
            .wait_for("service", move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                futures_util::future::ready(if n == 0 {
                    Err(ReconcileError::Backend {
                        operation: "describe_services".into(),
                        message: "throttled".into(),
                    })
                } else {
                    Ok("ready")
                })
            })
            .await
            .unwrap();

        assert_eq!(value, "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));

        let err = poller(Some(3))
            .wait_for("drain", settles_after(u32::MAX, calls.clone()))
            .await
            .unwrap_err();

        match err {
            ReconcileError::PollingTimeout { label, attempts } => {
                assert_eq!(label, "drain");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_policy_keeps_polling() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = poller(None)
            .wait_for("service", settles_after(500, calls.clone()))
            .await
            .unwrap();

        assert_eq!(result, 501);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_delay() {
        let cancel = CancellationToken::new();
        let poller = poller(None).with_cancellation(cancel.clone());
        let calls = Arc::new(AtomicU32::new(0));

        let handle = tokio::spawn(
            poller.wait_for("service", settles_after(u32::MAX, calls.clone())),
        );

        tokio::time::sleep(Duration::from_secs(40)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ReconcileError::Cancelled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
