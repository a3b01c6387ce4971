//! Bounded poll-with-timeout
//!
//! Every wait on eventual consistency in the pipeline goes through [`poll_until`]:
//! a deployment becoming Available, a provider turning Healthy, a load balancer
//! getting an address. The probe runs immediately and then once per interval, so
//! the number of probe invocations never exceeds [`PollPolicy::max_attempts`].
//!
//! What a timeout *means* is decided by the caller: [`PollOutcome::or_fatal`] for
//! values later stages strictly depend on, [`PollOutcome::or_warn`] otherwise.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::BootstrapError;

/// Interval and upper bound of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Poll every second for at most `timeout_secs`.
    #[must_use]
    pub const fn every_second(timeout_secs: u64) -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(timeout_secs))
    }

    /// Upper bound on probe invocations: one immediate probe plus one per elapsed interval.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let intervals = self.timeout.as_nanos() / self.interval.as_nanos();
        u32::try_from(intervals).unwrap_or(u32::MAX - 1) + 1
    }
}

/// Result of a poll loop.
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    /// The probe reported ready, carrying its value
    Ready(T),
    /// The probe never reported ready within the policy
    TimedOut { attempts: u32, elapsed: Duration },
    /// The probe failed; polling stopped at the first error
    Error(E),
}

impl<T, E> PollOutcome<T, E> {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Treat a timeout as fatal: later stages cannot proceed without the value.
    pub fn or_fatal(self, what: &str) -> Result<T, BootstrapError>
    where
        E: Into<BootstrapError>,
    {
        match self {
            Self::Ready(value) => Ok(value),
            Self::TimedOut { elapsed, .. } => Err(BootstrapError::Timeout {
                what: what.to_string(),
                seconds: elapsed.as_secs(),
            }),
            Self::Error(e) => Err(e.into()),
        }
    }

    /// Treat a timeout as a warning: `Ok(None)` lets the pipeline proceed while the
    /// controller converges in the background.
    pub fn or_warn(self, what: &str) -> Result<Option<T>, BootstrapError>
    where
        E: Into<BootstrapError>,
    {
        match self {
            Self::Ready(value) => Ok(Some(value)),
            Self::TimedOut { attempts, elapsed } => {
                warn!(
                    condition = %what,
                    attempts,
                    elapsed_s = elapsed.as_secs(),
                    "condition not reached in time, continuing"
                );
                Ok(None)
            }
            Self::Error(e) => Err(e.into()),
        }
    }
}

/// Poll `probe` until it yields a value, fails, or the policy is exhausted.
///
/// `probe` returns `Ok(Some(v))` when ready, `Ok(None)` when not yet, `Err` on failure.
/// Probes that treat transient conditions (resource not created yet) as errors should
/// map them to `Ok(None)` themselves.
pub async fn poll_until<T, E, F, Fut>(policy: PollPolicy, what: &str, mut probe: F) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        match probe().await {
            Ok(Some(value)) => {
                debug!(condition = %what, attempt, elapsed_ms = start.elapsed().as_millis() as u64, "condition ready");
                return PollOutcome::Ready(value);
            }
            Ok(None) => {
                debug!(condition = %what, attempt, "condition not ready");
            }
            Err(e) => return PollOutcome::Error(e),
        }

        if attempt < max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    PollOutcome::TimedOut {
        attempts: max_attempts,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ready_after(k: u32, calls: Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<Option<u32>, BootstrapError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(if n >= k { Some(n) } else { None }))
        }
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(PollPolicy::every_second(120).max_attempts(), 121);
        assert_eq!(
            PollPolicy::new(Duration::from_secs(10), Duration::from_secs(25)).max_attempts(),
            3
        );
        assert_eq!(PollPolicy::new(Duration::ZERO, Duration::from_secs(5)).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_k_intervals() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_secs(60));
        let start = Instant::now();

        let outcome = poll_until(policy, "deployment", ready_after(3, calls.clone())).await;

        assert!(matches!(outcome, PollOutcome::Ready(3)));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediately_ready_does_not_sleep() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let outcome = poll_until(PollPolicy::every_second(30), "ip", ready_after(0, calls.clone())).await;
        assert!(outcome.is_ready());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = PollPolicy::new(Duration::from_secs(2), Duration::from_secs(10));
        let outcome = poll_until(policy, "provider", ready_after(u32::MAX, calls.clone())).await;

        match outcome {
            PollOutcome::TimedOut { attempts, elapsed } => {
                assert_eq!(attempts, 6);
                assert_eq!(elapsed, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_stops_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let outcome: PollOutcome<(), BootstrapError> =
            poll_until(PollPolicy::every_second(30), "secret", move || {
                c.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(BootstrapError::parse("kubectl output", "unexpected EOF"))
                }
            })
            .await;

        assert!(matches!(outcome, PollOutcome::Error(BootstrapError::Parse { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_policies() {
        let policy = PollPolicy::every_second(3);
        let never = || async { Ok::<Option<()>, BootstrapError>(None) };

        let fatal = poll_until(policy, "OIDC issuer URL", never).await.or_fatal("OIDC issuer URL");
        assert!(matches!(fatal, Err(BootstrapError::Timeout { seconds: 3, .. })));

        let warned = poll_until(policy, "load balancer IP", never).await.or_warn("load balancer IP");
        assert!(matches!(warned, Ok(None)));
    }

    proptest! {
        #[test]
        fn prop_ready_after_k_invokes_at_most_k_plus_one(k in 0u32..20, interval_s in 1u64..10) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let calls = Arc::new(AtomicU32::new(0));
                let policy = PollPolicy::new(
                    Duration::from_secs(interval_s),
                    Duration::from_secs(interval_s * (u64::from(k) + 5)),
                );
                let start = Instant::now();
                let outcome = poll_until(policy, "prop", ready_after(k, calls.clone())).await;
                prop_assert!(outcome.is_ready());
                prop_assert_eq!(start.elapsed(), Duration::from_secs(interval_s * u64::from(k)));
                prop_assert!(calls.load(Ordering::SeqCst) <= k + 1);
                Ok(())
            })?;
        }
    }
}
