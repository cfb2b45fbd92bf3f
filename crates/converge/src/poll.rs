//! Bounded polling against eventually-consistent cluster state.
//!
//! A [`Poller`] evaluates a predicate immediately, then again every
//! `interval` until it converges, fails fatally, or the `timeout` budget is
//! spent. The final sleep is clipped so the last evaluation lands on the
//! deadline, which keeps a timed-out wait within one interval of `timeout`.
//!
//! ```no_run
//! use converge::{Convergence, Poller, PollPolicy};
//!
//! # async fn example() {
//! let outcome = Poller::new(PollPolicy::from_secs(1, 5))
//!     .wait_for("answer", || async { Convergence::Converged(42) })
//!     .await;
//! assert!(outcome.is_success());
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::ConvergeError;
use crate::policy::PollPolicy;

/// Lower bound on the pause between evaluations.
const MIN_PAUSE: Duration = Duration::from_millis(10);

/// Result of one predicate evaluation.
#[derive(Debug)]
pub enum Convergence<T> {
    /// Target state reached.
    Converged(T),
    /// Not there yet; carries what was observed for diagnostics.
    NotYet(String),
    /// Polling can never succeed.
    Fatal(ConvergeError),
}

/// Result of a whole wait.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    /// Deadline reached without convergence.
    TimedOut {
        elapsed: Duration,
        /// Most recent `NotYet` observation.
        last_observation: Option<String>,
    },
    Fatal(ConvergeError),
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Transform the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::TimedOut {
                elapsed,
                last_observation,
            } => Outcome::TimedOut {
                elapsed,
                last_observation,
            },
            Self::Fatal(err) => Outcome::Fatal(err),
        }
    }

    /// Convert into a `Result`, describing timeouts with `what`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergeError::Timeout`] for a timed-out wait, or the fatal
    /// cause.
    pub fn into_result(self, what: &str) -> Result<T, ConvergeError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::TimedOut {
                elapsed,
                last_observation,
            } => Err(ConvergeError::Timeout {
                what: what.to_string(),
                elapsed,
                last_observation: last_observation.unwrap_or_else(|| "none".to_string()),
            }),
            Self::Fatal(err) => Err(err),
        }
    }
}

/// What happened while waiting for the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Retry,
    Expired,
    Cancelled,
}

/// Deadline bookkeeping shared by [`Poller`] and [`crate::Submitter`].
#[derive(Debug)]
pub(crate) struct Schedule<'a> {
    started: Instant,
    policy: PollPolicy,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> Schedule<'a> {
    pub(crate) fn start(policy: PollPolicy, cancel: Option<&'a CancellationToken>) -> Self {
        Self {
            started: Instant::now(),
            policy,
            cancel,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::is_cancelled)
    }

    /// Sleep until the next attempt is due.
    pub(crate) async fn next(&self) -> Tick {
        let elapsed = self.elapsed();
        if elapsed >= self.policy.timeout {
            return Tick::Expired;
        }
        let pause = self
            .policy
            .interval
            .max(MIN_PAUSE)
            .min(self.policy.timeout - elapsed);

        match self.cancel {
            Some(token) => tokio::select! {
                () = sleep(pause) => Tick::Retry,
                () = token.cancelled() => Tick::Cancelled,
            },
            None => {
                sleep(pause).await;
                Tick::Retry
            }
        }
    }
}

/// Drives a [`Convergence`] predicate under a [`PollPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Poller {
    policy: PollPolicy,
    cancel: Option<CancellationToken>,
}

impl Poller {
    #[must_use]
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Abort waits when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Evaluate `predicate` until it converges, fails, or time runs out.
    ///
    /// `what` names the awaited condition in logs and cancellation errors.
    /// Every evaluation is a fresh call; nothing is cached between polls.
    pub async fn wait_for<T, F, Fut>(&self, what: &str, mut predicate: F) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Convergence<T>>,
    {
        let schedule = Schedule::start(self.policy, self.cancel.as_ref());
        let mut attempt: u32 = 0;

        loop {
            if schedule.is_cancelled() {
                return Outcome::Fatal(ConvergeError::Cancelled(what.to_string()));
            }

            attempt += 1;
            let observation = match predicate().await {
                Convergence::Converged(value) => {
                    debug!(what, attempt, elapsed_ms = millis(schedule.elapsed()), "Converged");
                    return Outcome::Success(value);
                }
                Convergence::Fatal(err) => {
                    debug!(what, attempt, error = %err, "Convergence failed");
                    return Outcome::Fatal(err);
                }
                Convergence::NotYet(observation) => observation,
            };
            trace!(what, attempt, observation = %observation, "Not converged yet");

            match schedule.next().await {
                Tick::Retry => {}
                Tick::Expired => {
                    let elapsed = schedule.elapsed();
                    debug!(what, attempt, elapsed_ms = millis(elapsed), "Timed out");
                    return Outcome::TimedOut {
                        elapsed,
                        last_observation: Some(observation),
                    };
                }
                Tick::Cancelled => {
                    return Outcome::Fatal(ConvergeError::Cancelled(what.to_string()));
                }
            }
        }
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_immediate_convergence_does_not_sleep() {
        let started = Instant::now();
        let calls = Cell::new(0);

        let outcome = Poller::new(PollPolicy::from_secs(5, 60))
            .wait_for("ready", || {
                calls.set(calls.get() + 1);
                async { Convergence::Converged("done") }
            })
            .await;

        assert!(matches!(outcome, Outcome::Success("done")));
        assert_eq!(calls.get(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_overshoot_is_bounded() {
        for (interval, timeout) in [(1, 5), (2, 5), (3, 10), (7, 7), (10, 3)] {
            let policy = PollPolicy::from_secs(interval, timeout);
            let started = Instant::now();
            let calls = Cell::new(0u32);

            let outcome = Poller::new(policy)
                .wait_for("never", || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move { Convergence::<()>::NotYet(format!("attempt {n}")) }
                })
                .await;

            let elapsed = started.elapsed();
            assert!(elapsed >= policy.timeout, "{elapsed:?} < {policy:?}");
            assert!(elapsed < policy.timeout + policy.interval, "{elapsed:?} vs {policy:?}");
            match outcome {
                Outcome::TimedOut {
                    last_observation, ..
                } => assert_eq!(last_observation, Some(format!("attempt {}", calls.get()))),
                other => panic!("expected timeout, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_stops_polling() {
        let calls = Cell::new(0);
        let outcome = Poller::new(PollPolicy::from_secs(1, 60))
            .wait_for("kind", || {
                calls.set(calls.get() + 1);
                async { Convergence::<()>::Fatal(ConvergeError::UnknownKind("widget".into())) }
            })
            .await;

        assert!(matches!(outcome, Outcome::Fatal(ConvergeError::UnknownKind(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_after_a_few_polls() {
        let started = Instant::now();
        let calls = Cell::new(0);

        let outcome = Poller::new(PollPolicy::from_secs(2, 30))
            .wait_for("third time", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Convergence::NotYet(format!("{n}"))
                    } else {
                        Convergence::Converged(n)
                    }
                }
            })
            .await;

        assert!(matches!(outcome, Outcome::Success(3)));
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_policy_evaluates_once() {
        let calls = Cell::new(0);
        let outcome = Poller::new(PollPolicy::immediate())
            .wait_for("once", || {
                calls.set(calls.get() + 1);
                async { Convergence::<()>::NotYet("nope".into()) }
            })
            .await;

        match outcome {
            Outcome::TimedOut {
                elapsed,
                last_observation,
            } => {
                assert_eq!(elapsed, Duration::ZERO);
                assert_eq!(last_observation.as_deref(), Some("nope"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome = Poller::new(PollPolicy::from_secs(10, 600))
            .with_cancellation(token)
            .wait_for("stuck", || async { Convergence::<()>::NotYet("pending".into()) })
            .await;

        assert!(matches!(outcome, Outcome::Fatal(ConvergeError::Cancelled(ref w)) if w == "stuck"));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_evaluation() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Cell::new(0);

        let outcome = Poller::new(PollPolicy::resource())
            .with_cancellation(token)
            .wait_for("anything", || {
                calls.set(calls.get() + 1);
                async { Convergence::Converged(()) }
            })
            .await;

        assert!(matches!(outcome, Outcome::Fatal(ConvergeError::Cancelled(_))));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_into_result_reports_last_observation() {
        let outcome: Outcome<()> = Outcome::TimedOut {
            elapsed: Duration::from_secs(15),
            last_observation: Some("readyReplicas=1".into()),
        };
        let err = outcome.into_result("widget/w1 ready").unwrap_err();
        assert!(err.to_string().contains("readyReplicas=1"));

        let outcome: Outcome<u32> = Outcome::Success(2);
        assert_eq!(outcome.map(|n| n * 2).into_result("x").unwrap(), 4);
    }
}
