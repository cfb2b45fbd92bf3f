//! Expand-then-apply with bounded retries for transient expansion failures.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ConvergeError;
use crate::poll::{millis, Schedule, Tick};
use crate::policy::PollPolicy;

/// Retries the expansion half of a submission.
///
/// Only errors for which [`ConvergeError::is_transient`] holds are retried,
/// and only while expanding. A failed apply is returned on the spot: a
/// manifest the control plane rejects will not become valid by waiting.
#[derive(Debug, Clone)]
pub struct Submitter {
    policy: PollPolicy,
    cancel: Option<CancellationToken>,
}

impl Submitter {
    #[must_use]
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Abort retries when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `expand` until it succeeds, then hand the document to `apply`.
    ///
    /// # Errors
    ///
    /// - the last transient expansion error once the retry window closes
    /// - any non-transient expansion error, immediately
    /// - whatever `apply` returns, immediately
    /// - [`ConvergeError::Cancelled`] if the cancellation token fires
    pub async fn submit<D, R, E, EFut, A, AFut>(
        &self,
        mut expand: E,
        apply: A,
    ) -> Result<R, ConvergeError>
    where
        E: FnMut() -> EFut,
        EFut: Future<Output = Result<D, ConvergeError>>,
        A: FnOnce(D) -> AFut,
        AFut: Future<Output = Result<R, ConvergeError>>,
    {
        let schedule = Schedule::start(self.policy, self.cancel.as_ref());
        let mut attempt: u32 = 0;

        let document = loop {
            if schedule.is_cancelled() {
                return Err(ConvergeError::Cancelled("submission".to_string()));
            }

            attempt += 1;
            match expand().await {
                Ok(document) => break document,
                Err(err) if err.is_transient() => {
                    warn!(attempt, error = %err, "Expansion failed, will retry");
                    match schedule.next().await {
                        Tick::Retry => {}
                        Tick::Expired => {
                            debug!(
                                attempt,
                                elapsed_ms = millis(schedule.elapsed()),
                                "Expansion retries exhausted"
                            );
                            return Err(err);
                        }
                        Tick::Cancelled => {
                            return Err(ConvergeError::Cancelled("submission".to_string()));
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        };

        debug!(attempt, "Expanded manifest, applying");
        apply(document).await
    }
}
