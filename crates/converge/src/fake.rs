//! Scripted in-memory [`CommandRunner`] for tests.
//!
//! ```
//! use converge::fake::FakeRunner;
//! use converge::runner::Verb;
//!
//! let runner = FakeRunner::new(|inv| match inv.verb {
//!     Verb::Get => Err(FakeRunner::not_found(inv)),
//!     _ => Ok(String::new()),
//! });
//! assert_eq!(runner.calls(), 0);
//! ```

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::runner::{CommandError, CommandRunner, FailureClass, Invocation, Verb};

type Handler = dyn Fn(&Invocation) -> Result<String, CommandError> + Send + Sync;

/// Answers invocations with a closure and records every call.
pub struct FakeRunner {
    handler: Box<Handler>,
    invocations: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    #[must_use]
    pub fn new(
        handler: impl Fn(&Invocation) -> Result<String, CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// A runner that answers every call with `stdout`.
    #[must_use]
    pub fn always(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self::new(move |_| Ok(stdout.clone()))
    }

    /// Not-found failure for `invocation`, worded like the real CLI.
    #[must_use]
    pub fn not_found(invocation: &Invocation) -> CommandError {
        CommandError::failed(
            invocation,
            Some(1),
            &format!(
                "Error from server (NotFound): {} not found",
                invocation.args.join(" ")
            ),
        )
    }

    /// Unknown resource type failure for `invocation`.
    #[must_use]
    pub fn unknown_kind(invocation: &Invocation) -> CommandError {
        let kind = invocation.args.first().cloned().unwrap_or_default();
        CommandError::failed(
            invocation,
            Some(1),
            &format!("error: the server doesn't have a resource type \"{kind}\""),
        )
    }

    /// Failure with an explicit class.
    #[must_use]
    pub fn failure(invocation: &Invocation, class: FailureClass, message: &str) -> CommandError {
        CommandError::with_class(invocation, class, message)
    }

    /// Every invocation seen so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().clone()
    }

    /// Total number of calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.lock().len()
    }

    /// Number of calls with the given verb.
    #[must_use]
    pub fn calls_to(&self, verb: Verb) -> usize {
        self.lock().iter().filter(|inv| inv.verb == verb).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Invocation>> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FakeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRunner")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, CommandError> {
        self.lock().push(invocation.clone());
        (self.handler)(invocation)
    }
}
