//! Control-plane command boundary.
//!
//! Every observation and mutation the crate performs goes through a
//! [`CommandRunner`]. The production implementation shells out to the
//! cluster CLI ([`KubectlRunner`]); tests use [`crate::fake::FakeRunner`].

pub mod kubectl;

pub use kubectl::KubectlRunner;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Operations understood by the control-plane CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Apply,
    Patch,
    Delete,
    /// Template expansion (`oc process`).
    Process,
    Logs,
    Scale,
}

impl Verb {
    /// CLI spelling of the verb.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Apply => "apply",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Process => "process",
            Self::Logs => "logs",
            Self::Scale => "scale",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity a command runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    /// Cluster administrator.
    #[default]
    Admin,
    /// Unprivileged test user.
    User,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A single control-plane operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub verb: Verb,
    pub identity: Identity,
    /// Namespace scope; `None` runs without a namespace flag.
    pub namespace: Option<String>,
    pub args: Vec<String>,
}

impl Invocation {
    /// Create an invocation with no namespace and no arguments.
    #[must_use]
    pub fn new(verb: Verb, identity: Identity) -> Self {
        Self {
            verb,
            identity,
            namespace: None,
            args: Vec::new(),
        }
    }

    /// Scope the invocation to a namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: Option<impl Into<String>>) -> Self {
        self.namespace = namespace.map(Into::into);
        self
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full CLI argument vector: verb, namespace flag, then arguments.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.verb.as_str().to_string()];
        if let Some(ns) = &self.namespace {
            argv.push("-n".to_string());
            argv.push(ns.clone());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Coarse classification of a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The addressed object does not exist.
    NotFound,
    /// The resource type is not registered.
    UnknownKind,
    /// Expected to succeed if retried shortly after.
    Transient,
    /// The control plane refused a well-formed request.
    Rejected,
    /// Anything we cannot put in a bucket above.
    Other,
}

const UNKNOWN_KIND_MARKERS: &[&str] = &[
    "the server doesn't have a resource type",
    "no matches for kind",
    "could not find the requested resource",
];

/// Only the server's status reason counts. A bare "not found" also shows up
/// in kubeconfig errors and in webhook failures naming a missing service.
const NOT_FOUND_MARKERS: &[&str] = &["Error from server (NotFound)"];

const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset by peer",
    "i/o timeout",
    "TLS handshake timeout",
    "(ServiceUnavailable)",
    "(TooManyRequests)",
    "(Timeout)",
    "(InternalError)",
    "etcdserver: request timed out",
    "the object has been modified",
    "is waiting to start",
    "ContainerCreating",
    "unable to upgrade connection",
];

const REJECTED_MARKERS: &[&str] = &[
    "(Invalid)",
    "is invalid",
    "(Forbidden)",
    "(BadRequest)",
    "(AlreadyExists)",
    "admission webhook",
    "error validating",
    "unknown field",
];

impl FailureClass {
    /// Classify CLI stderr.
    ///
    /// First match wins: unknown kind, not found, transient, rejected. A
    /// container still starting is reported as `(BadRequest)` and must stay
    /// transient.
    #[must_use]
    pub fn classify(stderr: &str) -> Self {
        let has = |markers: &[&str]| markers.iter().any(|m| stderr.contains(m));

        if has(UNKNOWN_KIND_MARKERS) {
            Self::UnknownKind
        } else if has(NOT_FOUND_MARKERS) {
            Self::NotFound
        } else if has(TRANSIENT_MARKERS) {
            Self::Transient
        } else if has(REJECTED_MARKERS) {
            Self::Rejected
        } else {
            Self::Other
        }
    }
}

/// A failed control-plane command.
#[derive(Debug, Clone, Error)]
#[error("`{command}` failed: {message}")]
pub struct CommandError {
    command: String,
    exit_code: Option<i32>,
    message: String,
    class: FailureClass,
}

impl CommandError {
    /// Build an error from a non-zero exit, classifying stderr.
    #[must_use]
    pub fn failed(invocation: &Invocation, exit_code: Option<i32>, stderr: &str) -> Self {
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            exit_code.map_or_else(
                || "terminated by signal".to_string(),
                |code| format!("exit status {code}"),
            )
        } else {
            stderr.to_string()
        };
        Self {
            command: invocation.to_string(),
            exit_code,
            class: FailureClass::classify(stderr),
            message,
        }
    }

    /// Build an error with an explicit class (used by fakes and spawn failures).
    #[must_use]
    pub fn with_class(invocation: &Invocation, class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            command: invocation.to_string(),
            exit_code: None,
            message: message.into(),
            class,
        }
    }

    #[must_use]
    pub fn class(&self) -> FailureClass {
        self.class
    }

    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Executes control-plane operations.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one operation and return its stdout.
    async fn run(&self, invocation: &Invocation) -> Result<String, CommandError>;
}
