//! Error types for the convergence client.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::runner::{CommandError, FailureClass};

/// Errors surfaced by submissions, queries and waits.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Submission failed for a reason expected to resolve itself.
    #[error("transient submission failure: {0}")]
    TransientSubmission(String),

    /// A query failed for a reason expected to resolve itself.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The control plane rejected a syntactically valid request.
    #[error("control plane rejected the request: {0}")]
    SemanticApply(String),

    /// The addressed object does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The resource kind itself is not registered with the cluster.
    #[error("resource kind {0} is not known to the cluster")]
    UnknownKind(String),

    /// The kind carries no rollout status to wait on.
    #[error("{0} has no rollout status")]
    NoRolloutStatus(String),

    /// A wait never converged within its policy window.
    #[error("timed out after {}s waiting for {what}; last observation: {last_observation}", elapsed.as_secs())]
    Timeout {
        what: String,
        elapsed: Duration,
        last_observation: String,
    },

    /// The caller's cancellation token fired.
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    /// Manifest templating failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Command failed for a reason we could not classify.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Command output could not be interpreted.
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },
}

impl ConvergeError {
    /// Whether a retry shortly after is expected to succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientSubmission(_)
                | Self::Transient(_)
                | Self::Template(TemplateError::ExpansionFailed(_))
        )
    }

    /// Whether the error reports an absent object.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Map a classified command failure onto the error taxonomy.
    ///
    /// `target` names the object or kind the command addressed and ends up in
    /// the not-found / unknown-kind messages.
    #[must_use]
    pub fn from_command(err: CommandError, target: &str) -> Self {
        match err.class() {
            FailureClass::NotFound => Self::NotFound(target.to_string()),
            FailureClass::UnknownKind => Self::UnknownKind(target.to_string()),
            FailureClass::Transient => Self::Transient(err.to_string()),
            FailureClass::Rejected => Self::SemanticApply(err.to_string()),
            FailureClass::Other => Self::Command(err),
        }
    }

    /// [`ConvergeError::from_command`] for a failed `apply` / `create`,
    /// where a transient failure is a transient submission.
    #[must_use]
    pub fn from_submission(err: CommandError, target: &str) -> Self {
        match Self::from_command(err, target) {
            Self::Transient(message) => Self::TransientSubmission(message),
            other => other,
        }
    }

    pub(crate) fn decode(what: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised while expanding a manifest template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template source could not be located.
    #[error("template source {} does not exist", .0.display())]
    SourceNotFound(PathBuf),

    /// The template source exists but could not be read.
    #[error("failed to read template {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A placeholder had no matching parameter.
    #[error("template {} references undefined parameter {placeholder}", path.display())]
    UnresolvedPlaceholder { path: PathBuf, placeholder: String },

    /// The expanded document could not be written to the scratch directory.
    #[error("failed to write expanded manifest {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The expansion command itself failed.
    #[error("template expansion failed: {0}")]
    ExpansionFailed(#[source] CommandError),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for [`crate::ConvergeConfig`].
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
