//! Subprocess runner for `kubectl`/`oc`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{CommandError, CommandRunner, FailureClass, Identity, Invocation};
use crate::config::ConvergeConfig;

/// Runs each invocation as a fresh CLI process.
///
/// Admin and user identities are selected by pointing `KUBECONFIG` at the
/// matching file. When no kubeconfig is configured for an identity the
/// process inherits the caller's environment.
#[derive(Debug, Clone)]
pub struct KubectlRunner {
    binary: PathBuf,
    admin_kubeconfig: Option<PathBuf>,
    user_kubeconfig: Option<PathBuf>,
}

impl KubectlRunner {
    /// Create a runner for the given CLI binary.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            admin_kubeconfig: None,
            user_kubeconfig: None,
        }
    }

    /// Create a runner from loaded configuration.
    #[must_use]
    pub fn from_config(config: &ConvergeConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            admin_kubeconfig: config.admin_kubeconfig.clone(),
            user_kubeconfig: config.user_kubeconfig.clone(),
        }
    }

    /// Kubeconfig used for admin invocations.
    #[must_use]
    pub fn with_admin_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.admin_kubeconfig = Some(path.into());
        self
    }

    /// Kubeconfig used for user invocations.
    #[must_use]
    pub fn with_user_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_kubeconfig = Some(path.into());
        self
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn kubeconfig(&self, identity: Identity) -> Option<&Path> {
        match identity {
            Identity::Admin => self.admin_kubeconfig.as_deref(),
            Identity::User => self.user_kubeconfig.as_deref(),
        }
    }
}

#[async_trait]
impl CommandRunner for KubectlRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, CommandError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(invocation.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(kubeconfig) = self.kubeconfig(invocation.identity) {
            cmd.env("KUBECONFIG", kubeconfig);
        }

        let started = Instant::now();
        let output = cmd.output().await.map_err(|e| {
            CommandError::with_class(
                invocation,
                FailureClass::Other,
                format!("failed to execute {}: {e}", self.binary.display()),
            )
        })?;

        debug!(
            command = %invocation,
            identity = %invocation.identity,
            status = ?output.status.code(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Ran control-plane command"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            trace!(command = %invocation, stderr = %stderr.trim(), "Command failed");
            return Err(CommandError::failed(
                invocation,
                output.status.code(),
                &stderr,
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
