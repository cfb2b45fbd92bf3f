//! Entry point binding a [`CommandRunner`] to an identity.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ConvergeError;
use crate::poll::Poller;
use crate::policy::PollPolicy;
use crate::resource::{ResourceHandle, ResourceIdentity, ResourceSetHandle};
use crate::runner::{CommandError, CommandRunner, Identity, Invocation, Verb};
use crate::submit::Submitter;
use crate::template::{Manifest, ManifestTemplate, TemplateEngine};

/// Cheap-to-clone handle on the control plane.
///
/// Clones share the runner; identity and cancellation are per clone.
#[derive(Clone)]
pub struct Client {
    runner: Arc<dyn CommandRunner>,
    identity: Identity,
    cancel: Option<CancellationToken>,
}

impl Client {
    /// Admin client over `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            identity: Identity::Admin,
            cancel: None,
        }
    }

    /// Same runner, admin identity.
    #[must_use]
    pub fn as_admin(&self) -> Self {
        self.with_identity(Identity::Admin)
    }

    /// Same runner, unprivileged user identity.
    #[must_use]
    pub fn as_user(&self) -> Self {
        self.with_identity(Identity::User)
    }

    #[must_use]
    pub fn with_identity(&self, identity: Identity) -> Self {
        Self {
            identity,
            ..self.clone()
        }
    }

    /// Thread a cancellation token through every wait and submission.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: Some(token),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Run one command as this client's identity.
    ///
    /// # Errors
    ///
    /// Returns the runner's [`CommandError`] unchanged.
    pub async fn run<I, S>(
        &self,
        verb: Verb,
        namespace: Option<&str>,
        args: I,
    ) -> Result<String, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new(verb, self.identity)
            .namespace(namespace)
            .args(args);
        self.runner.run(&invocation).await
    }

    /// Poller carrying this client's cancellation token.
    #[must_use]
    pub fn poller(&self, policy: PollPolicy) -> Poller {
        let poller = Poller::new(policy);
        match &self.cancel {
            Some(token) => poller.with_cancellation(token.clone()),
            None => poller,
        }
    }

    /// Submitter carrying this client's cancellation token.
    #[must_use]
    pub fn submitter(&self, retry: PollPolicy) -> Submitter {
        let submitter = Submitter::new(retry);
        match &self.cancel {
            Some(token) => submitter.with_cancellation(token.clone()),
            None => submitter,
        }
    }

    /// Handle on a single object.
    #[must_use]
    pub fn resource(&self, identity: ResourceIdentity) -> ResourceHandle {
        ResourceHandle::new(self.clone(), identity)
    }

    /// Handle on every object of `kind` in `namespace` (or cluster-wide).
    #[must_use]
    pub fn resources(&self, kind: impl Into<String>, namespace: Option<&str>) -> ResourceSetHandle {
        ResourceSetHandle::new(self.clone(), kind, namespace.map(str::to_string))
    }

    /// Expand `template` with retries, then `apply -f` the result.
    ///
    /// # Errors
    ///
    /// See [`Submitter::submit`]; apply failures are mapped through
    /// [`ConvergeError::from_submission`].
    pub async fn apply_template(
        &self,
        engine: &dyn TemplateEngine,
        template: &ManifestTemplate,
        retry: PollPolicy,
    ) -> Result<Manifest, ConvergeError> {
        self.submit_template(Verb::Apply, engine, template, retry)
            .await
    }

    /// Expand `template` with retries, then `create -f` the result.
    ///
    /// # Errors
    ///
    /// See [`Client::apply_template`].
    pub async fn create_from_template(
        &self,
        engine: &dyn TemplateEngine,
        template: &ManifestTemplate,
        retry: PollPolicy,
    ) -> Result<Manifest, ConvergeError> {
        self.submit_template(Verb::Create, engine, template, retry)
            .await
    }

    /// Submit an already expanded manifest.
    ///
    /// # Errors
    ///
    /// Any command failure, classified via [`ConvergeError::from_submission`].
    pub async fn apply_manifest(&self, manifest: &Manifest) -> Result<(), ConvergeError> {
        self.submit_manifest(Verb::Apply, manifest).await
    }

    async fn submit_manifest(&self, verb: Verb, manifest: &Manifest) -> Result<(), ConvergeError> {
        let path = manifest.path().display().to_string();
        self.run(verb, None, ["-f".to_string(), path.clone()])
            .await
            .map_err(|e| ConvergeError::from_submission(e, &path))?;
        info!(manifest = %path, verb = %verb, "Submitted manifest");
        Ok(())
    }

    async fn submit_template(
        &self,
        verb: Verb,
        engine: &dyn TemplateEngine,
        template: &ManifestTemplate,
        retry: PollPolicy,
    ) -> Result<Manifest, ConvergeError> {
        self.submitter(retry)
            .submit(
                || engine.expand(template),
                |manifest| async move {
                    self.submit_manifest(verb, &manifest)
                        .await
                        .map(|()| manifest)
                },
            )
            .await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("identity", &self.identity)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRunner;

    #[tokio::test]
    async fn test_identity_is_per_clone() {
        let runner = Arc::new(FakeRunner::always(""));
        let admin = Client::new(runner.clone());
        let user = admin.as_user();

        admin.run(Verb::Get, None, ["nodes"]).await.unwrap();
        user.run(Verb::Get, Some("t1"), ["pods"]).await.unwrap();

        let calls = runner.invocations();
        assert_eq!(calls[0].identity, Identity::Admin);
        assert_eq!(calls[1].identity, Identity::User);
        assert_eq!(calls[1].namespace.as_deref(), Some("t1"));
        assert_eq!(admin.identity(), Identity::Admin);
    }

    #[tokio::test]
    async fn test_apply_manifest_classifies_rejection() {
        let runner = Arc::new(FakeRunner::new(|inv| {
            Err(CommandError::failed(
                inv,
                Some(1),
                r#"The Widget "w1" is invalid: spec.size: Invalid value: -1"#,
            ))
        }));
        let client = Client::new(runner.clone());
        let manifest = Manifest::new("/tmp/w1.yaml", "kind: Widget");

        let err = client.apply_manifest(&manifest).await.unwrap_err();
        assert!(matches!(err, ConvergeError::SemanticApply(_)));
        assert_eq!(runner.invocations()[0].args, ["-f", "/tmp/w1.yaml"]);
    }

    #[tokio::test]
    async fn test_apply_manifest_transient_failure_is_transient_submission() {
        let runner = Arc::new(FakeRunner::new(|inv| {
            Err(CommandError::failed(
                inv,
                Some(1),
                "Unable to connect to the server: dial tcp 10.0.0.1:6443: connection refused",
            ))
        }));
        let client = Client::new(runner.clone());
        let manifest = Manifest::new("/tmp/w1.yaml", "kind: Widget");

        let err = client.apply_manifest(&manifest).await.unwrap_err();
        assert!(matches!(err, ConvergeError::TransientSubmission(_)));
        assert_eq!(runner.calls(), 1);
    }
}
