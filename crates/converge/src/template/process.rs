//! Server-side expansion through the CLI's `process` verb.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Manifest, ManifestTemplate, ScratchDir, TemplateEngine};
use crate::client::Client;
use crate::error::{ConvergeError, TemplateError};
use crate::runner::Verb;

/// Expands templates with `process -f <source> -p KEY=VALUE ...`.
///
/// The rendered list is written to the scratch directory. Command failures
/// surface as [`TemplateError::ExpansionFailed`], which the submitter retries.
#[derive(Debug)]
pub struct ProcessTemplateEngine {
    client: Client,
    scratch: ScratchDir,
    ignore_unknown_parameters: bool,
}

impl ProcessTemplateEngine {
    #[must_use]
    pub fn new(client: Client, scratch: ScratchDir) -> Self {
        Self {
            client,
            scratch,
            ignore_unknown_parameters: false,
        }
    }

    /// Pass `--ignore-unknown-parameters=true`.
    #[must_use]
    pub fn ignore_unknown_parameters(mut self) -> Self {
        self.ignore_unknown_parameters = true;
        self
    }

    fn args(&self, template: &ManifestTemplate) -> Vec<String> {
        let mut args = vec!["-f".to_string(), template.source.display().to_string()];
        if self.ignore_unknown_parameters {
            args.push("--ignore-unknown-parameters=true".to_string());
        }
        for (key, value) in &template.parameters {
            args.push("-p".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }
}

#[async_trait]
impl TemplateEngine for ProcessTemplateEngine {
    async fn expand(&self, template: &ManifestTemplate) -> Result<Manifest, ConvergeError> {
        match tokio::fs::try_exists(&template.source).await {
            Ok(true) => {}
            Ok(false) => return Err(TemplateError::SourceNotFound(template.source.clone()).into()),
            Err(source) => {
                return Err(TemplateError::Read {
                    path: template.source.clone(),
                    source,
                }
                .into())
            }
        }

        let document = self
            .client
            .run(Verb::Process, None, self.args(template))
            .await
            .map_err(|e| {
                warn!(template = %template.source.display(), error = %e, "Template processing failed");
                TemplateError::ExpansionFailed(e)
            })?;

        let path = self
            .scratch
            .write(&template.stem(), "json", &document)
            .await?;
        debug!(
            template = %template.source.display(),
            manifest = %path.display(),
            "Processed template"
        );
        Ok(Manifest::new(path, document))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fake::FakeRunner;
    use crate::runner::{CommandError, FailureClass};

    #[tokio::test]
    async fn test_process_args_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("widget.yaml");
        std::fs::write(&source, "kind: Template").unwrap();

        let runner = Arc::new(FakeRunner::always(r#"{"kind":"List","items":[]}"#));
        let engine = ProcessTemplateEngine::new(
            Client::new(runner.clone()),
            ScratchDir::new(dir.path()),
        )
        .ignore_unknown_parameters();

        let template = ManifestTemplate::new(&source)
            .param("NAME", "w1")
            .param("NAMESPACE", "t1");
        let manifest = engine.expand(&template).await.unwrap();

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].verb, Verb::Process);
        assert_eq!(
            calls[0].args,
            [
                "-f".to_string(),
                source.display().to_string(),
                "--ignore-unknown-parameters=true".to_string(),
                "-p".to_string(),
                "NAME=w1".to_string(),
                "-p".to_string(),
                "NAMESPACE=t1".to_string(),
            ]
        );
        assert_eq!(manifest.path().extension().unwrap(), "json");
        assert_eq!(
            std::fs::read_to_string(manifest.path()).unwrap(),
            r#"{"kind":"List","items":[]}"#
        );
    }

    #[tokio::test]
    async fn test_command_failure_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("widget.yaml");
        std::fs::write(&source, "kind: Template").unwrap();

        let runner = Arc::new(FakeRunner::new(|inv| {
            Err(CommandError::with_class(inv, FailureClass::Other, "exit status 1"))
        }));
        let engine = ProcessTemplateEngine::new(Client::new(runner), ScratchDir::new(dir.path()));

        let err = engine.expand(&ManifestTemplate::new(&source)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_source_skips_command() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::always(""));
        let engine = ProcessTemplateEngine::new(
            Client::new(runner.clone()),
            ScratchDir::new(dir.path()),
        );

        let err = engine
            .expand(&ManifestTemplate::new(dir.path().join("absent.yaml")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConvergeError::Template(TemplateError::SourceNotFound(_))
        ));
        assert_eq!(runner.calls(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_source_is_not_reported_missing() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        std::fs::write(&plain, "not a directory").unwrap();
        let runner = Arc::new(FakeRunner::always(""));
        let engine = ProcessTemplateEngine::new(
            Client::new(runner.clone()),
            ScratchDir::new(dir.path()),
        );

        let err = engine
            .expand(&ManifestTemplate::new(plain.join("widget.yaml")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConvergeError::Template(TemplateError::Read { .. })
        ));
        assert!(!err.is_transient());
        assert_eq!(runner.calls(), 0);
    }
}
