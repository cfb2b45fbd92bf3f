//! In-process `${KEY}` substitution.

use std::io::ErrorKind;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use tracing::debug;

use super::{Manifest, ManifestTemplate, ScratchDir, TemplateEngine};
use crate::error::{ConvergeError, TemplateError};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Expands `${KEY}` placeholders from the template's parameters.
///
/// Substitution is a single pass: values are never rescanned, so a value
/// containing `${...}` is written out literally.
#[derive(Debug)]
pub struct LocalTemplateEngine {
    scratch: ScratchDir,
}

impl LocalTemplateEngine {
    #[must_use]
    pub fn new(scratch: ScratchDir) -> Self {
        Self { scratch }
    }
}

#[async_trait]
impl TemplateEngine for LocalTemplateEngine {
    async fn expand(&self, template: &ManifestTemplate) -> Result<Manifest, ConvergeError> {
        let source = &template.source;
        let raw = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => TemplateError::SourceNotFound(source.clone()),
                _ => TemplateError::Read {
                    path: source.clone(),
                    source: e,
                },
            })?;

        let document = substitute(&raw, template)?;
        let ext = source
            .extension()
            .map_or_else(|| "yaml".to_string(), |e| e.to_string_lossy().into_owned());
        let path = self.scratch.write(&template.stem(), &ext, &document).await?;

        debug!(
            template = %source.display(),
            manifest = %path.display(),
            parameters = template.parameters.len(),
            "Expanded template locally"
        );
        Ok(Manifest::new(path, document))
    }
}

fn substitute(raw: &str, template: &ManifestTemplate) -> Result<String, TemplateError> {
    if let Some(missing) = PLACEHOLDER
        .captures_iter(raw)
        .map(|caps| caps[1].to_string())
        .find(|key| !template.parameters.contains_key(key))
    {
        return Err(TemplateError::UnresolvedPlaceholder {
            path: template.source.clone(),
            placeholder: missing,
        });
    }

    let expanded = PLACEHOLDER.replace_all(raw, |caps: &Captures<'_>| {
        template
            .parameters
            .get(&caps[1])
            .cloned()
            .unwrap_or_default()
    });
    Ok(expanded.into_owned())
}
