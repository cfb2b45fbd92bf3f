//! Manifest templates and the engines that expand them.
//!
//! Expansion produces a concrete [`Manifest`]: the expanded document plus the
//! scratch file it was written to, ready for `apply -f`. Two engines ship:
//!
//! - [`LocalTemplateEngine`] substitutes `${KEY}` placeholders in-process
//! - [`ProcessTemplateEngine`] delegates to the CLI's `process` verb

pub mod local;
pub mod process;
pub mod scratch;

pub use local::LocalTemplateEngine;
pub use process::ProcessTemplateEngine;
pub use scratch::ScratchDir;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ConvergeError;

/// A template source plus the parameters to expand it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTemplate {
    pub source: PathBuf,
    pub parameters: BTreeMap<String, String>,
}

impl ManifestTemplate {
    #[must_use]
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add or replace one parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.insert(key.into(), value.to_string());
        self
    }

    /// Add parameters from `KEY=VALUE` pairs.
    #[must_use]
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// File stem used to name expanded copies.
    pub(crate) fn stem(&self) -> String {
        self.source
            .file_stem()
            .map_or_else(|| "manifest".to_string(), |s| s.to_string_lossy().into_owned())
    }
}

/// An expanded document on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    path: PathBuf,
    document: String,
}

impl Manifest {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, document: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            document: document.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn document(&self) -> &str {
        &self.document
    }
}

/// Turns a [`ManifestTemplate`] into a [`Manifest`].
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    /// Expand `template` and write the result to a fresh scratch file.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergeError::Template`]. Only
    /// [`crate::TemplateError::ExpansionFailed`] is considered transient.
    async fn expand(&self, template: &ManifestTemplate) -> Result<Manifest, ConvergeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_parameters() {
        let template = ManifestTemplate::new("/fixtures/widget.yaml")
            .param("NAME", "w1")
            .param("REPLICAS", 3)
            .params([("NAMESPACE", "t1")]);

        assert_eq!(template.parameters.len(), 3);
        assert_eq!(template.parameters["REPLICAS"], "3");
        assert_eq!(template.stem(), "widget");
    }

    #[test]
    fn test_stem_falls_back() {
        assert_eq!(ManifestTemplate::new("/").stem(), "manifest");
    }
}
