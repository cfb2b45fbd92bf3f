//! Uniquely named scratch files for expanded manifests.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::TemplateError;
use crate::names::NameGenerator;

/// Attempts before giving up on finding an unused name.
const MAX_ATTEMPTS: usize = 16;

/// Directory where expanded manifests are written.
///
/// Files are created with `create_new`, so two expansions never share a path
/// even when run concurrently from separate processes.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    names: NameGenerator,
}

impl ScratchDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            names: NameGenerator::new(),
        }
    }

    /// Use a specific name generator, e.g. a seeded one in tests.
    #[must_use]
    pub fn with_names(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `contents` to `{root}/{stem}-{suffix}.{ext}`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Write`] if the directory or file cannot be
    /// created.
    pub async fn write(&self, stem: &str, ext: &str, contents: &str) -> Result<PathBuf, TemplateError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| TemplateError::Write {
                path: self.root.clone(),
                source,
            })?;

        let mut last_err = None;
        for _ in 0..MAX_ATTEMPTS {
            let path = self
                .root
                .join(format!("{stem}-{}.{ext}", self.names.suffix()));
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(contents.as_bytes())
                        .await
                        .map_err(|source| TemplateError::Write {
                            path: path.clone(),
                            source,
                        })?;
                    file.flush().await.map_err(|source| TemplateError::Write {
                        path: path.clone(),
                        source,
                    })?;
                    debug!(path = %path.display(), bytes = contents.len(), "Wrote scratch manifest");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => last_err = Some((path, e)),
                Err(source) => return Err(TemplateError::Write { path, source }),
            }
        }

        let (path, source) = last_err.unwrap_or_else(|| {
            (
                self.root.clone(),
                std::io::Error::from(ErrorKind::AlreadyExists),
            )
        });
        Err(TemplateError::Write { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path().join("nested"));

        let a = scratch.write("widget", "yaml", "a").await.unwrap();
        let b = scratch.write("widget", "yaml", "b").await.unwrap();

        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("widget-"));
        assert_eq!(a.extension().unwrap(), "yaml");
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "b");
    }

    #[tokio::test]
    async fn test_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let taken = NameGenerator::from_seed(7).suffix();
        std::fs::write(dir.path().join(format!("w-{taken}.yaml")), "old").unwrap();

        let scratch = ScratchDir::new(dir.path()).with_names(NameGenerator::from_seed(7));
        let path = scratch.write("w", "yaml", "new").await.unwrap();

        assert_ne!(path.file_name().unwrap().to_string_lossy(), format!("w-{taken}.yaml"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "new");
    }
}
