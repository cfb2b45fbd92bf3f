//! Client configuration.
//!
//! Configuration is read from an optional YAML file and then overridden by
//! environment variables:
//!
//! - `CONVERGE_BINARY`: CLI used to talk to the control plane (default `kubectl`)
//! - `KUBECONFIG`: kubeconfig for admin invocations
//! - `CONVERGE_USER_KUBECONFIG`: kubeconfig for user invocations
//! - `CONVERGE_SCRATCH_DIR`: where expanded manifests are written

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::policy::PolicySet;

const ENV_BINARY: &str = "CONVERGE_BINARY";
const ENV_ADMIN_KUBECONFIG: &str = "KUBECONFIG";
const ENV_USER_KUBECONFIG: &str = "CONVERGE_USER_KUBECONFIG";
const ENV_SCRATCH_DIR: &str = "CONVERGE_SCRATCH_DIR";

/// Settings shared by the runner, the template engines and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergeConfig {
    /// Control-plane CLI (`kubectl` or `oc`).
    pub binary: PathBuf,
    /// Kubeconfig for admin invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_kubeconfig: Option<PathBuf>,
    /// Kubeconfig for user invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_kubeconfig: Option<PathBuf>,
    /// Directory for expanded manifests.
    pub scratch_dir: PathBuf,
    /// Default poll policies.
    pub policies: PolicySet,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("kubectl"),
            admin_kubeconfig: None,
            user_kubeconfig: None,
            scratch_dir: std::env::temp_dir(),
            policies: PolicySet::default(),
        }
    }
}

impl ConvergeConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overridden by the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Override fields from environment variables that are set and non-empty.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(binary) = var(ENV_BINARY) {
            self.binary = PathBuf::from(binary);
        }
        if let Some(path) = var(ENV_ADMIN_KUBECONFIG) {
            self.admin_kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(path) = var(ENV_USER_KUBECONFIG) {
            self.user_kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(dir) = var(ENV_SCRATCH_DIR) {
            self.scratch_dir = PathBuf::from(dir);
        }

        debug!(
            binary = %self.binary.display(),
            scratch_dir = %self.scratch_dir.display(),
            "Resolved converge configuration"
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use serial_test::serial;

    use super::*;
    use crate::policy::PollPolicy;

    #[test]
    fn test_defaults() {
        let config = ConvergeConfig::default();
        assert_eq!(config.binary, PathBuf::from("kubectl"));
        assert!(config.admin_kubeconfig.is_none());
        assert_eq!(config.policies, PolicySet::default());
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "binary: oc\nuser_kubeconfig: /tmp/user.kubeconfig\npolicies:\n  resource:\n    interval: 5\n    timeout: 90"
        )
        .unwrap();

        let config = ConvergeConfig::load(file.path()).unwrap();
        assert_eq!(config.binary, PathBuf::from("oc"));
        assert_eq!(
            config.user_kubeconfig,
            Some(PathBuf::from("/tmp/user.kubeconfig"))
        );
        assert_eq!(config.policies.resource, PollPolicy::from_secs(5, 90));
        assert_eq!(config.policies.apply_retry, PollPolicy::apply_retry());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConvergeConfig::load(Path::new("/nonexistent/converge.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "policies: [not, a, map]").unwrap();
        let err = ConvergeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_apply_vars_ignores_empty_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_BINARY, "oc"),
            (ENV_ADMIN_KUBECONFIG, "/etc/admin"),
            (ENV_USER_KUBECONFIG, ""),
        ]);
        let config =
            ConvergeConfig::default().apply_vars(|k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.binary, PathBuf::from("oc"));
        assert_eq!(config.admin_kubeconfig, Some(PathBuf::from("/etc/admin")));
        assert!(config.user_kubeconfig.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_scratch_dir() {
        // SAFETY: serialized via #[serial] so no other test touches the environment
        unsafe { std::env::set_var(ENV_SCRATCH_DIR, "/var/tmp/converge") };
        let config = ConvergeConfig::from_env();
        unsafe { std::env::remove_var(ENV_SCRATCH_DIR) };

        assert_eq!(config.scratch_dir, PathBuf::from("/var/tmp/converge"));
    }
}
