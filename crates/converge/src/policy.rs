//! Poll policies: the interval/timeout pair bounding every wait.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Interval and timeout for a bounded polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Pause between evaluations.
    #[serde(with = "secs")]
    pub interval: Duration,
    /// Total budget, measured on the monotonic clock.
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl PollPolicy {
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Shorthand for whole-second policies.
    #[must_use]
    pub const fn from_secs(interval: u64, timeout: u64) -> Self {
        Self::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }

    /// Local retries around template expansion (3s/15s).
    #[must_use]
    pub const fn apply_retry() -> Self {
        Self::from_secs(3, 15)
    }

    /// Object appearance/removal and status fields (3s/180s).
    #[must_use]
    pub const fn resource() -> Self {
        Self::from_secs(3, 180)
    }

    /// Node/machine provisioning and operator rollout (60s/720s).
    #[must_use]
    pub const fn cluster() -> Self {
        Self::from_secs(60, 720)
    }

    /// Evaluate exactly once and never sleep.
    #[must_use]
    pub const fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::resource()
    }
}

/// Named policies a test suite can tune in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySet {
    pub apply_retry: PollPolicy,
    pub resource: PollPolicy,
    pub cluster: PollPolicy,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            apply_retry: PollPolicy::apply_retry(),
            resource: PollPolicy::resource(),
            cluster: PollPolicy::cluster(),
        }
    }
}

/// Durations as (possibly fractional) seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(PollPolicy::apply_retry(), PollPolicy::from_secs(3, 15));
        assert_eq!(PollPolicy::cluster().timeout, Duration::from_secs(720));
        assert_eq!(PollPolicy::default(), PollPolicy::resource());
    }

    #[test]
    fn test_deserialize_fractional_seconds() {
        let policy: PollPolicy = serde_yaml::from_str("interval: 0.5\ntimeout: 90").unwrap();
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert_eq!(policy.timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_negative_seconds_rejected() {
        let result: Result<PollPolicy, _> = serde_yaml::from_str("interval: -1\ntimeout: 5");
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_set_partial_override() {
        let set: PolicySet =
            serde_yaml::from_str("cluster:\n  interval: 30\n  timeout: 420\n").unwrap();
        assert_eq!(set.cluster, PollPolicy::from_secs(30, 420));
        assert_eq!(set.resource, PollPolicy::resource());
    }
}
