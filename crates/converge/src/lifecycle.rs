//! Lifecycle of a single resource as observed through a handle.

use std::fmt;

/// Where a handle believes its object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Nothing submitted or observed yet.
    #[default]
    Unknown,
    /// Manifest submitted, object not yet observed.
    Pending,
    Present,
    /// Delete issued, absence not yet observed.
    Deleting,
    Gone,
    /// A wait from `Pending` or `Deleting` did not converge. Neither
    /// presence nor absence may be assumed.
    Indeterminate,
}

/// Things that move a [`Lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Submitted,
    Appeared,
    DeleteIssued,
    Vanished,
    /// A presence or absence wait timed out or failed.
    WaitFailed,
}

impl Lifecycle {
    /// Next state after `event`.
    #[must_use]
    pub fn advance(self, event: LifecycleEvent) -> Self {
        use LifecycleEvent as E;

        match (self, event) {
            (_, E::Submitted) => Self::Pending,
            (_, E::Appeared) => Self::Present,
            (_, E::DeleteIssued) => Self::Deleting,
            (_, E::Vanished) => Self::Gone,
            (Self::Pending | Self::Deleting | Self::Indeterminate, E::WaitFailed) => {
                Self::Indeterminate
            }
            (state, E::WaitFailed) => state,
        }
    }

    /// Whether the state is known to match the cluster.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Present | Self::Gone)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Present => "present",
            Self::Deleting => "deleting",
            Self::Gone => "gone",
            Self::Indeterminate => "indeterminate",
        };
        f.write_str(s)
    }
}
