//! Update policies for cached resources.

use std::time::SystemTime;

/// Governs whether a cached copy may be used without revalidation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Revalidate against the remote on every use.
    #[default]
    Always,
    /// Revalidate at most once per engine session.
    Session,
    /// Never revalidate; any cached copy is acceptable.
    Never,
    /// Refetch unconditionally, ignoring the cache.
    Force,
}

impl UpdatePolicy {
    /// Whether a cached entry should be revalidated under this policy.
    ///
    /// `last_updated` is the entry's revalidation stamp, if any;
    /// `session_start` is when the engine was created.
    #[must_use]
    pub fn should_update(
        self,
        last_updated: Option<SystemTime>,
        session_start: SystemTime,
    ) -> bool {
        match self {
            UpdatePolicy::Always | UpdatePolicy::Force => true,
            UpdatePolicy::Never => false,
            UpdatePolicy::Session => match last_updated {
                Some(stamp) => stamp < session_start,
                None => true,
            },
        }
    }
}
