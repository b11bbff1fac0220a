//! Download progress listeners.

use capstan_core::Version;
use url::Url;

use crate::status::Status;

/// Snapshot of a resource's identity and state, delivered with each event.
#[derive(Clone, Debug)]
pub struct DownloadEvent {
    pub location: Url,
    pub version: Option<Version>,
    pub status: Status,
}

/// Callbacks observing resource progress, registered per tracker.
///
/// Callbacks run with no engine locks held, so implementations are free to
/// call back into the tracker. Which callback fires is decided by the
/// resource's flags at snapshot time: terminal states report completion,
/// an active transfer reports a started download, and an in-flight connect
/// reports a started update.
pub trait DownloadListener: Send + Sync {
    fn update_started(&self, _event: &DownloadEvent) {}
    fn download_started(&self, _event: &DownloadEvent) {}
    fn download_completed(&self, _event: &DownloadEvent) {}
}
