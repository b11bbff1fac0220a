//! Resource lifecycle flags.

use bitflags::bitflags;

bitflags! {
    /// Packed resource state.
    ///
    /// Several flags are legitimately set at once: a connected resource
    /// waiting for its download slot reads `CONNECTED | PREDOWNLOAD |
    /// PROCESSING`. `DOWNLOADED` and `ERROR` are terminal for the engine;
    /// `PROCESSING` means the resource sits in the work queue or a worker
    /// holds it.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Status: u16 {
        const PRECONNECT = 1 << 0;
        const CONNECTING = 1 << 1;
        const CONNECTED = 1 << 2;
        const PREDOWNLOAD = 1 << 3;
        const DOWNLOADING = 1 << 4;
        const DOWNLOADED = 1 << 5;
        const ERROR = 1 << 6;
        const PROCESSING = 1 << 7;
    }
}

impl Status {
    /// Whether the engine will do no further work for this resource.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.intersects(Status::DOWNLOADED | Status::ERROR)
    }
}
