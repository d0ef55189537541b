//! The zone holder: the single atomic pointer readers load and the
//! applicator swaps (spec §4.1, §5).

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::contents::ZoneContents;
use crate::generation::{Epoch, EpochGuard};

/// A live, concurrently-readable zone.
///
/// Readers call [`Zone::enter`] to get an [`EpochGuard`] and [`Zone::load`]
/// to get the current [`ZoneContents`] snapshot, and may hold both for the
/// duration of a lookup without ever blocking a writer. [`crate::apply`] is
/// the zone's only writer.
pub struct Zone {
    contents: ArcSwap<ZoneContents>,
    epoch: Epoch,
}

impl Zone {
    pub fn new(contents: ZoneContents) -> Self {
        Zone {
            contents: ArcSwap::new(Arc::new(contents)),
            epoch: Epoch::new(),
        }
    }

    /// Load the current generation's contents. Lock-free (spec §5).
    pub fn load(&self) -> Arc<ZoneContents> {
        self.contents.load_full()
    }

    /// Enter a read-side critical section, to be held for as long as `load`'s
    /// result is in use.
    pub fn enter(&self) -> EpochGuard<'_> {
        self.epoch.enter()
    }

    /// Swap in `new`, returning the contents it displaced (apply step 8).
    pub(crate) fn switch_contents(&self, new: Arc<ZoneContents>) -> Arc<ZoneContents> {
        self.contents.swap(new)
    }

    /// Drain readers that entered before the most recent swap (apply step
    /// 11).
    pub(crate) async fn flip_and_wait(&self) {
        self.epoch.flip_and_wait().await
    }
}
