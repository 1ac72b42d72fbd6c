//! Recording clock
//!
//! Device timestamps are rebased onto a clock that starts at zero with the
//! first frame a recording session sees.

use std::time::Duration;

/// Rebases device presentation timestamps for one recording session
#[derive(Debug, Default, Clone)]
pub struct TimestampNormalizer {
    anchor: Option<Duration>,
}

impl TimestampNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebase a frame's timestamp. The first call anchors the clock.
    ///
    /// Timestamps earlier than the anchor saturate to zero.
    pub fn normalize(&mut self, pts: Duration, duration: Duration) -> (Duration, Duration) {
        let anchor = *self.anchor.get_or_insert(pts);
        (pts.saturating_sub(anchor), duration)
    }

    /// Anchor the clock without producing a timestamp, if not already anchored.
    pub fn anchor_at(&mut self, pts: Duration) {
        self.anchor.get_or_insert(pts);
    }

    pub fn anchor(&self) -> Option<Duration> {
        self.anchor
    }
}
