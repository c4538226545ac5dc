use {
    crate::{
        sync::atomic::{AtomicU64, Ordering},
        tags::Rt,
    },
    crossbeam_utils::CachePadded,
};

/// A monotone tick counter gating when latched readers re-fetch.
///
/// The intended pattern is one increment at the top of each real-time frame
/// (e.g. each audio callback). Every [`latched`](crate::latched) value
/// attached to the signal then returns the same snapshot for the rest of the
/// frame, however many times it is read and whatever the producers publish
/// meanwhile.
///
/// The counter is 64 bits; wrap-around is not a practical concern.
pub struct FrameSignal {
    tick: CachePadded<AtomicU64>,
}

impl FrameSignal {
    /// Creates a signal.
    ///
    /// The tick starts ahead of every fresh reader's cached tick, so a
    /// reader's first fetch never waits for an increment.
    pub fn new() -> Self {
        Self {
            tick: CachePadded::new(AtomicU64::new(1)),
        }
    }

    /// The current tick. Only the real-time reader consults it.
    pub fn get(&self, _tag: Rt) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Advances the tick. Wait-free; call once per real-time frame.
    pub fn increment(&self, _tag: Rt) {
        self.tick.fetch_add(1, Ordering::Release);
    }
}

impl Default for FrameSignal {
    fn default() -> Self {
        Self::new()
    }
}
