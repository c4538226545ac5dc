use crate::sync::atomic::{AtomicBool, Ordering};

/// A one-bit edge trigger.
///
/// One side fires it, the other consumes it. Any number of fires between two
/// consumes collapse into a single edge. Both operations are wait-free and
/// safe from any thread.
///
/// Ordering is relaxed: the trigger communicates nothing but its own bit.
/// A payload attached to the edge must be synchronised by other means.
pub struct Trigger {
    fired: AtomicBool,
}

impl Trigger {
    /// Creates a trigger that has not fired.
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Fires the trigger. Idempotent.
    pub fn fire(&self) {
        self.fired.store(true, Ordering::Relaxed);
    }

    /// Returns whether the trigger has fired since the last consume, and
    /// clears it.
    pub fn test_and_consume(&self) -> bool {
        self.fired.swap(false, Ordering::Relaxed)
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}
