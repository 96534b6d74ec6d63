use std::sync::atomic::{AtomicU64, Ordering};

/// A total-order logical clock value. `spec.md` only requires strict
/// monotonicity and a total order, not wall-clock meaning; a wall clock
/// pairs poorly with fast successive operations (two writes in the same
/// millisecond are a real case, not an edge case), so this is a pure
/// counter rather than `SystemTime`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

use std::fmt;

/// Mints and observes [`Timestamp`] values for one `Database`. Shared by every
/// session; `mint` is called at transaction creation and at every direct
/// write to the root store, `peek` for point-in-time reads that should not
/// themselves advance the clock.
#[derive(Debug, Default)]
pub struct TimestampSource(AtomicU64);

impl TimestampSource {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Returns a fresh timestamp, strictly greater than every previously
    /// minted or peeked value.
    pub fn mint(&self) -> Timestamp {
        Timestamp(self.0.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns the current frontier without advancing it: an upper bound on
    /// everything minted so far, suitable as "now" for a read or a purge
    /// horizon.
    pub fn peek(&self) -> Timestamp {
        Timestamp(self.0.load(Ordering::SeqCst))
    }
}
