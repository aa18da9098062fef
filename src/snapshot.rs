//! Snapshots of cumulative counters and the two-deep snapshot store.
//!
//! A [`Snapshot`] is one timestamped table of counter values for all
//! instances of a counter class. It is produced by a single source fetch,
//! immutable afterwards, and retained as the delta baseline for exactly one
//! subsequent cycle.
//!
//! The [`SnapshotStore`] owns the `{current, previous}` pair for one counter
//! class. The poll loop is its sole reader and writer, so no internal
//! synchronization is needed. If several counter classes were ever polled
//! concurrently, each would own an independent store and engine.

use chrono::NaiveDateTime;

use crate::schema::CounterClass;

/// One instance's cumulative counters at a point in time.
#[derive(Clone, Debug)]
pub struct Row {
    /// Instance identifier, unique within the snapshot.
    pub id: u64,
    /// Sample timestamp assigned by the storage system.
    pub time: NaiveDateTime,
    /// Value columns in schema order (counters and accumulators only).
    pub values: Vec<u64>,
}

/// A timestamped counter table for one counter class.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub class: CounterClass,
    /// Rows in the order the storage system reported them.
    pub rows: Vec<Row>,
}

impl Snapshot {
    /// The snapshot's shared sample timestamp. The storage system stamps one
    /// sampling period per poll, so row 0's timestamp is authoritative.
    pub fn sample_time(&self) -> Option<NaiveDateTime> {
        self.rows.first().map(|r| r.time)
    }
}

/// The `{current, previous}` pair for one counter class.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotPair<'a> {
    pub current: &'a Snapshot,
    pub previous: Option<&'a Snapshot>,
}

/// Holds the two most recent snapshots for one counter class. Anything two
/// cycles old is discarded unconditionally; there is no history buffer.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Option<Snapshot>,
    previous: Option<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `snapshot` as current, promoting the prior current into
    /// previous. The old previous is dropped.
    pub fn advance(&mut self, snapshot: Snapshot) {
        self.previous = self.current.take();
        self.current = Some(snapshot);
    }

    /// Swap only the current slot, leaving the previous baseline untouched.
    /// Used by the same-interval retry path: a refetch inside one remote
    /// sampling period must not consume the baseline.
    pub fn replace_current(&mut self, snapshot: Snapshot) {
        self.current = Some(snapshot);
    }

    /// Discard both snapshots. The next cycle behaves exactly like process
    /// start (warm-up).
    pub fn reset(&mut self) {
        self.current = None;
        self.previous = None;
    }

    /// Borrow the pair, or `None` before the first `advance`.
    pub fn pair(&self) -> Option<SnapshotPair<'_>> {
        self.current.as_ref().map(|current| SnapshotPair {
            current,
            previous: self.previous.as_ref(),
        })
    }
}
