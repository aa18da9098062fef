//! The counter-to-rate conversion engine.
//!
//! Given the `{current, previous}` snapshot pair and the elapsed seconds
//! between the two samples, [`DeltaEngine::compute`] produces one rate row
//! per current instance:
//!
//! - **Warm-up**: with no previous snapshot the current values are returned
//!   verbatim, for every field. There is no baseline to delta against.
//! - **Same interval**: when both snapshots carry the same sample timestamp
//!   the storage system has not advanced its own sampling clock yet. The
//!   engine signals [`Outcome::SameInterval`] and produces no rows; the
//!   caller must refetch rather than double-count.
//! - **Reset fallback**: a counter that went backwards (reset or wrap on the
//!   storage system) yields the raw current value for that field instead of
//!   a negative rate. The instance's baseline was invalid; the next cycle
//!   deltas normally again.
//! - **Instance drift**: identifiers only in the previous snapshot are
//!   dropped silently; identifiers new in the current snapshot are emitted
//!   with raw values for one cycle.
//!
//! Derived mean-latency columns are computed after normalization, from the
//! already-divided rates, and are zero whenever the I/O-count denominator
//! rate is zero.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::error::Error;
use crate::schema::CounterClass;
use crate::snapshot::{Row, Snapshot, SnapshotPair};

/// One normalized output row: identifier, timestamp from the current
/// snapshot, and one value per counter/derived column.
#[derive(Clone, Debug)]
pub struct RateRow {
    pub id: u64,
    pub time: NaiveDateTime,
    pub values: Vec<f64>,
}

/// The engine's output for one cycle, preserving the current snapshot's row
/// order. Consumed immediately by the renderer; never persisted.
#[derive(Clone, Debug)]
pub struct RateTable {
    pub class: CounterClass,
    pub rows: Vec<RateRow>,
}

/// Result of one delta computation.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Both snapshots fall inside one remote sampling period; no output.
    SameInterval,
    /// Normalized rates, ready to render.
    Table(RateTable),
}

/// Per-class rate converter. Derived-metric columns are resolved by field
/// name at construction, so a schema whose rules reference unknown fields
/// fails at startup instead of at render time.
#[derive(Debug)]
pub struct DeltaEngine {
    class: CounterClass,
    /// Resolved (accumulator column, ops column) pairs.
    derived: Vec<(usize, usize)>,
}

impl DeltaEngine {
    pub fn new(class: CounterClass) -> Result<Self, Error> {
        let schema = class.schema();
        let mut derived = Vec::with_capacity(schema.derived.len());
        for rule in schema.derived {
            let accumulator = schema.value_position(rule.accumulator).ok_or_else(|| {
                Error::Config(format!(
                    "derived rule for {class} references unknown field {}",
                    rule.accumulator
                ))
            })?;
            let ops = schema.value_position(rule.ops).ok_or_else(|| {
                Error::Config(format!(
                    "derived rule for {class} references unknown field {}",
                    rule.ops
                ))
            })?;
            derived.push((accumulator, ops));
        }
        Ok(Self { class, derived })
    }

    /// Convert a snapshot pair into per-second rates over `interval_secs`.
    pub fn compute(&self, pair: SnapshotPair<'_>, interval_secs: f64) -> Result<Outcome, Error> {
        self.check_layout(pair.current)?;

        let previous = match pair.previous {
            Some(previous) => previous,
            // Warm-up: no baseline, return current verbatim.
            None => return Ok(Outcome::Table(self.raw_table(pair.current))),
        };
        self.check_layout(previous)?;

        if let (Some(cur), Some(prev)) = (pair.current.sample_time(), previous.sample_time()) {
            if cur == prev {
                return Ok(Outcome::SameInterval);
            }
        }
        if interval_secs <= 0.0 {
            return Ok(Outcome::SameInterval);
        }

        let baselines: HashMap<u64, &Row> =
            previous.rows.iter().map(|row| (row.id, row)).collect();

        let rows = pair
            .current
            .rows
            .iter()
            .map(|row| {
                let mut out = match baselines.get(&row.id) {
                    Some(baseline) => self.rate_row(row, baseline, interval_secs),
                    // New instance: no baseline yet, raw values for one cycle.
                    None => raw_row(row),
                };
                self.apply_derived(&mut out.values);
                out
            })
            .collect();

        Ok(Outcome::Table(RateTable { class: self.class, rows }))
    }

    /// Counter deltas divided by the interval, with the reset fallback for
    /// fields that went backwards.
    fn rate_row(&self, current: &Row, baseline: &Row, interval_secs: f64) -> RateRow {
        let values = current
            .values
            .iter()
            .zip(baseline.values.iter())
            .map(|(&cur, &prev)| {
                if cur >= prev {
                    round2((cur - prev) as f64 / interval_secs)
                } else {
                    cur as f64
                }
            })
            .collect();
        RateRow {
            id: current.id,
            time: current.time,
            values,
        }
    }

    /// Replace each accumulator-rate column with mean latency per I/O.
    fn apply_derived(&self, values: &mut [f64]) {
        for &(accumulator, ops) in &self.derived {
            values[accumulator] = if values[ops] != 0.0 {
                round2(values[accumulator] / values[ops])
            } else {
                0.0
            };
        }
    }

    fn raw_table(&self, snapshot: &Snapshot) -> RateTable {
        RateTable {
            class: self.class,
            rows: snapshot.rows.iter().map(raw_row).collect(),
        }
    }

    /// Field layouts are fixed per class for the process lifetime; a row of
    /// unexpected width means the pair cannot be reconciled.
    fn check_layout(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let expected = self.class.schema().value_count();
        if snapshot.class != self.class {
            return Err(Error::SchemaMismatch {
                class: self.class,
                expected,
                found: snapshot.class.schema().value_count(),
            });
        }
        for row in &snapshot.rows {
            if row.values.len() != expected {
                return Err(Error::SchemaMismatch {
                    class: self.class,
                    expected,
                    found: row.values.len(),
                });
            }
        }
        Ok(())
    }
}

fn raw_row(row: &Row) -> RateRow {
    RateRow {
        id: row.id,
        time: row.time,
        values: row.values.iter().map(|&v| v as f64).collect(),
    }
}

/// Round to 2 decimal digits, matching the report precision.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::snapshot;
    use crate::snapshot::SnapshotStore;

    fn engine(class: CounterClass) -> DeltaEngine {
        DeltaEngine::new(class).unwrap()
    }

    fn table(outcome: Outcome) -> RateTable {
        match outcome {
            Outcome::Table(table) => table,
            Outcome::SameInterval => panic!("expected a rate table"),
        }
    }

    #[test]
    fn warm_up_returns_current_verbatim() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(
            CounterClass::Nodes,
            0,
            &[(1, &[100, 200, 300, 40, 50]), (2, &[7, 8, 15, 1, 2])],
        ));

        let out = table(
            engine(CounterClass::Nodes)
                .compute(store.pair().unwrap(), 300.0)
                .unwrap(),
        );
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].values, vec![100.0, 200.0, 300.0, 40.0, 50.0]);
        assert_eq!(out.rows[1].id, 2);
        assert_eq!(out.rows[1].values, vec![7.0, 8.0, 15.0, 1.0, 2.0]);
    }

    #[test]
    fn warm_up_leaves_accumulators_raw_too() {
        // First cycle has no baseline, so even accumulator columns pass
        // through unchanged; the derived division only applies to rates.
        let mut store = SnapshotStore::new();
        store.advance(snapshot(
            CounterClass::Mdisks,
            0,
            &[(3, &[10, 20, 30, 100, 200, 300, 5000, 6000, 11000])],
        ));

        let out = table(
            engine(CounterClass::Mdisks)
                .compute(store.pair().unwrap(), 300.0)
                .unwrap(),
        );
        assert_eq!(out.rows[0].values[6], 5000.0);
    }

    #[test]
    fn rates_are_deltas_over_the_interval() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(CounterClass::Nodes, 0, &[(1, &[1000, 500, 1500, 10, 20])]));
        store.advance(snapshot(CounterClass::Nodes, 300, &[(1, &[1600, 800, 2400, 10, 50])]));

        let out = table(
            engine(CounterClass::Nodes)
                .compute(store.pair().unwrap(), 300.0)
                .unwrap(),
        );
        assert_eq!(out.rows[0].values, vec![2.0, 1.0, 3.0, 0.0, 0.1]);
    }

    #[test]
    fn rates_round_to_two_decimals() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(CounterClass::Drives, 0, &[(1, &[0, 0, 0, 0, 0, 0])]));
        store.advance(snapshot(CounterClass::Drives, 300, &[(1, &[1000, 0, 0, 0, 0, 0])]));

        let out = table(
            engine(CounterClass::Drives)
                .compute(store.pair().unwrap(), 300.0)
                .unwrap(),
        );
        // 1000 / 300 = 3.333... -> 3.33
        assert_eq!(out.rows[0].values[0], 3.33);
    }

    #[test]
    fn reset_fallback_yields_raw_current_never_negative() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(CounterClass::Nodes, 0, &[(1, &[9000, 500, 9500, 0, 0])]));
        // ReadIOs reset on the storage system; the other counters advanced.
        store.advance(snapshot(CounterClass::Nodes, 300, &[(1, &[120, 800, 920, 0, 0])]));

        let out = table(
            engine(CounterClass::Nodes)
                .compute(store.pair().unwrap(), 300.0)
                .unwrap(),
        );
        assert_eq!(out.rows[0].values[0], 120.0);
        assert_eq!(out.rows[0].values[1], 1.0);
        assert_eq!(out.rows[0].values[2], 920.0);
        assert!(out.rows[0].values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn same_sample_time_produces_no_output() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(CounterClass::Nodes, 0, &[(1, &[100, 0, 100, 0, 0])]));
        store.advance(snapshot(CounterClass::Nodes, 0, &[(1, &[100, 0, 100, 0, 0])]));

        let outcome = engine(CounterClass::Nodes)
            .compute(store.pair().unwrap(), 300.0)
            .unwrap();
        assert!(matches!(outcome, Outcome::SameInterval));
    }

    #[test]
    fn same_interval_path_never_mutates_the_store() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(CounterClass::Nodes, 0, &[(1, &[100, 0, 100, 0, 0])]));
        store.advance(snapshot(CounterClass::Nodes, 60, &[(1, &[160, 0, 160, 0, 0])]));

        // A refetch landing inside the same remote sampling period only
        // replaces the current slot; the previous baseline survives and the
        // eventual delta spans exactly one real interval.
        store.replace_current(snapshot(CounterClass::Nodes, 60, &[(1, &[160, 0, 160, 0, 0])]));
        let pair = store.pair().unwrap();
        assert_eq!(pair.previous.unwrap().rows[0].values[0], 100);

        store.replace_current(snapshot(CounterClass::Nodes, 120, &[(1, &[220, 0, 220, 0, 0])]));
        let out = table(
            engine(CounterClass::Nodes)
                .compute(store.pair().unwrap(), 120.0)
                .unwrap(),
        );
        assert_eq!(out.rows[0].values[0], 1.0);
    }

    #[test]
    fn removed_instances_are_dropped_and_new_ones_shown_raw_once() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(
            CounterClass::Nodes,
            0,
            &[(1, &[100, 0, 100, 0, 0]), (2, &[50, 0, 50, 0, 0])],
        ));
        // Instance 2 disappeared, instance 3 is new.
        store.advance(snapshot(
            CounterClass::Nodes,
            100,
            &[(1, &[300, 0, 300, 0, 0]), (3, &[77, 0, 77, 0, 0])],
        ));

        let out = table(
            engine(CounterClass::Nodes)
                .compute(store.pair().unwrap(), 100.0)
                .unwrap(),
        );
        let ids: Vec<u64> = out.rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(out.rows[0].values[0], 2.0);
        // New instance: raw values, unscaled.
        assert_eq!(out.rows[1].values[0], 77.0);

        // Next cycle the new instance has a baseline and deltas normally.
        store.advance(snapshot(
            CounterClass::Nodes,
            200,
            &[(1, &[400, 0, 400, 0, 0]), (3, &[177, 0, 177, 0, 0])],
        ));
        let out = table(
            engine(CounterClass::Nodes)
                .compute(store.pair().unwrap(), 100.0)
                .unwrap(),
        );
        assert_eq!(out.rows[1].id, 3);
        assert_eq!(out.rows[1].values[0], 1.0);
    }

    #[test]
    fn derived_latency_matches_the_worked_example() {
        // previous: readOps 1000, readTimeAccum 5000; current: 1200, 6200;
        // interval 10s -> rIO/s 20.00 and ms/rIO (6200-5000)/10 / 20 = 6.00.
        let mut store = SnapshotStore::new();
        store.advance(snapshot(
            CounterClass::Mdisks,
            0,
            &[(1, &[0, 0, 0, 1000, 0, 1000, 5000, 0, 5000])],
        ));
        store.advance(snapshot(
            CounterClass::Mdisks,
            10,
            &[(1, &[0, 0, 0, 1200, 0, 1200, 6200, 0, 6200])],
        ));

        let out = table(
            engine(CounterClass::Mdisks)
                .compute(store.pair().unwrap(), 10.0)
                .unwrap(),
        );
        let row = &out.rows[0];
        assert_eq!(row.values[3], 20.0); // rIO/s
        assert_eq!(row.values[6], 6.0); // ms/rIO
        assert_eq!(row.values[8], 6.0); // ms/tIO
    }

    #[test]
    fn derived_latency_is_zero_when_the_ops_rate_is_zero() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(
            CounterClass::Mdisks,
            0,
            &[(1, &[0, 0, 0, 500, 0, 500, 4000, 0, 4000])],
        ));
        // No I/O this interval but the time accumulator still moved.
        store.advance(snapshot(
            CounterClass::Mdisks,
            10,
            &[(1, &[0, 0, 0, 500, 0, 500, 4100, 0, 4100])],
        ));

        let out = table(
            engine(CounterClass::Mdisks)
                .compute(store.pair().unwrap(), 10.0)
                .unwrap(),
        );
        assert_eq!(out.rows[0].values[3], 0.0);
        assert_eq!(out.rows[0].values[6], 0.0);
        assert_eq!(out.rows[0].values[8], 0.0);
    }

    #[test]
    fn mismatched_row_width_is_fatal() {
        let mut store = SnapshotStore::new();
        store.advance(snapshot(CounterClass::Nodes, 0, &[(1, &[100, 0, 100, 0, 0])]));
        // A row with a volume-sized layout under the nodes class.
        store.advance(snapshot(
            CounterClass::Nodes,
            60,
            &[(1, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11])],
        ));

        let err = engine(CounterClass::Nodes)
            .compute(store.pair().unwrap(), 60.0)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { expected: 5, found: 11, .. }));
    }

    #[test]
    fn warm_up_restart_is_idempotent() {
        let engine = engine(CounterClass::Nodes);
        let mut store = SnapshotStore::new();
        store.advance(snapshot(CounterClass::Nodes, 0, &[(1, &[100, 0, 100, 0, 0])]));
        store.advance(snapshot(CounterClass::Nodes, 60, &[(1, &[160, 0, 160, 0, 0])]));

        store.reset();
        store.advance(snapshot(CounterClass::Nodes, 120, &[(1, &[220, 0, 220, 0, 0])]));
        let out = table(engine.compute(store.pair().unwrap(), 60.0).unwrap());
        // Same warm-up behavior as process start: verbatim values.
        assert_eq!(out.rows[0].values, vec![220.0, 0.0, 220.0, 0.0, 0.0]);
    }
}
