//! Field schemas for the supported counter classes.
//!
//! Every counter class (nodes, volumes, mdisks, drives) carries its own
//! ordered list of field descriptors. The schema is fixed for the process
//! lifetime: the delta engine, the transport parser, and the renderer all
//! resolve columns by name through the schema rather than by hardcoded
//! positions, so a reordered field set fails loudly instead of silently
//! producing garbage rates.
//!
//! Accumulator fields (cumulative I/O-time counters) are never shown raw:
//! their column is replaced in the output by the derived mean-latency value
//! described by the class's [`DerivedRule`]s.

use std::fmt;
use std::str::FromStr;

/// Semantic kind of a schema field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldKind {
    /// Instance identifier, unique within a snapshot.
    Identifier,
    /// Sample timestamp assigned by the storage system.
    Timestamp,
    /// Monotonically non-decreasing count, convertible to a per-second rate.
    Counter,
    /// Cumulative time-weighted counter, used only to derive latency.
    Accumulator,
}

/// One field descriptor: the name requested from the storage system and the
/// column label shown in reports.
#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    /// Field name on the storage system (e.g. `ReadIOs`).
    pub name: &'static str,
    /// Column header in rendered output (e.g. `rIO/s`).
    pub label: &'static str,
    /// Semantic kind.
    pub kind: FieldKind,
}

/// A derived-metric rule: divide an accumulator's rate by an ops counter's
/// rate to obtain mean latency per I/O. The result replaces the accumulator's
/// column in the output.
#[derive(Clone, Copy, Debug)]
pub struct DerivedRule {
    /// Name of the accumulator field (the numerator and the target column).
    pub accumulator: &'static str,
    /// Name of the counter field providing the I/O-count denominator.
    pub ops: &'static str,
}

/// Ordered field layout plus derived-metric rules for one counter class.
#[derive(Debug)]
pub struct Schema {
    pub fields: &'static [FieldDef],
    pub derived: &'static [DerivedRule],
}

impl Schema {
    /// Names of all fields in request order, including timestamp and
    /// identifier. Used to build the remote query and validate its header.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Descriptors of the value columns (counters and accumulators), in
    /// schema order. Snapshot rows store one value per entry, same order.
    pub fn value_fields(&self) -> impl Iterator<Item = &FieldDef> + '_ {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Counter | FieldKind::Accumulator))
    }

    /// Number of value columns a well-formed row must carry.
    pub fn value_count(&self) -> usize {
        self.value_fields().count()
    }

    /// Position of a named field among the value columns.
    pub fn value_position(&self, name: &str) -> Option<usize> {
        self.value_fields().position(|f| f.name == name)
    }

    /// Positions of the two most significant counter columns, used by the
    /// render-time zero-suppression filter.
    pub fn primary_counters(&self) -> (usize, usize) {
        let mut counters = self
            .value_fields()
            .enumerate()
            .filter(|(_, f)| f.kind == FieldKind::Counter)
            .map(|(i, _)| i);
        let first = counters.next().unwrap_or(0);
        let second = counters.next().unwrap_or(first);
        (first, second)
    }
}

const NODE_FIELDS: &[FieldDef] = &[
    FieldDef { name: "StatisticTime", label: "Time", kind: FieldKind::Timestamp },
    FieldDef { name: "InstanceID", label: "ID", kind: FieldKind::Identifier },
    FieldDef { name: "ReadIOs", label: "rIO/s", kind: FieldKind::Counter },
    FieldDef { name: "WriteIOs", label: "wIO/s", kind: FieldKind::Counter },
    FieldDef { name: "TotalIOs", label: "tIO/s", kind: FieldKind::Counter },
    FieldDef { name: "ReadHitIOs", label: "rHitIO/s", kind: FieldKind::Counter },
    FieldDef { name: "WriteHitIOs", label: "wHitIO/s", kind: FieldKind::Counter },
];

const VOLUME_FIELDS: &[FieldDef] = &[
    FieldDef { name: "StatisticTime", label: "Time", kind: FieldKind::Timestamp },
    FieldDef { name: "InstanceID", label: "ID", kind: FieldKind::Identifier },
    FieldDef { name: "KBytesRead", label: "rKB/s", kind: FieldKind::Counter },
    FieldDef { name: "KBytesWritten", label: "wKB/s", kind: FieldKind::Counter },
    FieldDef { name: "KBytesTransferred", label: "tKB/s", kind: FieldKind::Counter },
    FieldDef { name: "ReadIOs", label: "rIO/s", kind: FieldKind::Counter },
    FieldDef { name: "WriteIOs", label: "wIO/s", kind: FieldKind::Counter },
    FieldDef { name: "TotalIOs", label: "tIO/s", kind: FieldKind::Counter },
    FieldDef { name: "ReadIOTimeCounter", label: "ms/rIO", kind: FieldKind::Accumulator },
    FieldDef { name: "WriteIOTimeCounter", label: "ms/wIO", kind: FieldKind::Accumulator },
    FieldDef { name: "IOTimeCounter", label: "ms/tIO", kind: FieldKind::Accumulator },
    FieldDef { name: "ReadHitIOs", label: "rHitIO/s", kind: FieldKind::Counter },
    FieldDef { name: "WriteHitIOs", label: "wHitIO/s", kind: FieldKind::Counter },
];

const MDISK_FIELDS: &[FieldDef] = &[
    FieldDef { name: "StatisticTime", label: "Time", kind: FieldKind::Timestamp },
    FieldDef { name: "InstanceID", label: "ID", kind: FieldKind::Identifier },
    FieldDef { name: "KBytesRead", label: "rKB/s", kind: FieldKind::Counter },
    FieldDef { name: "KBytesWritten", label: "wKB/s", kind: FieldKind::Counter },
    FieldDef { name: "KBytesTransferred", label: "tKB/s", kind: FieldKind::Counter },
    FieldDef { name: "ReadIOs", label: "rIO/s", kind: FieldKind::Counter },
    FieldDef { name: "WriteIOs", label: "wIO/s", kind: FieldKind::Counter },
    FieldDef { name: "TotalIOs", label: "tIO/s", kind: FieldKind::Counter },
    FieldDef { name: "ReadIOTimeCounter", label: "ms/rIO", kind: FieldKind::Accumulator },
    FieldDef { name: "WriteIOTimeCounter", label: "ms/wIO", kind: FieldKind::Accumulator },
    FieldDef { name: "IOTimeCounter", label: "ms/tIO", kind: FieldKind::Accumulator },
];

const DRIVE_FIELDS: &[FieldDef] = &[
    FieldDef { name: "StatisticTime", label: "Time", kind: FieldKind::Timestamp },
    FieldDef { name: "InstanceID", label: "ID", kind: FieldKind::Identifier },
    FieldDef { name: "KBytesRead", label: "rKB/s", kind: FieldKind::Counter },
    FieldDef { name: "KBytesWritten", label: "wKB/s", kind: FieldKind::Counter },
    FieldDef { name: "KBytesTransferred", label: "tKB/s", kind: FieldKind::Counter },
    FieldDef { name: "ReadIOs", label: "rIO/s", kind: FieldKind::Counter },
    FieldDef { name: "WriteIOs", label: "wIO/s", kind: FieldKind::Counter },
    FieldDef { name: "TotalIOs", label: "tIO/s", kind: FieldKind::Counter },
];

const IO_TIME_RULES: &[DerivedRule] = &[
    DerivedRule { accumulator: "ReadIOTimeCounter", ops: "ReadIOs" },
    DerivedRule { accumulator: "WriteIOTimeCounter", ops: "WriteIOs" },
    DerivedRule { accumulator: "IOTimeCounter", ops: "TotalIOs" },
];

static NODE_SCHEMA: Schema = Schema { fields: NODE_FIELDS, derived: &[] };
static VOLUME_SCHEMA: Schema = Schema { fields: VOLUME_FIELDS, derived: IO_TIME_RULES };
static MDISK_SCHEMA: Schema = Schema { fields: MDISK_FIELDS, derived: IO_TIME_RULES };
static DRIVE_SCHEMA: Schema = Schema { fields: DRIVE_FIELDS, derived: &[] };

/// Category of performance entity on the storage system.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CounterClass {
    /// Cluster nodes.
    Nodes,
    /// Host-facing volumes (vdisks).
    Volumes,
    /// Backend managed disks.
    Mdisks,
    /// Internal drives.
    Drives,
}

impl CounterClass {
    /// The fixed field layout for this class.
    pub fn schema(&self) -> &'static Schema {
        match self {
            CounterClass::Nodes => &NODE_SCHEMA,
            CounterClass::Volumes => &VOLUME_SCHEMA,
            CounterClass::Mdisks => &MDISK_SCHEMA,
            CounterClass::Drives => &DRIVE_SCHEMA,
        }
    }

    /// Statistics dump command on the storage system CLI.
    pub fn stats_command(&self) -> &'static str {
        match self {
            CounterClass::Nodes => "lsnodestats",
            CounterClass::Volumes => "lsvdiskstats",
            CounterClass::Mdisks => "lsmdiskstats",
            CounterClass::Drives => "lsdrivestats",
        }
    }
}

impl fmt::Display for CounterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CounterClass::Nodes => "nodes",
            CounterClass::Volumes => "volumes",
            CounterClass::Mdisks => "mdisks",
            CounterClass::Drives => "drives",
        };
        f.write_str(name)
    }
}

impl FromStr for CounterClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nodes" | "node" => Ok(CounterClass::Nodes),
            "volumes" | "volume" | "vdisks" => Ok(CounterClass::Volumes),
            "mdisks" | "mdisk" | "backend" => Ok(CounterClass::Mdisks),
            "drives" | "drive" => Ok(CounterClass::Drives),
            _ => Err(format!(
                "invalid counter class: {}. Valid options: nodes, volumes, mdisks, drives",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_schema_reserves_timestamp_and_identifier() {
        for class in [
            CounterClass::Nodes,
            CounterClass::Volumes,
            CounterClass::Mdisks,
            CounterClass::Drives,
        ] {
            let schema = class.schema();
            let kinds: Vec<FieldKind> = schema.fields.iter().map(|f| f.kind).collect();
            assert_eq!(kinds[0], FieldKind::Timestamp, "{class}");
            assert_eq!(kinds[1], FieldKind::Identifier, "{class}");
            assert_eq!(
                kinds.iter().filter(|k| **k == FieldKind::Timestamp).count(),
                1
            );
            assert_eq!(
                kinds.iter().filter(|k| **k == FieldKind::Identifier).count(),
                1
            );
        }
    }

    #[test]
    fn value_positions_resolve_by_name() {
        let schema = CounterClass::Volumes.schema();
        assert_eq!(schema.value_position("KBytesRead"), Some(0));
        assert_eq!(schema.value_position("ReadIOs"), Some(3));
        assert_eq!(schema.value_position("ReadIOTimeCounter"), Some(6));
        assert_eq!(schema.value_position("StatisticTime"), None);
        assert_eq!(schema.value_position("NoSuchField"), None);
        assert_eq!(schema.value_count(), 11);
    }

    #[test]
    fn derived_rules_reference_existing_fields() {
        for class in [CounterClass::Volumes, CounterClass::Mdisks] {
            let schema = class.schema();
            for rule in schema.derived {
                assert!(schema.value_position(rule.accumulator).is_some());
                assert!(schema.value_position(rule.ops).is_some());
            }
        }
    }

    #[test]
    fn node_and_drive_schemas_have_no_accumulators() {
        for class in [CounterClass::Nodes, CounterClass::Drives] {
            let schema = class.schema();
            assert!(schema.derived.is_empty());
            assert!(schema.value_fields().all(|f| f.kind == FieldKind::Counter));
        }
    }

    #[test]
    fn primary_counters_are_the_first_two() {
        let (a, b) = CounterClass::Volumes.schema().primary_counters();
        assert_eq!((a, b), (0, 1));
        let (a, b) = CounterClass::Nodes.schema().primary_counters();
        assert_eq!((a, b), (0, 1));
    }

    #[test]
    fn class_parses_from_cli_spelling() {
        assert_eq!("volumes".parse::<CounterClass>().unwrap(), CounterClass::Volumes);
        assert_eq!("MDISK".parse::<CounterClass>().unwrap(), CounterClass::Mdisks);
        assert!("tapes".parse::<CounterClass>().is_err());
    }
}
