//! Error taxonomy for svcstat.
//!
//! Fatal conditions (transport failures, schema mismatches, bad
//! configuration) terminate the process with a non-zero status. [`Error::NoData`]
//! is a normal termination condition: the storage system correctly reported
//! that there is nothing to show, and the process exits with status zero.
//!
//! The "same interval" condition (two fetches landing inside one sampling
//! period on the storage system) is not an error and is not represented here;
//! see [`crate::delta::Outcome::SameInterval`].

use thiserror::Error;

use crate::schema::CounterClass;

/// All fatal and terminal conditions surfaced by the monitor.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote unreachable, authentication failure, or a remote-side command
    /// error. Fatal; the monitor does not retry transports.
    #[error("transport: {0}")]
    Transport(String),

    /// The storage system has nothing to report (e.g. statistics collection
    /// disabled). Terminates the run with status zero.
    #[error("{0}")]
    NoData(String),

    /// The current and previous snapshots disagree on field layout. This is
    /// a programming or configuration defect and is never recovered.
    #[error("schema mismatch for {class}: expected {expected} value columns, found {found}")]
    SchemaMismatch {
        class: CounterClass,
        expected: usize,
        found: usize,
    },

    /// Invalid configuration detected before or during startup.
    #[error("configuration: {0}")]
    Config(String),

    /// Output stream failure while rendering.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}
