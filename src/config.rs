//! Command-line configuration for svcstat.
//!
//! This module defines all CLI arguments using `clap` for parsing.
//! The configuration selects the counter class to report, the target
//! storage system, the report interval, and the output presentation.

use clap::Parser;

use crate::render::OutputFormat;
use crate::schema::CounterClass;

/// Storage system performance statistics monitor.
///
/// svcstat periodically queries an IBM SVC/Storwize storage system for
/// cumulative performance counters and reports per-second rates for the
/// selected counter class: cluster nodes, volumes, backend mdisks, or
/// internal drives.
///
/// Statistics collection must be enabled on the storage system first:
///
/// ```text
/// svctask startstats -interval <1-60 minutes>
/// ```
///
/// Authentication uses the system ssh client (keys or agent); no password
/// prompt is ever issued.
///
/// # Examples
///
/// ```bash
/// # Volume rates every 5 minutes, forever
/// svcstat -C volumes -a 192.0.2.10 -u monitor
///
/// # Ten node samples as CSV, with timestamps
/// svcstat -C nodes -a svc1 -u monitor -s 10 -t -o csv
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Report storage system performance statistics as per-interval rates")]
pub struct Config {
    /// Counter class to report: nodes, volumes, mdisks, or drives.
    #[arg(short = 'C', long = "class")]
    pub class: CounterClass,

    /// IP address or DNS name of the storage system.
    #[arg(short = 'a', long)]
    pub address: String,

    /// User name on the storage system.
    #[arg(short = 'u', long)]
    pub user: String,

    /// Report interval in seconds.
    ///
    /// Must not be shorter than the statistics frequency configured on the
    /// storage system; shorter values are clamped to it with a warning.
    /// The default of 0 means "use the storage system's own frequency".
    #[arg(short = 'f', long, default_value_t = 0)]
    pub interval: u64,

    /// Stop after this many samples (default: run until interrupted).
    #[arg(short = 's', long)]
    pub samples: Option<u64>,

    /// Report only these instance ids (may be given multiple times).
    #[arg(short = 'i', long = "instance")]
    pub instances: Vec<u64>,

    /// Disable column headers.
    #[arg(short = 'H', long)]
    pub no_header: bool,

    /// Show the sample timestamp assigned by the storage system.
    #[arg(short = 't', long)]
    pub timestamps: bool,

    /// Show rows whose leading counters are all zero.
    ///
    /// By default, instances that did no I/O this interval are omitted
    /// from the report.
    #[arg(short = 'z', long)]
    pub show_zero: bool,

    /// Output format style: stat (fixed-width columns) or csv.
    #[arg(short = 'o', long, default_value = "stat")]
    pub output: OutputFormat,
}
