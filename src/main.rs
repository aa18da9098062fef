//! # svcstat
//!
//! Report IBM SVC/Storwize storage system performance statistics as
//! per-interval rates.
//!
//! ## Overview
//!
//! The storage system exposes cumulative performance counters (I/O counts,
//! byte counts, latency accumulators) per node, volume, backend mdisk, and
//! drive. `svcstat` polls those counters over SSH, deltas each pair of
//! consecutive snapshots, and prints per-second rates plus derived mean
//! latencies (ms per I/O) in a fixed-width or CSV table.
//!
//! Statistics collection must be enabled on the storage system first:
//!
//! ```bash
//! svctask startstats -interval <1-60 minutes>
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Volume rates, one line per volume per interval
//! svcstat -C volumes -a 192.0.2.10 -u monitor
//!
//! # Ten node samples as CSV with timestamps
//! svcstat -C nodes -a svc1 -u monitor -s 10 -t -o csv
//! ```
//!
//! ## Module Organization
//!
//! - [`config`]: CLI argument parsing
//! - [`schema`]: field layouts and derived-metric rules per counter class
//! - [`snapshot`]: counter snapshots and the current/previous store
//! - [`delta`]: the counter-to-rate conversion engine
//! - [`source`]: snapshot acquisition over SSH
//! - [`render`]: stat/CSV output
//! - [`app`]: the poll loop

mod app;
mod config;
mod delta;
mod error;
mod render;
mod schema;
mod snapshot;
mod source;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use app::App;
use config::Config;
use error::Error;
use source::SshSource;

fn main() {
    env_logger::init();

    let config = Config::parse();
    let source = SshSource::new(&config.address, &config.user);

    let running = Arc::new(AtomicBool::new(true));
    setup_signal_handler(running.clone());

    let result = App::new(&config, source, std::io::stdout())
        .and_then(|mut app| app.run(&running));

    match result {
        Ok(()) => {}
        // The storage system correctly determined there is nothing to show.
        Err(Error::NoData(message)) => {
            eprintln!("{}", message);
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}

/// Written by the signal handler; nothing else is async-signal-safe here.
static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Install SIGINT/SIGTERM handlers that stop the poll loop cleanly.
fn setup_signal_handler(running: Arc<AtomicBool>) {
    // Bridge thread: the handler may only touch the static flag, so this
    // forwards it into the `running` flag the poll loop watches.
    std::thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            if SIGNAL_RECEIVED.load(Ordering::Relaxed) {
                running.store(false, Ordering::Relaxed);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    });

    unsafe {
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
}

/// Raises the flag; must do nothing that is not async-signal-safe.
extern "C" fn signal_handler(_: i32) {
    SIGNAL_RECEIVED.store(true, Ordering::Relaxed);
}
