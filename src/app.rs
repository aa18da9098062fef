//! Poll loop driver for svcstat.
//!
//! The [`App`] owns one snapshot store, one delta engine, and one renderer
//! for the selected counter class and drives the cycle:
//! fetch -> advance store -> compute delta -> render -> sleep.
//!
//! The first iteration is the warm-up (no previous snapshot, raw values);
//! every iteration thereafter reports rates. When a fetch lands inside the
//! same sampling period as the previous one, the cycle refetches after a
//! short pause without consuming the sample budget and without touching the
//! stored baseline.
//!
//! Everything runs single-threaded and sequentially: one outstanding remote
//! call at a time, no step overlapping the next.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::Config;
use crate::delta::{DeltaEngine, Outcome, RateTable};
use crate::error::Error;
use crate::render::{RenderOptions, Renderer};
use crate::schema::CounterClass;
use crate::snapshot::{Snapshot, SnapshotPair, SnapshotStore};
use crate::source::SnapshotSource;

/// Pause between refetches while waiting for the storage system to cross a
/// sampling-interval boundary. The shortest configurable statistics
/// frequency is one minute, so a few seconds is plenty granular.
const SAME_INTERVAL_RETRY: Duration = Duration::from_secs(5);

/// Poll cycles sleep in short slices so a termination signal is honored
/// promptly even with multi-minute report intervals.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Main application state for one monitored counter class.
pub struct App<S: SnapshotSource, W: Write> {
    class: CounterClass,
    /// Requested report interval in seconds; 0 means "use the storage
    /// system's own statistics frequency".
    requested_interval: u64,
    samples: Option<u64>,
    instances: Vec<u64>,
    source: S,
    store: SnapshotStore,
    engine: DeltaEngine,
    renderer: Renderer<W>,
    retry_delay: Duration,
}

impl<S: SnapshotSource, W: Write> App<S, W> {
    pub fn new(config: &Config, source: S, out: W) -> Result<Self, Error> {
        let engine = DeltaEngine::new(config.class)?;
        let renderer = Renderer::new(
            config.class.schema(),
            config.output,
            RenderOptions {
                skip_header: config.no_header,
                show_time: config.timestamps,
                suppress_zero: !config.show_zero,
            },
            out,
        );
        Ok(Self {
            class: config.class,
            requested_interval: config.interval,
            samples: config.samples,
            instances: config.instances.clone(),
            source,
            store: SnapshotStore::new(),
            engine,
            renderer,
            retry_delay: SAME_INTERVAL_RETRY,
        })
    }

    /// Run the poll loop until the sample budget is exhausted or `running`
    /// is cleared by the signal handler.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), Error> {
        let interval = self.effective_interval()?;
        let mut remaining = self.samples;
        if remaining == Some(0) {
            return Ok(());
        }

        while running.load(Ordering::Relaxed) {
            let snapshot = self.fetch()?;
            self.store.advance(snapshot);

            let Some(table) = self.compute(running, interval)? else {
                break;
            };
            self.renderer.render(&table)?;

            if let Some(count) = remaining.as_mut() {
                *count -= 1;
                if *count == 0 {
                    debug!("sample limit reached");
                    break;
                }
            }
            if !sleep_while_running(running, Duration::from_secs(interval)) {
                break;
            }
        }

        Ok(())
    }

    /// Query the storage system and reconcile the report interval with its
    /// statistics settings.
    fn effective_interval(&mut self) -> Result<u64, Error> {
        let system = self.source.system_info()?;
        if !system.stats_enabled {
            return Err(Error::NoData(format!(
                "Statistics collection is turned off on {}.\n\
                 Enable it first: \"svctask startstats -interval <1-60 minutes>\"",
                system.name
            )));
        }

        let frequency = system.stats_frequency_min * 60;
        let interval = if self.requested_interval == 0 {
            info!(
                "{} ({}): using the statistics frequency of {} min",
                system.name, system.code_level, system.stats_frequency_min
            );
            frequency
        } else if self.requested_interval < frequency || self.requested_interval > 3600 {
            // A report interval below the sampling frequency would delta
            // within one remote sample; surface the misconfiguration.
            warn!(
                "report interval {}s is invalid for a statistics frequency of {} min; using {}s",
                self.requested_interval, system.stats_frequency_min, frequency
            );
            frequency
        } else {
            self.requested_interval
        };
        Ok(interval)
    }

    /// Compute one rate table, refetching through same-interval conditions.
    /// Returns `None` only when interrupted.
    fn compute(
        &mut self,
        running: &AtomicBool,
        interval: u64,
    ) -> Result<Option<RateTable>, Error> {
        loop {
            let outcome = match self.store.pair() {
                Some(pair) => {
                    let interval_secs = elapsed_secs(pair).unwrap_or(interval as f64);
                    self.engine.compute(pair, interval_secs)?
                }
                None => return Ok(None),
            };

            match outcome {
                Outcome::Table(table) => return Ok(Some(table)),
                Outcome::SameInterval => {
                    debug!(
                        "{}: still inside one sampling period, refetching",
                        self.class
                    );
                    if !sleep_while_running(running, self.retry_delay) {
                        return Ok(None);
                    }
                    let snapshot = self.fetch()?;
                    // Only the current slot moves; the baseline must survive
                    // the retry so the eventual delta spans a real interval.
                    self.store.replace_current(snapshot);
                }
            }
        }
    }

    fn fetch(&mut self) -> Result<Snapshot, Error> {
        let filter = if self.instances.is_empty() {
            None
        } else {
            Some(self.instances.as_slice())
        };
        self.source
            .fetch(self.class, filter)?
            .ok_or_else(|| Error::NoData(format!("There is no data to collect for: {}", self.class)))
    }
}

/// Elapsed seconds between the pair's sample timestamps, when usable.
fn elapsed_secs(pair: SnapshotPair<'_>) -> Option<f64> {
    let current = pair.current.sample_time()?;
    let previous = pair.previous?.sample_time()?;
    let secs = (current - previous).num_seconds();
    (secs > 0).then_some(secs as f64)
}

/// Sleep in slices, returning false as soon as `running` is cleared.
fn sleep_while_running(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}
