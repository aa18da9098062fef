//! Snapshot acquisition from the storage system.
//!
//! [`SnapshotSource`] is the transport seam: given a counter class and an
//! optional instance filter it returns one timestamped table of cumulative
//! counters, or `None` when the storage system currently has nothing to
//! report. `None` is distinct from a transport failure.
//!
//! [`SshSource`] is the production implementation. It executes the
//! controller's stats-dump CLI through the system `ssh` client (key or agent
//! authentication, `BatchMode` so it never prompts) and parses the delimited
//! table it prints: one header line naming the columns, then one line per
//! instance. The header is validated against the class schema so a firmware
//! that reorders columns fails loudly.

use std::process::Command;

use chrono::NaiveDateTime;
use log::debug;

use crate::error::Error;
use crate::schema::{CounterClass, FieldKind};
use crate::snapshot::{Row, Snapshot};

/// Statistic times come back as `YYYYMMDDHHMMSS`, optionally with a
/// fractional-seconds suffix.
const STATISTIC_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// General controller information gathered before the poll loop starts.
#[derive(Clone, Debug)]
pub struct SystemInfo {
    /// Cluster name.
    pub name: String,
    /// Firmware code level.
    pub code_level: String,
    /// Whether performance statistics collection is enabled.
    pub stats_enabled: bool,
    /// The controller's own sampling interval, in minutes.
    pub stats_frequency_min: u64,
}

/// Produces timestamped counter tables for a counter class.
pub trait SnapshotSource {
    /// Query general controller info (statistics frequency and status).
    fn system_info(&mut self) -> Result<SystemInfo, Error>;

    /// Fetch one snapshot. `Ok(None)` means the controller has nothing to
    /// report for this class right now.
    fn fetch(
        &mut self,
        class: CounterClass,
        instances: Option<&[u64]>,
    ) -> Result<Option<Snapshot>, Error>;
}

/// Snapshot source backed by the system `ssh` client.
pub struct SshSource {
    target: String,
    user: String,
    delimiter: char,
}

impl SshSource {
    pub fn new(target: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            user: user.into(),
            delimiter: ',',
        }
    }

    /// Execute a command on the controller and return its stdout.
    fn run(&self, command: &str) -> Result<String, Error> {
        debug!("ssh {}@{}: {}", self.user, self.target, command);
        let output = Command::new("ssh")
            .args(["-o", "BatchMode=yes"])
            .arg(format!("{}@{}", self.user, self.target))
            .arg(command)
            .output()
            .map_err(|e| {
                Error::Transport(format!(
                    "{}@{}: failed to invoke ssh: {}",
                    self.user, self.target, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Transport(format!(
                "{}@{}: \"{}\" failed: {}",
                self.user,
                self.target,
                command,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SnapshotSource for SshSource {
    fn system_info(&mut self) -> Result<SystemInfo, Error> {
        let raw = self.run(&format!("lssystem -delim {}", self.delimiter))?;
        parse_system_info(&raw, self.delimiter)
    }

    fn fetch(
        &mut self,
        class: CounterClass,
        instances: Option<&[u64]>,
    ) -> Result<Option<Snapshot>, Error> {
        let mut command = format!("{} -delim {}", class.stats_command(), self.delimiter);
        if let Some(ids) = instances {
            for id in ids {
                command.push(' ');
                command.push_str(&id.to_string());
            }
        }
        let raw = self.run(&command)?;
        parse_stats(class, &raw, self.delimiter)
    }
}

/// Parse `lssystem` key/value output.
fn parse_system_info(raw: &str, delimiter: char) -> Result<SystemInfo, Error> {
    let mut name = String::new();
    let mut code_level = String::new();
    let mut stats_enabled = None;
    let mut stats_frequency_min = None;

    for line in raw.lines() {
        let Some((key, value)) = line.split_once(delimiter) else {
            continue;
        };
        match key.trim() {
            "name" => name = value.trim().to_string(),
            "code_level" => code_level = value.trim().to_string(),
            "statistics_status" => stats_enabled = Some(value.trim() == "on"),
            "statistics_frequency" => {
                let minutes = value.trim().parse::<u64>().map_err(|_| {
                    Error::Transport(format!("invalid statistics_frequency: {}", value.trim()))
                })?;
                stats_frequency_min = Some(minutes);
            }
            _ => {}
        }
    }

    match (stats_enabled, stats_frequency_min) {
        (Some(stats_enabled), Some(stats_frequency_min)) => Ok(SystemInfo {
            name,
            code_level,
            stats_enabled,
            stats_frequency_min,
        }),
        _ => Err(Error::Transport(
            "lssystem output is missing statistics_status or statistics_frequency".into(),
        )),
    }
}

/// Parse a delimited stats table into a snapshot, validating the header
/// against the class schema.
fn parse_stats(
    class: CounterClass,
    raw: &str,
    delimiter: char,
) -> Result<Option<Snapshot>, Error> {
    let schema = class.schema();
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());

    let Some(header) = lines.next() else {
        return Ok(None);
    };
    let columns: Vec<&str> = header.split(delimiter).map(str::trim).collect();
    let expected: Vec<&str> = schema.field_names().collect();
    if columns != expected {
        return Err(Error::Transport(format!(
            "{}: unexpected column layout: got [{}], expected [{}]",
            class,
            columns.join(" "),
            expected.join(" ")
        )));
    }

    let mut rows = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for line in lines {
        let tokens: Vec<&str> = line.split(delimiter).map(str::trim).collect();
        if tokens.len() != schema.fields.len() {
            return Err(Error::Transport(format!(
                "{}: row has {} columns, expected {}: {}",
                class,
                tokens.len(),
                schema.fields.len(),
                line
            )));
        }

        let mut id = 0u64;
        let mut time = None;
        let mut values = Vec::with_capacity(schema.value_count());
        for (field, token) in schema.fields.iter().zip(tokens) {
            match field.kind {
                FieldKind::Timestamp => time = Some(parse_statistic_time(token)?),
                FieldKind::Identifier => id = parse_instance_id(token)?,
                FieldKind::Counter | FieldKind::Accumulator => {
                    let value = token.parse::<u64>().map_err(|_| {
                        Error::Transport(format!(
                            "{}: non-numeric value for {}: {}",
                            class, field.name, token
                        ))
                    })?;
                    values.push(value);
                }
            }
        }

        if !seen.insert(id) {
            return Err(Error::Transport(format!(
                "{}: duplicate instance id {} in one snapshot",
                class, id
            )));
        }
        let time = time.ok_or_else(|| {
            Error::Transport(format!("{}: row is missing a statistic time", class))
        })?;
        rows.push(Row { id, time, values });
    }

    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(Snapshot { class, rows }))
}

/// Parse a statistic time, tolerating a fractional-seconds suffix.
fn parse_statistic_time(token: &str) -> Result<NaiveDateTime, Error> {
    let whole = token.split('.').next().unwrap_or(token);
    NaiveDateTime::parse_from_str(whole, STATISTIC_TIME_FORMAT)
        .map_err(|_| Error::Transport(format!("invalid statistic time: {}", token)))
}

/// Instance ids arrive either bare (`3`) or prefixed with the statistics
/// group (`NodeStats 3`); the trailing token is the id.
fn parse_instance_id(token: &str) -> Result<u64, Error> {
    token
        .split_whitespace()
        .last()
        .and_then(|t| t.parse::<u64>().ok())
        .ok_or_else(|| Error::Transport(format!("invalid instance id: {}", token)))
}
