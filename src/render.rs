//! Report rendering.
//!
//! Purely presentational: the renderer receives a finished rate table plus
//! the active schema and writes either the classic fixed-width `stat` layout
//! (19-character timestamp, 6-character id, 16-character value columns) or a
//! CSV stream. It performs no computation and never touches stored state.
//!
//! Zero suppression is a render-time policy: when enabled, rows whose two
//! most significant counter columns are both zero are omitted from the
//! output.

use std::io::{self, Write};
use std::str::FromStr;

use crate::delta::{RateRow, RateTable};
use crate::schema::Schema;

/// Display timestamps as `YYYY-MM-DD HH:MM:SS`.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output style.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutputFormat {
    /// Fixed-width columns, header re-printed per sample.
    Stat,
    /// Comma-separated values, header written once.
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stat" => Ok(OutputFormat::Stat),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("invalid output format: {}. Valid options: stat, csv", s)),
        }
    }
}

/// Presentation switches, fixed at construction.
#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    /// Suppress the column header line(s).
    pub skip_header: bool,
    /// Include the storage-side sample timestamp column.
    pub show_time: bool,
    /// Omit rows whose two most significant counters are both zero.
    pub suppress_zero: bool,
}

enum Sink<W: Write> {
    Stat(W),
    Csv(Box<csv::Writer<W>>),
}

/// Writes rate tables to a terminal or delimited stream.
pub struct Renderer<W: Write> {
    schema: &'static Schema,
    options: RenderOptions,
    sink: Sink<W>,
    header_written: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(
        schema: &'static Schema,
        format: OutputFormat,
        options: RenderOptions,
        out: W,
    ) -> Self {
        let sink = match format {
            OutputFormat::Stat => Sink::Stat(out),
            OutputFormat::Csv => Sink::Csv(Box::new(csv::Writer::from_writer(out))),
        };
        Self {
            schema,
            options,
            sink,
            header_written: false,
        }
    }

    /// Render one sample's rate table.
    pub fn render(&mut self, table: &RateTable) -> io::Result<()> {
        let (zero_a, zero_b) = self.schema.primary_counters();
        let suppress_zero = self.options.suppress_zero;
        let rows: Vec<&RateRow> = table
            .rows
            .iter()
            .filter(|row| {
                !(suppress_zero && row.values[zero_a] == 0.0 && row.values[zero_b] == 0.0)
            })
            .collect();

        if matches!(self.sink, Sink::Stat(_)) {
            self.render_stat(&rows)
        } else {
            self.render_csv(&rows)
        }
    }

    fn render_stat(&mut self, rows: &[&RateRow]) -> io::Result<()> {
        let labels: Vec<&str> = self.schema.value_fields().map(|f| f.label).collect();
        let show_time = self.options.show_time;
        let skip_header = self.options.skip_header;
        let Sink::Stat(out) = &mut self.sink else {
            unreachable!("stat renderer with csv sink")
        };

        if !skip_header {
            let mut header = String::new();
            if show_time {
                header.push_str(&format!("{:>19}", "Time"));
            }
            header.push_str(&format!("{:>6}", "ID"));
            for label in &labels {
                header.push_str(&format!("{:>16}", label));
            }
            writeln!(out, "{}", header)?;
        }

        for row in rows {
            let mut line = String::new();
            if show_time {
                line.push_str(&format!("{:19}", row.time.format(TIME_FORMAT).to_string()));
            }
            line.push_str(&format!("{:6}", row.id));
            for value in &row.values {
                line.push_str(&format!("{:16.2}", value));
            }
            writeln!(out, "{}", line)?;
        }
        out.flush()
    }

    fn render_csv(&mut self, rows: &[&RateRow]) -> io::Result<()> {
        let labels: Vec<&str> = self.schema.value_fields().map(|f| f.label).collect();
        let show_time = self.options.show_time;
        let write_header = !self.header_written && !self.options.skip_header;
        let Sink::Csv(writer) = &mut self.sink else {
            unreachable!("csv renderer with stat sink")
        };

        // CSV gets its header exactly once, not per sample.
        if write_header {
            let mut header = Vec::new();
            if show_time {
                header.push("Time".to_string());
            }
            header.push("ID".to_string());
            header.extend(labels.iter().map(|l| l.to_string()));
            writer.write_record(&header).map_err(io::Error::other)?;
            self.header_written = true;
        }

        for row in rows {
            let mut record = Vec::new();
            if show_time {
                record.push(row.time.format(TIME_FORMAT).to_string());
            }
            record.push(row.id.to_string());
            record.extend(row.values.iter().map(|v| format!("{:.2}", v)));
            writer.write_record(&record).map_err(io::Error::other)?;
        }
        writer.flush()
    }
}
