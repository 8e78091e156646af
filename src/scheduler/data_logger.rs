//! data_logger.rs
//! Fixed-capacity circular log of per-tick rows.
//!
//! Capacity is floor(duration / period) rows, bounded so a full snapshot still fits in
//! one matrix frame. Writes wrap at capacity and bump `page`; once wrapped, chronological
//! order is rows[current..] followed by rows[..current].

use std::{io::Write, time::Instant};

use serde::Serialize;

use crate::error::ConfigError;
use crate::protocol::packet::MAX_MATRIX_ELEMENTS;

/// Number of columns in a log row (time + 3 per channel).
pub const LOG_COLUMNS: usize = 7;
/// Largest log a client can request.
pub const MAX_LOG_ROWS: usize = MAX_MATRIX_ELEMENTS / LOG_COLUMNS;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LogRow {
    pub timestamp: f64,
    pub measurement1: f64,
    pub reference1: f64,
    pub actuation1: f64,
    pub measurement2: f64,
    pub reference2: f64,
    pub actuation2: f64,
}

impl LogRow {
    pub fn to_array(&self) -> [f64; LOG_COLUMNS] {
        [
            self.timestamp,
            self.measurement1,
            self.reference1,
            self.actuation1,
            self.measurement2,
            self.reference2,
            self.actuation2,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct DataLogger {
    rows: Vec<LogRow>,
    current: usize,
    page: u64,
    time_origin: Instant,
}

impl DataLogger {
    /// Allocate `floor(duration / period)` rows (at least one).
    pub fn new(duration: f64, period: f64) -> Result<Self, ConfigError> {
        let mut logger = Self {
            rows: Vec::new(),
            current: 0,
            page: 0,
            time_origin: Instant::now(),
        };
        logger.set_capacity(duration, period)?;
        Ok(logger)
    }

    /// Reallocate storage for `duration` seconds of data and reset pointers.
    /// On error the current storage is left untouched.
    pub fn set_capacity(&mut self, duration: f64, period: f64) -> Result<(), ConfigError> {
        let capacity = capacity_for(duration, period)?;
        self.rows = vec![LogRow::default(); capacity];
        self.reset();
        Ok(())
    }

    /// Zero the write cursor and page count and restart the time origin.
    /// Storage is kept.
    pub fn reset(&mut self) {
        self.current = 0;
        self.page = 0;
        self.time_origin = Instant::now();
    }

    /// Seconds elapsed since the last reset.
    pub fn elapsed(&self) -> f64 {
        self.time_origin.elapsed().as_secs_f64()
    }

    pub fn append(&mut self, row: LogRow) {
        self.rows[self.current] = row;
        if self.current + 1 < self.rows.len() {
            self.current += 1;
        } else {
            self.current = 0;
            self.page += 1;
        }
    }

    /// Rows oldest to newest.
    pub fn snapshot(&self) -> Vec<LogRow> {
        if self.page == 0 {
            self.rows[..self.current].to_vec()
        } else {
            let mut out = Vec::with_capacity(self.rows.len());
            out.extend_from_slice(&self.rows[self.current..]);
            out.extend_from_slice(&self.rows[..self.current]);
            out
        }
    }

    pub fn len(&self) -> usize {
        if self.page == 0 { self.current } else { self.rows.len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.rows.len()
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Write the snapshot as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        write_rows_csv(&self.snapshot(), writer)
    }
}

/// Rows needed for `duration` seconds at `period`, at least one.
pub fn capacity_for(duration: f64, period: f64) -> Result<usize, ConfigError> {
    // tolerance keeps e.g. 0.3 / 0.1 from flooring to 2
    let rows = (duration / period + 1e-9).floor();
    if !(rows <= MAX_LOG_ROWS as f64) {
        return Err(ConfigError::LogTooLarge { rows, max: MAX_LOG_ROWS });
    }
    Ok((rows as usize).max(1))
}

pub fn write_rows_csv<W: Write>(rows: &[LogRow], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
