//! Error types shared across the control framework.
//!
//! Framing errors end a client session, configuration errors fail construction,
//! and tick faults are counted and logged by the scheduler without stopping it.

use std::io;
use thiserror::Error;

/// Stream-level failures while reading or writing packet frames.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("frame truncated while reading {0}")]
    Truncated(&'static str),

    #[error("unknown frame tag {0:#04x}")]
    UnknownTag(u8),

    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("payload of {len} bytes exceeds limit of {max}")]
    Oversized { len: usize, max: usize },

    #[error("code {0:?} does not fit in one byte")]
    InvalidCode(char),

    #[error("expected acknowledge, received '{0}' frame")]
    UnexpectedFrame(char),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PacketError {
    /// True when the peer went away cleanly between frames.
    pub fn is_closed(&self) -> bool {
        matches!(self, PacketError::ConnectionClosed)
    }
}

/// Invalid construction parameters. Never recovered at runtime.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("period must be positive, got {0} s")]
    NonPositivePeriod(f64),

    #[error("log duration must be positive, got {0} s")]
    InvalidLogDuration(f64),

    #[error("log of {rows} rows exceeds limit of {max}")]
    LogTooLarge { rows: f64, max: usize },

    #[error("model dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("order of state ({got}) must match order of model ({expected})")]
    StateOrder { expected: usize, got: usize },

    #[error("failed to read config {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Failures reported by the sensor/actuator collaborator.
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("sensor read failed: {0}")]
    SensorRead(String),
}

/// A fault inside one tick body. The tick is skipped (wholly or per channel)
/// and the loop keeps running.
#[derive(Debug, Error)]
pub enum TickFault {
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("channel {channel} produced non-finite actuation {value}")]
    NonFinite { channel: usize, value: f64 },

    #[error("tick body panicked: {0}")]
    Panicked(String),
}
