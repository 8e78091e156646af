//! echo.rs
//! Status echo observers for the control loop.
//!
//! The scheduler reports a header on start, a compact line every `echo_divisor` ticks
//! and a flush on stop. `ConsoleEcho` rewrites one terminal line in place;
//! `MemoryEcho` keeps everything for inspection.

use std::io::{Write, stdout};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoColumn {
    Encoder,
    Velocity,
}

/// Per-channel header entry: channel number plus which value is echoed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoHeader {
    pub channel: usize,
    pub column: EchoColumn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoChannel {
    pub column: EchoColumn,
    pub value: f64,
    pub reference: f64,
    pub actuation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EchoLine {
    pub timestamp: f64,
    pub channels: Vec<EchoChannel>,
}

pub trait EchoSink: Send + Sync {
    fn header(&self, channels: &[EchoHeader]);
    fn line(&self, line: &EchoLine);
    fn flush(&self);
}

pub fn format_header(channels: &[EchoHeader]) -> String {
    let mut out = String::from("          TIME");
    for h in channels {
        let label = match h.column {
            EchoColumn::Encoder => "ENC",
            EchoColumn::Velocity => "VEL",
        };
        out.push_str(&format!(
            "       {label}{n}   REF{n}   PWM{n}",
            n = h.channel
        ));
    }
    out
}

pub fn format_line(line: &EchoLine) -> String {
    let mut out = format!("  {:12.4}", line.timestamp);
    for ch in &line.channels {
        match ch.column {
            EchoColumn::Velocity => {
                out.push_str(&format!(" {:+10.1}", ch.value));
            }
            EchoColumn::Encoder => {
                out.push_str(&format!(" {:10.0}", ch.value));
            }
        }
        out.push_str(&format!(" {:+6.1} {:+6.1}", ch.reference, ch.actuation));
    }
    out
}

/// Terminal echo: the status line is rewritten in place with '\r'.
#[derive(Debug, Default)]
pub struct ConsoleEcho;

impl EchoSink for ConsoleEcho {
    fn header(&self, channels: &[EchoHeader]) {
        println!("{}", format_header(channels));
    }

    fn line(&self, line: &EchoLine) {
        let mut out = stdout().lock();
        let _ = write!(out, "\r{}", format_line(line));
        let _ = out.flush();
    }

    fn flush(&self) {
        println!("\n");
    }
}

/// Records every echo event.
#[derive(Debug, Default)]
pub struct MemoryEcho {
    headers: Mutex<Vec<Vec<EchoHeader>>>,
    lines: Mutex<Vec<EchoLine>>,
    flushes: Mutex<usize>,
}

impl MemoryEcho {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> Vec<Vec<EchoHeader>> {
        self.headers.lock().clone()
    }

    pub fn lines(&self) -> Vec<EchoLine> {
        self.lines.lock().clone()
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.lock()
    }
}

impl EchoSink for MemoryEcho {
    fn header(&self, channels: &[EchoHeader]) {
        self.headers.lock().push(channels.to_vec());
    }

    fn line(&self, line: &EchoLine) {
        self.lines.lock().push(line.clone());
    }

    fn flush(&self) {
        *self.flushes.lock() += 1;
    }
}
