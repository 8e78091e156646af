//! # Real-Time Two-Channel Control
//!
//! Periodic control loop for two actuator channels, driven remotely over a
//! binary frame protocol.
//!
//! ## Key Architecture
//! - **Algorithms:** open loop, proportional, PID and velocity-wrapped variants, stepped once per tick.
//! - **Scheduler:** timer thread fires every period, reads sensors, drives actuators, logs one row.
//! - **Logger:** fixed-capacity circular buffer, snapshot oldest-first, CSV export.
//! - **Protocol:** tagged little-endian frames (string, integer, float, command, acknowledge, matrix).
//! - **Server:** one session thread per TCP connection, each owning its own loop.
//!
//! ## Concurrency
//! - Controller state and log sit behind one `parking_lot::Mutex`.
//! - Timer cancellation over a `crossbeam` channel, sub-millisecond tail via `spin_sleep`.

pub mod config;
pub mod control;
pub mod error;
pub mod hardware;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod utils;

pub use config::Config;
pub use error::{ConfigError, HardwareError, PacketError, TickFault};
