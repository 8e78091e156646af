//! io.rs
//! Sensor/actuator collaborator used by the loop scheduler.
//!
//! A real deployment binds `SensorActuator` to encoders, potentiometers and motor drivers.
//! `RandomIo` stands in for the hardware with uniformly random readings.

use parking_lot::Mutex;
use rand::random_range;

use crate::error::HardwareError;

/// Encoder count range of the stub (inclusive upper bound).
pub const ENCODER_MAX: i64 = 65_355;
/// Potentiometer ADC range of the stub (12 bit).
pub const POT_MAX: i64 = 4_095;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    One,
    Two,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::One, ChannelId::Two];

    pub fn index(self) -> usize {
        match self {
            ChannelId::One => 0,
            ChannelId::Two => 1,
        }
    }

    pub fn number(self) -> usize {
        self.index() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// Negative values drive in reverse; zero and positive drive forward.
    pub fn from_sign(value: f64) -> Self {
        if value < 0.0 { Direction::Reverse } else { Direction::Forward }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }
}

/// One sample of both channels: encoder counts and potentiometer readings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub encoder1: f64,
    pub pot1: f64,
    pub encoder2: f64,
    pub pot2: f64,
}

impl SensorReading {
    pub fn encoder(&self, channel: ChannelId) -> f64 {
        match channel {
            ChannelId::One => self.encoder1,
            ChannelId::Two => self.encoder2,
        }
    }

    pub fn pot(&self, channel: ChannelId) -> f64 {
        match channel {
            ChannelId::One => self.pot1,
            ChannelId::Two => self.pot2,
        }
    }
}

/// Physical sensor and actuator access. Called from the timer thread and from
/// sessions, so implementations synchronise internally.
pub trait SensorActuator: Send + Sync {
    fn read_sensors(&self) -> Result<SensorReading, HardwareError>;

    /// Drive an actuator with `magnitude` in [0, 100].
    fn set_actuation(&self, channel: ChannelId, magnitude: f64, direction: Direction);
}

/// Hardware stub: random readings, remembers the last actuation per channel.
#[derive(Default)]
pub struct RandomIo {
    actuation: Mutex<[(f64, Direction); 2]>,
}

impl RandomIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_actuation(&self, channel: ChannelId) -> (f64, Direction) {
        self.actuation.lock()[channel.index()]
    }
}

impl SensorActuator for RandomIo {
    fn read_sensors(&self) -> Result<SensorReading, HardwareError> {
        Ok(SensorReading {
            encoder1: random_range(0..=ENCODER_MAX) as f64,
            pot1: random_range(0..=POT_MAX) as f64,
            encoder2: random_range(0..=ENCODER_MAX) as f64,
            pot2: random_range(0..=POT_MAX) as f64,
        })
    }

    fn set_actuation(&self, channel: ChannelId, magnitude: f64, direction: Direction) {
        self.actuation.lock()[channel.index()] = (magnitude, direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_readings_stay_in_range() {
        let io = RandomIo::new();
        for _ in 0..100 {
            let r = io.read_sensors().unwrap();
            assert!((0.0..=ENCODER_MAX as f64).contains(&r.encoder1));
            assert!((0.0..=POT_MAX as f64).contains(&r.pot2));
        }
    }

    #[test]
    fn remembers_last_actuation() {
        let io = RandomIo::new();
        io.set_actuation(ChannelId::Two, 42.0, Direction::Reverse);
        assert_eq!(io.last_actuation(ChannelId::Two), (42.0, Direction::Reverse));
        assert_eq!(io.last_actuation(ChannelId::One), (0.0, Direction::Forward));
    }

    #[test]
    fn direction_from_sign() {
        assert_eq!(Direction::from_sign(-0.1), Direction::Reverse);
        assert_eq!(Direction::from_sign(0.0), Direction::Forward);
        assert_eq!(Direction::Reverse.flipped(), Direction::Forward);
    }
}
