//! state.rs
//! Controller state shared between the timer thread and the command session.
//!
//! Everything here lives behind one lock owned by `LoopScheduler`; a tick holds the
//! lock for its whole body so configuration changes and log reads never interleave
//! with a half-written row.

use crate::control::algorithm::{ControlAlgorithm, ControlMode};
use crate::error::ConfigError;
use crate::hardware::{ChannelId, SensorReading};
use crate::scheduler::data_logger::DataLogger;
use crate::utils::metrics::LoopMetrics;

/// Default duration of logged history (seconds).
pub const DEFAULT_LOG_DURATION: f64 = 60.0;
pub const DEFAULT_PERIOD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceMode {
    #[default]
    Software,
    Potentiometer,
}

impl ReferenceMode {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(ReferenceMode::Software),
            1 => Some(ReferenceMode::Potentiometer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub reference_mode: ReferenceMode,
    pub reference: f64,
    /// Subtracted from the potentiometer reading in potentiometer mode.
    pub reference_zero: f64,
    /// Raw encoder count captured by the last zeroing.
    pub encoder_offset: f64,
    pub algorithm: Option<ControlAlgorithm>,
    pub last_measurement: f64,
    pub last_actuation: f64,
}

impl Channel {
    pub fn measurement(&self, reading: &SensorReading, id: ChannelId) -> f64 {
        reading.encoder(id) - self.encoder_offset
    }

    pub fn effective_reference(&self, reading: &SensorReading, id: ChannelId) -> f64 {
        match self.reference_mode {
            ReferenceMode::Software => self.reference,
            ReferenceMode::Potentiometer => reading.pot(id) - self.reference_zero,
        }
    }

    /// Value shown in the echo line: velocity for velocity-closed loops, else measurement.
    pub fn echo_value(&self) -> f64 {
        self.algorithm
            .as_ref()
            .and_then(ControlAlgorithm::last_velocity)
            .unwrap_or(self.last_measurement)
    }
}

/// Actuator driver settings applied to both channels.
#[derive(Debug, Clone)]
pub struct ActuatorSettings {
    /// Percent applied to computed actuation before clamping.
    pub gain: f64,
    pub reversed: bool,
    pub enabled: bool,
    pub pwm_frequency: u8,
    pub curve: u8,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            gain: 100.0,
            reversed: false,
            enabled: true,
            pwm_frequency: 0,
            curve: 0,
        }
    }
}

/// Gains used when the control mode is (re)selected.
#[derive(Debug, Clone, Copy)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Self { kp: 1.0, ki: 0.0, kd: 0.0 }
    }
}

#[derive(Debug)]
pub struct ControllerState {
    period: f64,
    pub echo_divisor: u32,
    pub echo_counter: u64,
    pub running: bool,
    pub channels: [Channel; 2],
    pub actuator: ActuatorSettings,
    pub gains: Gains,
    pub mode: ControlMode,
    pub logger: DataLogger,
    pub metrics: LoopMetrics,
}

impl ControllerState {
    /// Channel 1 starts open loop, channel 2 unbound.
    pub fn new(period: f64, echo_divisor: u32, log_duration: f64) -> Result<Self, ConfigError> {
        validate_period(period)?;
        if !(log_duration > 0.0) {
            return Err(ConfigError::InvalidLogDuration(log_duration));
        }
        let mut channels: [Channel; 2] = Default::default();
        channels[0].algorithm = Some(ControlAlgorithm::open_loop());

        Ok(Self {
            period,
            echo_divisor,
            echo_counter: 0,
            running: false,
            channels,
            actuator: ActuatorSettings::default(),
            gains: Gains::default(),
            mode: ControlMode::OpenLoop,
            logger: DataLogger::new(log_duration, period)?,
            metrics: LoopMetrics::default(),
        })
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Change the tick interval. The log buffer is not resized.
    pub fn set_period(&mut self, period: f64) -> Result<(), ConfigError> {
        validate_period(period)?;
        self.period = period;
        Ok(())
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.channels[id.index()]
    }

    /// Reallocate the log for `duration` seconds at the current period.
    pub fn set_logger(&mut self, duration: f64) -> Result<(), ConfigError> {
        if !(duration > 0.0) {
            return Err(ConfigError::InvalidLogDuration(duration));
        }
        self.logger.set_capacity(duration, self.period)
    }

    /// Select a control mode for channel 1 using the current gains.
    pub fn set_mode(&mut self, mode: ControlMode) {
        let Gains { kp, ki, kd } = self.gains;
        self.mode = mode;
        self.channels[0].algorithm = mode.build(kp, ki, kd);
    }

    /// Update gains and retune channel 1 in place.
    pub fn set_gains(&mut self, gains: Gains) {
        self.gains = gains;
        if let Some(alg) = self.channels[0].algorithm.as_mut() {
            alg.set_gains(gains.kp, gains.ki, gains.kd);
        }
    }
}

fn validate_period(period: f64) -> Result<(), ConfigError> {
    if period > 0.0 && period.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositivePeriod(period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_setup() {
        let state = ControllerState::new(0.01, 0, DEFAULT_LOG_DURATION).unwrap();
        assert_eq!(state.logger.capacity(), 6_000);
        assert_eq!(state.channel(ChannelId::One).algorithm, Some(ControlAlgorithm::OpenLoop));
        assert!(state.channel(ChannelId::Two).algorithm.is_none());
        assert!(!state.running);
    }

    #[test]
    fn rejects_non_positive_period() {
        assert!(matches!(
            ControllerState::new(0.0, 0, 1.0),
            Err(ConfigError::NonPositivePeriod(_))
        ));
        let mut state = ControllerState::new(0.01, 0, 1.0).unwrap();
        assert!(state.set_period(-1.0).is_err());
        assert_eq!(state.period(), 0.01);
    }

    #[test]
    fn set_period_keeps_log_capacity() {
        let mut state = ControllerState::new(0.01, 0, 1.0).unwrap();
        state.set_period(0.05).unwrap();
        assert_eq!(state.logger.capacity(), 100);
        state.set_logger(1.0).unwrap();
        assert_eq!(state.logger.capacity(), 20);
    }

    #[test]
    fn potentiometer_reference_subtracts_zero() {
        let ch = Channel {
            reference_mode: ReferenceMode::Potentiometer,
            reference_zero: 100.0,
            reference: 7.0,
            ..Channel::default()
        };
        let reading = SensorReading { pot1: 612.0, ..SensorReading::default() };
        assert_eq!(ch.effective_reference(&reading, ChannelId::One), 512.0);
    }

    #[test]
    fn mode_and_gains_rebuild_channel_one() {
        let mut state = ControllerState::new(0.01, 0, 1.0).unwrap();
        state.set_gains(Gains { kp: 2.0, ki: 0.5, kd: 0.0 });
        state.set_mode(ControlMode::Velocity);
        assert_eq!(state.channels[0].algorithm.as_ref().map(|a| a.name()), Some("velocity"));
        state.set_mode(ControlMode::Off);
        assert!(state.channels[0].algorithm.is_none());
    }
}
