//! plant.rs
//! Simulated plant: each channel's encoder is the output of a discrete-time
//! state-space model driven by the last signed actuation sent to that channel.

use parking_lot::Mutex;

use crate::control::state_space::StateSpace;
use crate::error::{ConfigError, HardwareError};
use crate::hardware::io::{ChannelId, Direction, SensorActuator, SensorReading};

struct PlantChannel {
    model: StateSpace,
    input: f64,
    pot: f64,
}

pub struct SimulatedPlant {
    channels: Mutex<[PlantChannel; 2]>,
}

impl SimulatedPlant {
    /// Both models must be single-input single-output.
    pub fn new(model1: StateSpace, model2: StateSpace) -> Result<Self, ConfigError> {
        for model in [&model1, &model2] {
            if model.inputs() != 1 || model.outputs() != 1 {
                return Err(ConfigError::DimensionMismatch(format!(
                    "plant model must be SISO, got {} inputs and {} outputs",
                    model.inputs(),
                    model.outputs()
                )));
            }
        }
        let channel = |model| PlantChannel { model, input: 0.0, pot: 0.0 };
        Ok(Self {
            channels: Mutex::new([channel(model1), channel(model2)]),
        })
    }

    /// Two integrating motors with a little friction.
    pub fn motors() -> Self {
        let channel = || PlantChannel {
            model: StateSpace::first_order(0.98, 1.0),
            input: 0.0,
            pot: 0.0,
        };
        Self {
            channels: Mutex::new([channel(), channel()]),
        }
    }

    /// Set the potentiometer reading reported for `channel`.
    pub fn set_pot(&self, channel: ChannelId, value: f64) {
        self.channels.lock()[channel.index()].pot = value;
    }
}

impl SensorActuator for SimulatedPlant {
    fn read_sensors(&self) -> Result<SensorReading, HardwareError> {
        let mut channels = self.channels.lock();
        let mut out = [(0.0, 0.0); 2];
        for (slot, ch) in out.iter_mut().zip(channels.iter_mut()) {
            let y = ch.model.update(&[ch.input]);
            let encoder = y
                .first()
                .copied()
                .ok_or_else(|| HardwareError::SensorRead("plant model has no output".into()))?;
            *slot = (encoder, ch.pot);
        }
        Ok(SensorReading {
            encoder1: out[0].0,
            pot1: out[0].1,
            encoder2: out[1].0,
            pot2: out[1].1,
        })
    }

    fn set_actuation(&self, channel: ChannelId, magnitude: f64, direction: Direction) {
        self.channels.lock()[channel.index()].input = magnitude * direction.sign();
    }
}
