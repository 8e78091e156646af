//! algorithm.rs
//! Pluggable control algorithms mapping (measurement, reference, period) to actuation.
//!
//! - OpenLoop: u = reference
//! - Proportional: u = Kp * (gamma * reference - measurement)
//! - PID: trapezoidal integral, backward-difference derivative
//! - Velocity: differentiates the measurement, then delegates to an inner algorithm
//!
//! All variants are plain state machines; the scheduler owns them and calls `update`
//! once per tick with a period that is always > 0.

/// Actuation limit in percent of full scale.
pub const ACTUATION_LIMIT: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlAlgorithm {
    OpenLoop,
    Proportional {
        kp: f64,
        gamma: f64,
    },
    Pid(Pid),
    Velocity(Velocity),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pid {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub gamma: f64,
    error: f64,
    integral: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Velocity {
    inner: Box<ControlAlgorithm>,
    measurement: f64,
    velocity: f64,
}

impl ControlAlgorithm {
    pub fn open_loop() -> Self {
        ControlAlgorithm::OpenLoop
    }

    pub fn proportional(kp: f64) -> Self {
        ControlAlgorithm::Proportional { kp, gamma: 1.0 }
    }

    pub fn pid(kp: f64, ki: f64, kd: f64) -> Self {
        ControlAlgorithm::Pid(Pid::new(kp, ki, kd))
    }

    pub fn velocity(inner: ControlAlgorithm) -> Self {
        ControlAlgorithm::Velocity(Velocity::new(inner))
    }

    /// Compute the actuation for one tick. `period` is in seconds and must be > 0.
    pub fn update(&mut self, measurement: f64, reference: f64, period: f64) -> f64 {
        match self {
            ControlAlgorithm::OpenLoop => reference,
            ControlAlgorithm::Proportional { kp, gamma } => {
                *kp * (*gamma * reference - measurement)
            }
            ControlAlgorithm::Pid(pid) => pid.update(measurement, reference, period),
            ControlAlgorithm::Velocity(vel) => vel.update(measurement, reference, period),
        }
    }

    /// Retune gains in place. Integrator and derivative history are kept.
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        match self {
            ControlAlgorithm::OpenLoop => {}
            ControlAlgorithm::Proportional { kp: p, .. } => *p = kp,
            ControlAlgorithm::Pid(pid) => {
                pid.kp = kp;
                pid.ki = ki;
                pid.kd = kd;
            }
            ControlAlgorithm::Velocity(vel) => vel.inner.set_gains(kp, ki, kd),
        }
    }

    /// Clear dynamic state (previous error, integral, previous measurement).
    pub fn reset(&mut self) {
        match self {
            ControlAlgorithm::OpenLoop | ControlAlgorithm::Proportional { .. } => {}
            ControlAlgorithm::Pid(pid) => {
                pid.error = 0.0;
                pid.integral = 0.0;
            }
            ControlAlgorithm::Velocity(vel) => {
                vel.measurement = 0.0;
                vel.velocity = 0.0;
                vel.inner.reset();
            }
        }
    }

    /// Last differentiated measurement, for velocity-closed loops only.
    pub fn last_velocity(&self) -> Option<f64> {
        match self {
            ControlAlgorithm::Velocity(vel) => Some(vel.velocity),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlAlgorithm::OpenLoop => "open-loop",
            ControlAlgorithm::Proportional { .. } => "proportional",
            ControlAlgorithm::Pid(_) => "pid",
            ControlAlgorithm::Velocity(_) => "velocity",
        }
    }
}

impl Pid {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self::with_gamma(kp, ki, kd, 1.0)
    }

    pub fn with_gamma(kp: f64, ki: f64, kd: f64, gamma: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            gamma,
            error: 0.0,
            integral: 0.0,
        }
    }

    pub fn update(&mut self, measurement: f64, reference: f64, period: f64) -> f64 {
        let error = self.gamma * reference - measurement;
        let derivative = (error - self.error) / period;

        // trapezoidal rule: ei[k] = ei[k-1] + T/2 (e[k] + e[k-1])
        self.integral += period * (error + self.error) / 2.0;
        self.error = error;

        self.kp * error + self.ki * self.integral + self.kd * derivative
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }
}

impl Velocity {
    pub fn new(inner: ControlAlgorithm) -> Self {
        Self {
            inner: Box::new(inner),
            measurement: 0.0,
            velocity: 0.0,
        }
    }

    pub fn update(&mut self, measurement: f64, reference: f64, period: f64) -> f64 {
        self.velocity = (measurement - self.measurement) / period;
        self.measurement = measurement;
        self.inner.update(self.velocity, reference, period)
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn inner(&self) -> &ControlAlgorithm {
        &self.inner
    }
}

/// Control mode as selected remotely with the `Y` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Position,
    Velocity,
    OpenLoop,
    Off,
}

impl ControlMode {
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(ControlMode::Position),
            1 => Some(ControlMode::Velocity),
            2 => Some(ControlMode::OpenLoop),
            3 => Some(ControlMode::Off),
            _ => None,
        }
    }

    /// Build the algorithm for this mode from the current gains. `Off` binds nothing.
    pub fn build(self, kp: f64, ki: f64, kd: f64) -> Option<ControlAlgorithm> {
        match self {
            ControlMode::Position => Some(ControlAlgorithm::pid(kp, ki, kd)),
            ControlMode::Velocity => Some(ControlAlgorithm::velocity(ControlAlgorithm::pid(kp, ki, kd))),
            ControlMode::OpenLoop => Some(ControlAlgorithm::open_loop()),
            ControlMode::Off => None,
        }
    }
}

/// Clamp actuation into [-100, 100]. Positive values saturate at 100, negative at -100,
/// zero passes through.
#[inline]
pub fn clamp_actuation(value: f64) -> f64 {
    if value > 0.0 {
        value.min(ACTUATION_LIMIT)
    } else if value < 0.0 {
        value.max(-ACTUATION_LIMIT)
    } else {
        value
    }
}
