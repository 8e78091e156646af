//! loop_scheduler.rs
//! Periodic two-channel control loop.
//!
//! - Timer: `PeriodicTimer` fires every `period` seconds (firing to firing)
//! - Tick: read sensors → pick references → run algorithms → clamp → drive actuators
//!   → append log row → optional echo line
//! - Faults: sensor failures skip the tick, non-finite actuation skips that channel,
//!   a panicking body is caught; all are logged and counted and the timer keeps going
//! - Sharing: `ControllerState` sits behind one mutex shared by the timer thread
//!   and whoever configures the loop

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::control::algorithm::clamp_actuation;
use crate::error::{ConfigError, HardwareError, TickFault};
use crate::hardware::{ChannelId, Direction, SensorActuator, SensorReading};
use crate::scheduler::{
    data_logger::LogRow,
    echo::{EchoChannel, EchoColumn, EchoHeader, EchoLine, EchoSink},
    periodic::{PeriodicTimer, TickTiming},
    state::{ActuatorSettings, ControllerState},
};
use crate::utils::export::export_log_csv;

struct Shared {
    state: Mutex<ControllerState>,
    io: Arc<dyn SensorActuator>,
    echo: Arc<dyn EchoSink>,
}

pub struct LoopScheduler {
    shared: Arc<Shared>,
    timer: Mutex<Option<PeriodicTimer>>,
    realtime: bool,
}

impl LoopScheduler {
    pub fn new(state: ControllerState, io: Arc<dyn SensorActuator>, echo: Arc<dyn EchoSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                io,
                echo,
            }),
            timer: Mutex::new(None),
            realtime: false,
        }
    }

    /// Run the timer thread at maximum OS priority (best effort).
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Stopped → Running. The first tick fires one period from now with fresh
    /// algorithm state and metrics. Starting a running loop is a no-op.
    pub fn start(&self) -> io::Result<()> {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return Ok(());
        }

        let header = {
            let mut state = self.shared.state.lock();
            state.running = true;
            state.metrics.clear();
            for ch in state.channels.iter_mut() {
                if let Some(alg) = ch.algorithm.as_mut() {
                    alg.reset();
                }
            }
            (state.echo_divisor > 0).then(|| echo_header(&state))
        };
        if let Some(header) = header {
            self.shared.echo.header(&header);
        }

        let period_src = self.shared.clone();
        let tick_src = self.shared.clone();
        let spawned = PeriodicTimer::spawn(
            "control-loop",
            self.realtime,
            move || Duration::from_secs_f64(period_src.state.lock().period()),
            move |timing| run_tick(&tick_src, Some(timing)),
        );

        match spawned {
            Ok(t) => {
                *timer = Some(t);
                info!("[Loop] started, period {:.4} s", self.period());
                Ok(())
            }
            Err(e) => {
                self.shared.state.lock().running = false;
                Err(e)
            }
        }
    }

    /// Running → Stopped. Cancels the pending tick; a tick in progress finishes first.
    pub fn stop(&self) {
        let timer = self.timer.lock().take();
        let Some(timer) = timer else {
            return;
        };
        timer.cancel();

        let echo = {
            let mut state = self.shared.state.lock();
            state.running = false;
            state.echo_divisor > 0
        };
        if echo {
            self.shared.echo.flush();
        }
        info!("[Loop] stopped");
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Run one tick body immediately, outside the timer.
    pub fn tick_now(&self) {
        run_tick(&self.shared, None);
    }

    pub fn period(&self) -> f64 {
        self.shared.state.lock().period()
    }

    /// Change the tick interval (seconds). Applies from the next scheduled tick;
    /// the log buffer keeps its size.
    pub fn set_period(&self, seconds: f64) -> Result<(), ConfigError> {
        self.shared.state.lock().set_period(seconds)
    }

    /// Echo every `divisor`-th tick (0 disables). Switching echo on while running
    /// prints the column header first.
    pub fn set_echo(&self, divisor: u32) {
        let header = {
            let mut state = self.shared.state.lock();
            let turned_on = state.echo_divisor == 0 && divisor > 0;
            state.echo_divisor = divisor;
            state.echo_counter = 0;
            (turned_on && state.running).then(|| echo_header(&state))
        };
        if let Some(header) = header {
            self.shared.echo.header(&header);
        }
    }

    /// Reallocate the log for `duration` seconds at the current period.
    pub fn set_logger(&self, duration: f64) -> Result<(), ConfigError> {
        self.shared.state.lock().set_logger(duration)
    }

    pub fn reset_logger(&self) {
        self.shared.state.lock().logger.reset();
    }

    /// Logged rows, oldest first.
    pub fn log_snapshot(&self) -> Vec<LogRow> {
        self.shared.state.lock().logger.snapshot()
    }

    pub fn export_log(&self, dir: &Path, label: &str) -> Result<PathBuf, csv::Error> {
        let rows = self.log_snapshot();
        export_log_csv(dir, label, &rows)
    }

    pub fn read_sensors(&self) -> Result<SensorReading, HardwareError> {
        self.shared.io.read_sensors()
    }

    /// Capture current raw encoder counts as the zero of both channels.
    pub fn zero_encoders(&self) -> Result<(), HardwareError> {
        let reading = self.shared.io.read_sensors()?;
        let mut state = self.shared.state.lock();
        for id in ChannelId::ALL {
            state.channel_mut(id).encoder_offset = reading.encoder(id);
        }
        Ok(())
    }

    /// Run `f` with exclusive access to the controller state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        f(&mut self.shared.state.lock())
    }
}

impl Drop for LoopScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
    }
}

fn echo_header(state: &ControllerState) -> Vec<EchoHeader> {
    ChannelId::ALL
        .iter()
        .filter_map(|&id| {
            let alg = state.channel(id).algorithm.as_ref()?;
            let column = if alg.last_velocity().is_some() {
                EchoColumn::Velocity
            } else {
                EchoColumn::Encoder
            };
            Some(EchoHeader { channel: id.number(), column })
        })
        .collect()
}

/// Magnitude and direction sent to the driver for a clamped actuation.
fn driver_output(actuation: f64, settings: &ActuatorSettings) -> (f64, Direction) {
    let mut direction = Direction::from_sign(actuation);
    if settings.reversed {
        direction = direction.flipped();
    }
    let magnitude = if settings.enabled { actuation.abs() } else { 0.0 };
    (magnitude, direction)
}

struct TickOutput {
    commands: Vec<(ChannelId, f64)>,
    settings: ActuatorSettings,
    echo: Option<EchoLine>,
    faults: Vec<TickFault>,
}

fn run_tick(shared: &Shared, timing: Option<TickTiming>) {
    let started = Instant::now();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| tick_body(shared)));
    let faults = match outcome {
        Ok(Ok(out)) => {
            for (id, actuation) in &out.commands {
                let (magnitude, direction) = driver_output(*actuation, &out.settings);
                shared.io.set_actuation(*id, magnitude, direction);
            }
            if let Some(line) = &out.echo {
                shared.echo.line(line);
            }
            out.faults
        }
        Ok(Err(fault)) => vec![fault],
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            vec![TickFault::Panicked(msg)]
        }
    };

    let exec_us = started.elapsed().as_micros() as u64;
    let mut state = shared.state.lock();
    for fault in &faults {
        warn!("[Loop] tick fault: {}", fault);
        state.metrics.record_fault();
    }
    let period_us = (state.period() * 1e6) as u64;
    let jitter_us = timing.map_or(0, |t| t.jitter_us());
    state.metrics.record_tick(jitter_us, exec_us, period_us);
}

fn tick_body(shared: &Shared) -> Result<TickOutput, TickFault> {
    let reading = shared.io.read_sensors()?;

    let mut state = shared.state.lock();
    let timestamp = state.logger.elapsed();
    let period = state.period();
    let settings = state.actuator.clone();

    let mut commands = Vec::with_capacity(2);
    let mut faults = Vec::new();
    let mut values = [(0.0, 0.0, 0.0); 2];

    for id in ChannelId::ALL {
        let ch = state.channel_mut(id);
        let measurement = ch.measurement(&reading, id);
        let reference = ch.effective_reference(&reading, id);
        ch.last_measurement = measurement;

        let mut actuation = 0.0;
        if let Some(alg) = ch.algorithm.as_mut() {
            let raw = alg.update(measurement, reference, period) * settings.gain / 100.0;
            if raw.is_finite() {
                actuation = clamp_actuation(raw);
                commands.push((id, actuation));
            } else {
                faults.push(TickFault::NonFinite {
                    channel: id.number(),
                    value: raw,
                });
            }
        }
        ch.last_actuation = actuation;
        values[id.index()] = (measurement, reference, actuation);
    }

    state.logger.append(LogRow {
        timestamp,
        measurement1: values[0].0,
        reference1: values[0].1,
        actuation1: values[0].2,
        measurement2: values[1].0,
        reference2: values[1].1,
        actuation2: values[1].2,
    });

    let divisor = u64::from(state.echo_divisor);
    let echo = (divisor > 0 && state.echo_counter % divisor == 0).then(|| EchoLine {
        timestamp,
        channels: ChannelId::ALL
            .iter()
            .filter_map(|&id| {
                let ch = state.channel(id);
                let alg = ch.algorithm.as_ref()?;
                let (_, reference, actuation) = values[id.index()];
                Some(EchoChannel {
                    column: if alg.last_velocity().is_some() {
                        EchoColumn::Velocity
                    } else {
                        EchoColumn::Encoder
                    },
                    value: ch.echo_value(),
                    reference,
                    actuation,
                })
            })
            .collect(),
    });
    state.echo_counter += 1;

    debug!("[Loop] t={:.4} u1={:+.1} u2={:+.1}", timestamp, values[0].2, values[1].2);

    Ok(TickOutput {
        commands,
        settings,
        echo,
        faults,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::algorithm::ControlAlgorithm;
    use crate::hardware::RandomIo;
    use crate::scheduler::echo::MemoryEcho;
    use crate::scheduler::state::ReferenceMode;

    /// Fixed readings, records every actuation.
    #[derive(Default)]
    struct FixedIo {
        reading: Mutex<SensorReading>,
        fail: Mutex<bool>,
        actuations: Mutex<Vec<(ChannelId, f64, Direction)>>,
    }

    impl SensorActuator for FixedIo {
        fn read_sensors(&self) -> Result<SensorReading, HardwareError> {
            if *self.fail.lock() {
                return Err(HardwareError::SensorRead("unplugged".into()));
            }
            Ok(*self.reading.lock())
        }

        fn set_actuation(&self, channel: ChannelId, magnitude: f64, direction: Direction) {
            self.actuations.lock().push((channel, magnitude, direction));
        }
    }

    fn scheduler(io: Arc<dyn SensorActuator>, echo: Arc<dyn EchoSink>) -> LoopScheduler {
        LoopScheduler::new(ControllerState::new(0.01, 0, 1.0).unwrap(), io, echo)
    }

    #[test]
    fn tick_clamps_and_forwards_actuation() {
        let io = Arc::new(FixedIo::default());
        let sched = scheduler(io.clone(), Arc::new(MemoryEcho::new()));
        sched.with_state(|s| s.channel_mut(ChannelId::One).reference = -250.0);

        sched.tick_now();

        let rows = sched.log_snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reference1, -250.0);
        assert_eq!(rows[0].actuation1, -100.0);
        // channel 2 has no algorithm: nothing forwarded, zero logged
        assert_eq!(rows[0].actuation2, 0.0);
        assert_eq!(*io.actuations.lock(), vec![(ChannelId::One, 100.0, Direction::Reverse)]);
    }

    #[test]
    fn potentiometer_mode_and_encoder_zero() {
        let io = Arc::new(FixedIo::default());
        *io.reading.lock() = SensorReading { encoder1: 500.0, pot1: 40.0, ..SensorReading::default() };
        let sched = scheduler(io.clone(), Arc::new(MemoryEcho::new()));
        sched.zero_encoders().unwrap();
        sched.with_state(|s| {
            let ch = s.channel_mut(ChannelId::One);
            ch.reference_mode = ReferenceMode::Potentiometer;
            ch.algorithm = Some(ControlAlgorithm::proportional(1.0));
        });
        io.reading.lock().encoder1 = 510.0;

        sched.tick_now();

        let row = sched.log_snapshot()[0];
        assert_eq!(row.measurement1, 10.0);
        assert_eq!(row.reference1, 40.0);
        assert_eq!(row.actuation1, 30.0);
    }

    #[test]
    fn actuator_settings_shape_driver_output() {
        let io = Arc::new(FixedIo::default());
        let sched = scheduler(io.clone(), Arc::new(MemoryEcho::new()));
        sched.with_state(|s| {
            s.channel_mut(ChannelId::One).reference = 80.0;
            s.actuator.gain = 50.0;
            s.actuator.reversed = true;
        });
        sched.tick_now();
        sched.with_state(|s| s.actuator.enabled = false);
        sched.tick_now();

        let sent = io.actuations.lock().clone();
        assert_eq!(sent[0], (ChannelId::One, 40.0, Direction::Reverse));
        assert_eq!(sent[1], (ChannelId::One, 0.0, Direction::Reverse));
        assert_eq!(sched.log_snapshot()[0].actuation1, 40.0);
    }

    #[test]
    fn sensor_fault_skips_tick_without_stopping() {
        let io = Arc::new(FixedIo::default());
        let sched = scheduler(io.clone(), Arc::new(MemoryEcho::new()));
        *io.fail.lock() = true;
        sched.tick_now();
        *io.fail.lock() = false;
        sched.tick_now();

        assert_eq!(sched.log_snapshot().len(), 1);
        sched.with_state(|s| {
            assert_eq!(s.metrics.faults, 1);
            assert_eq!(s.metrics.ticks, 2);
        });
    }

    #[test]
    fn non_finite_actuation_is_skipped() {
        let io = Arc::new(FixedIo::default());
        let sched = scheduler(io.clone(), Arc::new(MemoryEcho::new()));
        sched.with_state(|s| s.channel_mut(ChannelId::One).reference = f64::NAN);
        sched.tick_now();
        assert!(io.actuations.lock().is_empty());
        assert_eq!(sched.log_snapshot()[0].actuation1, 0.0);
        sched.with_state(|s| assert_eq!(s.metrics.faults, 1));
    }

    #[test]
    fn echo_every_nth_tick() {
        let echo = Arc::new(MemoryEcho::new());
        let sched = scheduler(Arc::new(RandomIo::new()), echo.clone());
        sched.with_state(|s| {
            s.channel_mut(ChannelId::Two).algorithm =
                Some(ControlAlgorithm::velocity(ControlAlgorithm::proportional(1.0)));
        });
        sched.set_echo(3);
        for _ in 0..7 {
            sched.tick_now();
        }
        let lines = echo.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].channels.len(), 2);
        assert_eq!(lines[0].channels[0].column, EchoColumn::Encoder);
        assert_eq!(lines[0].channels[1].column, EchoColumn::Velocity);
    }

    #[test]
    fn start_stop_emit_header_and_flush() {
        let echo = Arc::new(MemoryEcho::new());
        let sched = scheduler(Arc::new(RandomIo::new()), echo.clone());
        sched.set_echo(1);
        sched.start().unwrap();
        assert!(sched.is_running());
        sched.start().unwrap();
        sched.stop();
        assert!(!sched.is_running());
        assert_eq!(echo.headers().len(), 1);
        assert_eq!(echo.headers()[0], vec![EchoHeader { channel: 1, column: EchoColumn::Encoder }]);
        assert_eq!(echo.flushes(), 1);
    }

    #[test]
    fn running_loop_logs_increasing_timestamps() {
        let sched = scheduler(Arc::new(RandomIo::new()), Arc::new(MemoryEcho::new()));
        sched.set_period(0.005).unwrap();
        sched.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        sched.stop();

        let rows = sched.log_snapshot();
        assert!(rows.len() >= 5, "only {} rows", rows.len());
        assert!(rows.windows(2).all(|w| w[1].timestamp > w[0].timestamp));

        let frozen = rows.len();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sched.log_snapshot().len(), frozen);
    }

    #[test]
    fn enabling_echo_while_running_prints_header() {
        let echo = Arc::new(MemoryEcho::new());
        let sched = scheduler(Arc::new(RandomIo::new()), echo.clone());
        sched.set_echo(4);
        assert!(echo.headers().is_empty());
        sched.set_echo(0);

        sched.start().unwrap();
        assert!(echo.headers().is_empty());
        sched.set_echo(2);
        sched.set_echo(5);
        assert_eq!(echo.headers().len(), 1);
        sched.stop();
    }
}
