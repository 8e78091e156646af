//! dispatcher.rs
//! Per-connection command session.
//!
//! - Read a frame; anything but a command gets a textual error and an acknowledge
//!   carrying the received tag
//! - Look the code up in the command table, read its argument frame if it takes one
//! - Invoke the handler, write its optional response, always acknowledge the code
//! - A framing or I/O error ends the session quietly; `X` ends it after the acknowledge
//!
//! Each session owns its own `LoopScheduler`. Ending the session stops the loop.

use std::{
    io::{Read, Write},
    path::PathBuf,
};

use log::{debug, info, warn};

use crate::control::algorithm::ControlMode;
use crate::error::PacketError;
use crate::hardware::{ChannelId, SensorReading};
use crate::protocol::packet::{Frame, pack, unpack_stream, write_frame};
use crate::scheduler::{
    LoopScheduler, ReferenceMode,
    state::{ControllerState, Gains},
};
use crate::server::commands::{ArgKind, Argument, CommandCode, CommandTable, HELP_TEXT, Handler};

pub struct Session {
    scheduler: LoopScheduler,
    table: CommandTable<Session>,
    export_dir: Option<PathBuf>,
    label: String,
    finished: bool,
}

impl Session {
    pub fn new(scheduler: LoopScheduler, label: impl Into<String>) -> Self {
        Self {
            scheduler,
            table: CommandTable::build(handler_for),
            export_dir: None,
            label: label.into(),
            finished: false,
        }
    }

    /// Export the log as CSV into `dir` when the client sends `X`.
    pub fn with_export_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.export_dir = dir;
        self
    }

    pub fn scheduler(&self) -> &LoopScheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run the command loop until the client finishes or the stream ends.
    pub fn serve<R: Read, W: Write>(&mut self, reader: &mut R, writer: &mut W) {
        info!("[Session {}] started", self.label);
        match self.run(reader, writer) {
            Ok(()) => info!("[Session {}] finished by client", self.label),
            Err(e) if e.is_closed() => info!("[Session {}] client disconnected", self.label),
            Err(e) => info!("[Session {}] closed: {}", self.label, e),
        }
        self.scheduler.stop();
    }

    fn run<R: Read, W: Write>(&mut self, reader: &mut R, writer: &mut W) -> Result<(), PacketError> {
        while !self.finished {
            let (response, ack) = match unpack_stream(reader)? {
                Frame::Command(code) => (self.dispatch(code, reader)?, code),
                other => {
                    let tag = other.tag().as_char();
                    warn!("[Session {}] expected command, got '{}' frame", self.label, tag);
                    (Some(Frame::String(format!("Command expected, '{tag}' received"))), tag)
                }
            };
            if let Some(frame) = response {
                writer.write_all(&self.encode_response(&frame)?)?;
            }
            write_frame(writer, &Frame::Acknowledge(ack))?;
        }
        Ok(())
    }

    /// Encode a handler's response. A response that cannot be framed is replaced by an
    /// error string so the command is still answered and acknowledged.
    fn encode_response(&self, frame: &Frame) -> Result<Vec<u8>, PacketError> {
        pack(frame).or_else(|e| {
            warn!("[Session {}] could not encode '{}' response: {}", self.label, frame.tag().as_char(), e);
            pack(&Frame::String(format!("Error: response could not be encoded: {e}")))
        })
    }

    fn dispatch<R: Read>(&mut self, code: char, reader: &mut R) -> Result<Option<Frame>, PacketError> {
        let Some(spec) = self.table.lookup(code) else {
            warn!("[Session {}] unrecognized command '{}'", self.label, code);
            return Ok(Some(Frame::String(format!("Unrecognized command '{code}'"))));
        };

        let argument = match spec.arg {
            ArgKind::None => Argument::None,
            kind => match Argument::from_frame(kind, unpack_stream(reader)?) {
                Ok(arg) => arg,
                Err(tag) => {
                    warn!("[Session {}] '{}' got a '{}' argument", self.label, code, tag.as_char());
                    return Ok(error(format!(
                        "command '{code}' expects {} argument, '{}' received",
                        kind.name(),
                        tag.as_char()
                    )));
                }
            },
        };

        debug!("[Session {}] {:?} {:?}", self.label, spec.code, argument);
        Ok((spec.handler)(self, argument))
    }
}

fn error(message: impl AsRef<str>) -> Option<Frame> {
    Some(Frame::String(format!("Error: {}", message.as_ref())))
}

fn handler_for(code: CommandCode) -> Handler<Session> {
    match code {
        CommandCode::Echo => echo,
        CommandCode::Help => help,
        CommandCode::Status => status,
        CommandCode::CompactStatus => compact_status,
        CommandCode::ReadSensors => read_sensors,
        CommandCode::ZeroEncoder => zero_encoder,
        CommandCode::SetPeriod => set_period,
        CommandCode::SetEchoDivisor => set_echo_divisor,
        CommandCode::RunLoop => run_loop,
        CommandCode::MotorGain => motor_gain,
        CommandCode::ReverseMotor => reverse_motor,
        CommandCode::PwmFrequency => pwm_frequency,
        CommandCode::MotorCurve => motor_curve,
        CommandCode::ToggleMotor => toggle_motor,
        CommandCode::SetTarget => set_target,
        CommandCode::SetTargetZero => set_target_zero,
        CommandCode::ReadTargetPot => read_target_pot,
        CommandCode::SetTargetMode => set_target_mode,
        CommandCode::ProportionalGain => proportional_gain,
        CommandCode::IntegralGain => integral_gain,
        CommandCode::DerivativeGain => derivative_gain,
        CommandCode::ControlMode => control_mode,
        CommandCode::ToggleController => toggle_controller,
        CommandCode::ReadValues => read_values,
        CommandCode::SetLogger => set_logger,
        CommandCode::ResetLogger => reset_logger,
        CommandCode::Finish => finish,
    }
}

// The table only binds these handlers to codes of the matching argument kind.
fn int_arg(arg: &Argument) -> i32 {
    arg.integer().unwrap_or_default()
}

fn float_arg(arg: &Argument) -> f64 {
    arg.float().unwrap_or_default()
}

fn echo(_: &mut Session, _: Argument) -> Option<Frame> {
    Some(Frame::String("echo".into()))
}

fn help(_: &mut Session, _: Argument) -> Option<Frame> {
    Some(Frame::String(HELP_TEXT.into()))
}

fn mode_name(state: &ControllerState) -> &'static str {
    state
        .channel(ChannelId::One)
        .algorithm
        .as_ref()
        .map_or("off", |alg| alg.name())
}

fn status(session: &mut Session, _: Argument) -> Option<Frame> {
    let running = session.scheduler.is_running();
    let text = session.scheduler.with_state(|s| {
        let mut lines = vec![
            "> Status".to_string(),
            format!(
                ">   loop: {}, period {:.3} ms, echo every {} ticks",
                if running { "running" } else { "stopped" },
                s.period() * 1e3,
                s.echo_divisor
            ),
            format!(
                ">   logger: {} of {} rows, page {}",
                s.logger.len(),
                s.logger.capacity(),
                s.logger.page()
            ),
            format!(
                ">   motor: gain {}%, reversed {}, enabled {}, pwm {}, curve {}",
                s.actuator.gain, s.actuator.reversed, s.actuator.enabled, s.actuator.pwm_frequency, s.actuator.curve
            ),
            format!(
                ">   controller: {:?} ({}), Kp {} Ki {} Kd {}",
                s.mode,
                mode_name(s),
                s.gains.kp,
                s.gains.ki,
                s.gains.kd
            ),
        ];
        for id in ChannelId::ALL {
            let ch = s.channel(id);
            lines.push(format!(
                ">   channel {}: {:?} reference {} (zero {}), encoder offset {}, algorithm {}",
                id.number(),
                ch.reference_mode,
                ch.reference,
                ch.reference_zero,
                ch.encoder_offset,
                ch.algorithm.as_ref().map_or("none", |a| a.name())
            ));
        }
        lines.push(format!(">   metrics: {}", s.metrics.summary()));
        lines.join("\n")
    });
    Some(Frame::String(text))
}

fn compact_status(session: &mut Session, _: Argument) -> Option<Frame> {
    let running = session.scheduler.is_running();
    let text = session.scheduler.with_state(|s| {
        format!(
            "running={} period={:.3}ms echo={} gain={} reversed={} enabled={} mode={} kp={} ki={} kd={} log={}/{}",
            u8::from(running),
            s.period() * 1e3,
            s.echo_divisor,
            s.actuator.gain,
            u8::from(s.actuator.reversed),
            u8::from(s.actuator.enabled),
            mode_name(s),
            s.gains.kp,
            s.gains.ki,
            s.gains.kd,
            s.logger.len(),
            s.logger.capacity()
        )
    });
    Some(Frame::String(text))
}

fn describe_reading(state: &ControllerState, reading: &SensorReading) -> String {
    ChannelId::ALL
        .iter()
        .map(|&id| {
            let ch = state.channel(id);
            format!(
                "ENC{n}: {:.0} POT{n}: {:.0} REF{n}: {:.2}",
                ch.measurement(reading, id),
                reading.pot(id),
                ch.effective_reference(reading, id),
                n = id.number()
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_sensors(session: &mut Session, _: Argument) -> Option<Frame> {
    match session.scheduler.read_sensors() {
        Ok(reading) => {
            let text = session.scheduler.with_state(|s| describe_reading(s, &reading));
            Some(Frame::String(text))
        }
        Err(e) => error(e.to_string()),
    }
}

fn zero_encoder(session: &mut Session, _: Argument) -> Option<Frame> {
    match session.scheduler.zero_encoders() {
        Ok(()) => None,
        Err(e) => error(e.to_string()),
    }
}

fn set_period(session: &mut Session, arg: Argument) -> Option<Frame> {
    let ms = int_arg(&arg);
    if ms <= 0 {
        return error(format!("period must be positive, got {ms} ms"));
    }
    match session.scheduler.set_period(f64::from(ms) / 1000.0) {
        Ok(()) => None,
        Err(e) => error(e.to_string()),
    }
}

fn set_echo_divisor(session: &mut Session, arg: Argument) -> Option<Frame> {
    match u32::try_from(int_arg(&arg)) {
        Ok(divisor) => {
            session.scheduler.set_echo(divisor);
            None
        }
        Err(_) => error("echo divisor must not be negative"),
    }
}

fn run_loop(session: &mut Session, arg: Argument) -> Option<Frame> {
    match int_arg(&arg) {
        0 => {
            session.scheduler.stop();
            None
        }
        1 => match session.scheduler.start() {
            Ok(()) => None,
            Err(e) => error(format!("could not start loop: {e}")),
        },
        other => error(format!("loop flag must be 0 or 1, got {other}")),
    }
}

fn toggle_controller(session: &mut Session, _: Argument) -> Option<Frame> {
    if session.scheduler.is_running() {
        session.scheduler.stop();
        None
    } else {
        match session.scheduler.start() {
            Ok(()) => None,
            Err(e) => error(format!("could not start loop: {e}")),
        }
    }
}

fn motor_gain(session: &mut Session, arg: Argument) -> Option<Frame> {
    let gain = int_arg(&arg);
    if gain < 0 {
        return error(format!("motor gain must not be negative, got {gain}"));
    }
    session.scheduler.with_state(|s| s.actuator.gain = f64::from(gain));
    None
}

fn reverse_motor(session: &mut Session, _: Argument) -> Option<Frame> {
    session.scheduler.with_state(|s| s.actuator.reversed = !s.actuator.reversed);
    None
}

fn toggle_motor(session: &mut Session, _: Argument) -> Option<Frame> {
    session.scheduler.with_state(|s| s.actuator.enabled = !s.actuator.enabled);
    None
}

fn pwm_frequency(session: &mut Session, arg: Argument) -> Option<Frame> {
    match int_arg(&arg) {
        v @ 0..=3 => {
            session.scheduler.with_state(|s| s.actuator.pwm_frequency = v as u8);
            None
        }
        other => error(format!("PWM frequency must be 0..3, got {other}")),
    }
}

fn motor_curve(session: &mut Session, arg: Argument) -> Option<Frame> {
    match int_arg(&arg) {
        v @ 0..=2 => {
            session.scheduler.with_state(|s| s.actuator.curve = v as u8);
            None
        }
        other => error(format!("motor curve must be 0..2, got {other}")),
    }
}

fn set_target(session: &mut Session, arg: Argument) -> Option<Frame> {
    let target = f64::from(int_arg(&arg));
    session.scheduler.with_state(|s| s.channel_mut(ChannelId::One).reference = target);
    None
}

fn set_target_zero(session: &mut Session, arg: Argument) -> Option<Frame> {
    let zero = f64::from(int_arg(&arg));
    session.scheduler.with_state(|s| s.channel_mut(ChannelId::One).reference_zero = zero);
    None
}

fn read_target_pot(session: &mut Session, _: Argument) -> Option<Frame> {
    match session.scheduler.read_sensors() {
        Ok(reading) => Some(Frame::Integer(reading.pot1.round() as i32)),
        Err(e) => error(e.to_string()),
    }
}

fn set_target_mode(session: &mut Session, arg: Argument) -> Option<Frame> {
    match ReferenceMode::from_index(int_arg(&arg)) {
        Some(mode) => {
            session.scheduler.with_state(|s| s.channel_mut(ChannelId::One).reference_mode = mode);
            None
        }
        None => error("target mode must be 0 (int) or 1 (pot)"),
    }
}

fn retune(session: &mut Session, apply: impl FnOnce(&mut Gains)) -> Option<Frame> {
    session.scheduler.with_state(|s| {
        let mut gains = s.gains;
        apply(&mut gains);
        s.set_gains(gains);
    });
    None
}

fn proportional_gain(session: &mut Session, arg: Argument) -> Option<Frame> {
    let kp = float_arg(&arg);
    retune(session, |g| g.kp = kp)
}

fn integral_gain(session: &mut Session, arg: Argument) -> Option<Frame> {
    let ki = float_arg(&arg);
    retune(session, |g| g.ki = ki)
}

fn derivative_gain(session: &mut Session, arg: Argument) -> Option<Frame> {
    let kd = float_arg(&arg);
    retune(session, |g| g.kd = kd)
}

fn control_mode(session: &mut Session, arg: Argument) -> Option<Frame> {
    match ControlMode::from_index(int_arg(&arg)) {
        Some(mode) => {
            session.scheduler.with_state(|s| s.set_mode(mode));
            None
        }
        None => error("control mode must be 0..3"),
    }
}

fn read_values(session: &mut Session, _: Argument) -> Option<Frame> {
    let rows: Vec<_> = session.scheduler.log_snapshot().iter().map(|r| r.to_array()).collect();
    Some(Frame::matrix(rows.as_slice()))
}

fn set_logger(session: &mut Session, arg: Argument) -> Option<Frame> {
    match session.scheduler.set_logger(f64::from(int_arg(&arg))) {
        Ok(()) => None,
        Err(e) => error(e.to_string()),
    }
}

fn reset_logger(session: &mut Session, _: Argument) -> Option<Frame> {
    session.scheduler.reset_logger();
    None
}

fn finish(session: &mut Session, _: Argument) -> Option<Frame> {
    session.finished = true;
    session.scheduler.stop();
    let dir = session.export_dir.clone()?;
    match session.scheduler.export_log(&dir, &session.label) {
        Ok(path) => {
            info!("[Session {}] log exported to {}", session.label, path.display());
            Some(Frame::String(format!("log exported to {}", path.display())))
        }
        Err(e) => {
            warn!("[Session {}] log export failed: {}", session.label, e);
            error(format!("log export failed: {e}"))
        }
    }
}
