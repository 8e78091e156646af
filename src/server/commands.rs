//! commands.rs
//! Closed set of single-character command codes and the per-session command table.
//!
//! Each code maps to a handler descriptor: the argument frame it expects (if any)
//! and the operation bound to it. The table is resolved once when a session starts.

use std::collections::HashMap;

use crate::protocol::packet::{Frame, FrameTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Echo,
    Help,
    Status,
    CompactStatus,
    ReadSensors,
    ZeroEncoder,
    SetPeriod,
    SetEchoDivisor,
    RunLoop,
    MotorGain,
    ReverseMotor,
    PwmFrequency,
    MotorCurve,
    ToggleMotor,
    SetTarget,
    SetTargetZero,
    ReadTargetPot,
    SetTargetMode,
    ProportionalGain,
    IntegralGain,
    DerivativeGain,
    ControlMode,
    ToggleController,
    ReadValues,
    SetLogger,
    ResetLogger,
    Finish,
}

impl CommandCode {
    pub const ALL: [CommandCode; 27] = [
        CommandCode::Echo,
        CommandCode::Help,
        CommandCode::Status,
        CommandCode::CompactStatus,
        CommandCode::ReadSensors,
        CommandCode::ZeroEncoder,
        CommandCode::SetPeriod,
        CommandCode::SetEchoDivisor,
        CommandCode::RunLoop,
        CommandCode::MotorGain,
        CommandCode::ReverseMotor,
        CommandCode::PwmFrequency,
        CommandCode::MotorCurve,
        CommandCode::ToggleMotor,
        CommandCode::SetTarget,
        CommandCode::SetTargetZero,
        CommandCode::ReadTargetPot,
        CommandCode::SetTargetMode,
        CommandCode::ProportionalGain,
        CommandCode::IntegralGain,
        CommandCode::DerivativeGain,
        CommandCode::ControlMode,
        CommandCode::ToggleController,
        CommandCode::ReadValues,
        CommandCode::SetLogger,
        CommandCode::ResetLogger,
        CommandCode::Finish,
    ];

    pub fn as_char(self) -> char {
        match self {
            CommandCode::Echo => 'e',
            CommandCode::Help => 'H',
            CommandCode::Status => 's',
            CommandCode::CompactStatus => 'S',
            CommandCode::ReadSensors => 'R',
            CommandCode::ZeroEncoder => 'Z',
            CommandCode::SetPeriod => 'P',
            CommandCode::SetEchoDivisor => 'E',
            CommandCode::RunLoop => 'L',
            CommandCode::MotorGain => 'G',
            CommandCode::ReverseMotor => 'V',
            CommandCode::PwmFrequency => 'F',
            CommandCode::MotorCurve => 'Q',
            CommandCode::ToggleMotor => 'M',
            CommandCode::SetTarget => 'T',
            CommandCode::SetTargetZero => 'B',
            CommandCode::ReadTargetPot => 'O',
            CommandCode::SetTargetMode => 'D',
            CommandCode::ProportionalGain => 'K',
            CommandCode::IntegralGain => 'I',
            CommandCode::DerivativeGain => 'N',
            CommandCode::ControlMode => 'Y',
            CommandCode::ToggleController => 'C',
            CommandCode::ReadValues => 'r',
            CommandCode::SetLogger => 'W',
            CommandCode::ResetLogger => 'w',
            CommandCode::Finish => 'X',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        CommandCode::ALL.into_iter().find(|code| code.as_char() == c)
    }

    pub fn arg(self) -> ArgKind {
        match self {
            CommandCode::SetPeriod
            | CommandCode::SetEchoDivisor
            | CommandCode::RunLoop
            | CommandCode::MotorGain
            | CommandCode::PwmFrequency
            | CommandCode::MotorCurve
            | CommandCode::SetTarget
            | CommandCode::SetTargetZero
            | CommandCode::SetTargetMode
            | CommandCode::ControlMode
            | CommandCode::SetLogger => ArgKind::Integer,
            CommandCode::ProportionalGain | CommandCode::IntegralGain | CommandCode::DerivativeGain => {
                ArgKind::Float
            }
            _ => ArgKind::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    None,
    Integer,
    Float,
    String,
}

impl ArgKind {
    pub fn tag(self) -> Option<FrameTag> {
        match self {
            ArgKind::None => None,
            ArgKind::Integer => Some(FrameTag::Integer),
            ArgKind::Float => Some(FrameTag::Float),
            ArgKind::String => Some(FrameTag::String),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArgKind::None => "no",
            ArgKind::Integer => "Integer",
            ArgKind::Float => "Float",
            ArgKind::String => "String",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    None,
    Integer(i32),
    Float(f32),
    String(String),
}

impl Argument {
    /// Accept `frame` as an argument of `kind`; hands back the received tag otherwise.
    pub fn from_frame(kind: ArgKind, frame: Frame) -> Result<Self, FrameTag> {
        match (kind, frame) {
            (ArgKind::Integer, Frame::Integer(v)) => Ok(Argument::Integer(v)),
            (ArgKind::Float, Frame::Float(v)) => Ok(Argument::Float(v)),
            (ArgKind::String, Frame::String(s)) => Ok(Argument::String(s)),
            (_, other) => Err(other.tag()),
        }
    }

    pub fn integer(&self) -> Option<i32> {
        match self {
            Argument::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self) -> Option<f64> {
        match self {
            Argument::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }
}

/// Operation bound to a command: receives the session context and the argument,
/// returns the optional response frame.
pub type Handler<C> = fn(&mut C, Argument) -> Option<Frame>;

pub struct CommandSpec<C> {
    pub code: CommandCode,
    pub arg: ArgKind,
    pub handler: Handler<C>,
}

impl<C> Clone for CommandSpec<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for CommandSpec<C> {}

pub struct CommandTable<C> {
    entries: HashMap<char, CommandSpec<C>>,
}

impl<C> CommandTable<C> {
    /// Bind every command code to the handler chosen by `resolve`.
    pub fn build(resolve: impl Fn(CommandCode) -> Handler<C>) -> Self {
        let entries = CommandCode::ALL
            .into_iter()
            .map(|code| {
                let spec = CommandSpec {
                    code,
                    arg: code.arg(),
                    handler: resolve(code),
                };
                (code.as_char(), spec)
            })
            .collect();
        Self { entries }
    }

    pub fn lookup(&self, code: char) -> Option<CommandSpec<C>> {
        self.entries.get(&code).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub const HELP_TEXT: &str = "
----------------------------------------------------------------------
% General commands:
% > e           - Echo message
% > H           - Help
% > s           - Status and configuration
% > S           - Compact status and configuration
% > R           - Read sensor, control and target

% Encoder commands:
% > Z           - Zero encoder count

% Loop commands:
% > P int       - set loop Period (ms)
% > E int       - set Echo divisor
% > L [01]      - run Loop (on/off)

% Motor commands:
% > G int       - set motor Gain (%)
% > V           - reVerse motor direction
% > F [0123]    - set PWM Frequency
% > Q [012]     - set motor curve
% > M           - start/stop Motors

% Target commands:
% > T int       - set Target
% > B int       - set target zero
% > O           - read target pOtentiometer
% > D [01]      - set target mode (int/pot)

% Controller commands:
% > K float     - set proportional gain
% > I float     - set Integral gain
% > N float     - set derivative gain
% > Y [0123]    - control mode (position/velocitY/open loop/off)
% > C           - start/stop Controller
% > r           - Read values (log)

% Logger commands:
% > W int       - set logger duration (s)
% > w           - reset logger

% > X           - Finish / Break
----------------------------------------------------------------------
";

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut (), _: Argument) -> Option<Frame> {
        None
    }

    #[test]
    fn codes_are_unique_and_reversible() {
        for code in CommandCode::ALL {
            assert_eq!(CommandCode::from_char(code.as_char()), Some(code));
        }
        let table: CommandTable<()> = CommandTable::build(|_| noop as Handler<()>);
        assert_eq!(table.len(), CommandCode::ALL.len());
    }

    #[test]
    fn argument_kinds_follow_table() {
        assert_eq!(CommandCode::SetPeriod.arg(), ArgKind::Integer);
        assert_eq!(CommandCode::ProportionalGain.arg(), ArgKind::Float);
        assert_eq!(CommandCode::ZeroEncoder.arg(), ArgKind::None);
        assert_eq!(CommandCode::Echo.arg(), ArgKind::None);
        let table: CommandTable<()> = CommandTable::build(|_| noop as Handler<()>);
        assert_eq!(table.lookup('K').map(|s| s.arg), Some(ArgKind::Float));
        assert!(table.lookup('?').is_none());
    }

    #[test]
    fn argument_type_mismatch_reports_tag() {
        assert_eq!(
            Argument::from_frame(ArgKind::Integer, Frame::Float(1.0)),
            Err(FrameTag::Float)
        );
        assert_eq!(
            Argument::from_frame(ArgKind::Float, Frame::Float(0.5)).unwrap().float(),
            Some(0.5)
        );
    }

    #[test]
    fn help_lists_every_code() {
        for code in CommandCode::ALL {
            assert!(HELP_TEXT.contains(&format!("> {}", code.as_char())), "{code:?} missing");
        }
    }
}
