// Control-loop scheduler: shared controller state, circular data logger,
// periodic timer and echo observers.

pub mod data_logger;
pub mod echo;
pub mod loop_scheduler;
pub mod periodic;
pub mod state;

pub use data_logger::{DataLogger, LogRow};
pub use loop_scheduler::LoopScheduler;
pub use state::{ControllerState, ReferenceMode};
