// Command server: command table, per-connection sessions and the TCP listener.

pub mod commands;
pub mod dispatcher;
pub mod listener;

pub use commands::{CommandCode, CommandTable};
pub use dispatcher::Session;
pub use listener::Listener;
