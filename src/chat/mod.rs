//! Chat front end: slash commands and the interactive loop.

pub mod app;
pub mod commands;

pub use app::{spawn_line_reader, ChatApp};
pub use commands::ChatCommand;
