//! Inbound message handling shared by every transport.

pub mod commands;
pub mod handler;

pub use commands::{Command, INTERNAL_ERROR_TEXT};
pub use handler::{ModelInfo, Relay, Reply};
