//! Maintenance tasks for the conversation store.

pub mod sweeper;

pub use sweeper::{ExpirySweeper, SweepConfig, SweepStats};
