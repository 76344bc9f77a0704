//! CLI command implementations

pub mod config;
pub mod recharge;
pub mod session;
pub mod stepper;
