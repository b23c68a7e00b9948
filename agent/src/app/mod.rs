//! Startup wiring and graceful shutdown

pub mod options;
pub mod run;
pub mod state;
