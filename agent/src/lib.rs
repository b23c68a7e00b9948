//! shipd library
//!
//! Push-triggered deployments: signed webhook intake, a phase machine with
//! health-gated rollback, a trace ledger and notification fan-out.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod notify;
pub mod projects;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod tracer;
pub mod utils;
pub mod webhook;
