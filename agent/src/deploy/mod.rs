//! Deployment orchestration

pub mod command;
pub mod flight;
pub mod fsm;
pub mod orchestrator;
pub mod phases;
pub mod probe;
