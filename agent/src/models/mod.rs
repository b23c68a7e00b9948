//! Data model shared by the gateway, orchestrator, tracer and notifier

pub mod deployment;
pub mod notification;
pub mod project;
pub mod push;
pub mod trace;
