//! Deployment trace ledger

pub mod recorder;
