//! Inbound webhook trust boundary

pub mod gateway;
pub mod signature;
