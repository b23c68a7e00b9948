//! Cross-module tests

mod support;
mod test_gateway;
mod test_notify;
mod test_orchestrator;
