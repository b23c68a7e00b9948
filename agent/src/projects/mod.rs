//! Project configuration lookup

pub mod registry;
