//! Shared domain types for fixrelay: configuration, the environment
//! catalog, the crate-wide error type, and structured trace events.

pub mod config;
pub mod error;
pub mod trace;
