//! mqk-testkit
//!
//! Shared fixtures for scenario tests: scripted strategies that fail on
//! demand ([`ScriptedStrategy`]), synthetic hook payloads, and hosts wired to
//! in-memory and audit-log sinks.

mod fixtures;
mod scripted;

pub use fixtures::*;
pub use scripted::*;
