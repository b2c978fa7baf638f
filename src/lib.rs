//! Apps Script agent library crate
//!
//! Exposes the orchestrator, tool registry and HTTP router so the server
//! binary and tests share one implementation.

pub mod agent;
pub mod config;
pub mod guard;
pub mod llm;
pub mod sandbox;
pub mod server;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;
