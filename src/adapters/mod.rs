//! Adapters module: front ends driving an agent session.
//!
//! - **CLI**: interactive REPL and single-message mode

pub mod cli;
