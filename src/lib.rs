//! Tayt
//!
//! Command-line glue around [`tayt_core`]: argument parsing, artifact
//! loading and compilation, the JSON-RPC execution client, and the line
//! coverage report.
//!
//! See [`tayt_core::fuzz`] for the fuzzing engine itself.

pub mod args;
pub mod compile;
pub mod coverage_report;
pub mod rpc;
