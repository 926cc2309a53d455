//! Tayt Core
//!
//! Coverage-guided stateful fuzzing engine for StarkNet contracts.
//!
//! The engine deploys a compiled program through an [`execution::ExecutionClient`],
//! then searches for call sequences that violate the program's declared
//! properties or trigger its catalogued assertion failures.
//!
//! # Core Modules
//!
//! - [`execution`]: Contract with the execution substrate
//! - [`schema`]: Callable surface discovered from the ABI
//! - [`setup`]: Deployment and baseline snapshot
//! - [`fuzz`]: Value generation, sequence loop, oracles, shrinking
//! - [`testing`]: In-process executor for driving the engine in tests
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tayt_core::fuzz::{CoverageAccumulator, FuzzConfig, FuzzRunner};
//!
//! let coverage = Arc::new(CoverageAccumulator::new());
//! let mut runner = FuzzRunner::new(&mut client, FuzzConfig::default(), coverage);
//! let deployment = runner.setup(Arc::new(artifact), &[])?;
//! let report = runner.run(&deployment, "counter.json")?;
//! ```

#![allow(clippy::type_complexity)]

pub mod execution;
pub mod fuzz;
pub mod schema;
pub mod setup;
pub mod testing;

pub use execution::{
    CallInfo, ClassHash, EntryPointType, Event, ExecutionClient, ExecutionError, InstanceId,
    Invocation, RevertError, StateHandle,
};
pub use schema::{CallableFunction, FunctionKind, ProgramSchema, SchemaOptions, StructTable};
pub use setup::{Deployment, SetupError};
