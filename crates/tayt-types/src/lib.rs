//! Shared types for the tayt workspace.
//!
//! This crate holds the plain data the fuzzing engine and the CLI agree on:
//!
//! - [`felt`]: the field element scalar used for calldata, return data and events
//! - [`abi`]: Cairo ABI entries and entry-point selectors
//! - [`cairo_type`]: argument shapes parsed from ABI type strings
//! - [`artifact`]: compiled program artifacts with debug info and diagnostics

pub mod abi;
pub mod artifact;
pub mod cairo_type;
pub mod felt;

// Re-export commonly used types at crate root
pub use abi::{selector_from_name, AbiEntry, AbiMember, EventAbi, FunctionAbi, StructAbi};
pub use artifact::{ArtifactError, CompiledArtifact, DiagnosticTemplate, SourceSpan};
pub use cairo_type::{parse_arguments, TypeDescriptor, TypeParseError};
pub use felt::{field_prime, Felt, FeltParseError};
