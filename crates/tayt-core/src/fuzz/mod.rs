//! Stateful sequence fuzzing of deployed Cairo programs.
//!
//! Generates random call sequences from a fixed post-deploy state, checks an
//! oracle after every call and minimizes each violating sequence.
//!
//! # Architecture
//!
//! - [`value_gen`]: Boundary-heavy calldata generation from ABI types
//! - [`tx_gen`]: Sender, entry point and nonce selection
//! - [`engine`]: One iteration of the sequence loop, plus exact replay
//! - [`oracle`]: Property and exception violation detection
//! - [`obligations`]: Properties or exception templates still to violate
//! - [`coverage`]: Executed instruction addresses per instance
//! - [`shrinker`]: One-pass delta debugging of violating sequences
//! - [`runner`]: The fuzz loop tying it all together
//! - [`report`]: Finding and run report types

pub mod coverage;
pub mod engine;
pub mod obligations;
pub mod oracle;
pub mod report;
pub mod runner;
pub mod shrinker;
pub mod tx_gen;
pub mod value_gen;

pub use coverage::{CoverageAccumulator, CoverageSnapshot};
pub use engine::{replay_sequence, IterationFinding, SequenceEngine};
pub use obligations::ObligationSet;
pub use oracle::{ExceptionOracle, Oracle, PropertyOracle};
pub use report::{Finding, FuzzReport, OracleMode, TxSequence, TxSequenceElement, Violation};
pub use runner::{FuzzConfig, FuzzRunner};
pub use shrinker::Shrinker;
pub use tx_gen::{FuzzedCall, TxGenerator};
pub use value_gen::{GenerationError, ValueGenerator};
