//! Contract with the execution substrate.
//!
//! The fuzzer never runs program code itself. Every deploy, call and state
//! snapshot goes through an [`ExecutionClient`], which reports back a
//! [`CallInfo`] tree including the instruction addresses each frame executed.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tayt_types::{CompiledArtifact, Felt};

/// Address of a deployed program instance.
pub type InstanceId = Felt;

/// Identity of a declared program class.
pub type ClassHash = Felt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryPointType {
    #[default]
    External,
    L1Handler,
    Constructor,
}

impl fmt::Display for EntryPointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPointType::External => write!(f, "external"),
            EntryPointType::L1Handler => write!(f, "l1_handler"),
            EntryPointType::Constructor => write!(f, "constructor"),
        }
    }
}

/// An event emitted during a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Emission order within the whole transaction.
    #[serde(default)]
    pub order: u64,
    #[serde(default)]
    pub keys: Vec<Felt>,
    #[serde(default)]
    pub data: Vec<Felt>,
}

/// Result of one executed frame, with its nested calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    pub contract_address: InstanceId,
    #[serde(default)]
    pub class_hash: Option<ClassHash>,
    #[serde(default)]
    pub entry_point_type: EntryPointType,
    #[serde(default)]
    pub retdata: Vec<Felt>,
    #[serde(default)]
    pub events: Vec<Event>,
    /// Instruction addresses executed by this frame only.
    #[serde(default)]
    pub executed_pcs: BTreeSet<u64>,
    #[serde(default)]
    pub internal_calls: Vec<CallInfo>,
}

impl CallInfo {
    /// Events of this frame and every nested frame, in emission order.
    pub fn sorted_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        let mut stack = vec![self];
        while let Some(frame) = stack.pop() {
            events.extend(frame.events.iter().cloned());
            stack.extend(frame.internal_calls.iter());
        }
        events.sort_by_key(|e| e.order);
        events
    }
}

/// Opaque handle to a saved execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateHandle(pub u64);

/// A call that failed without applying its state mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertError {
    /// Human-readable diagnostic; the last line carries assertion signatures.
    pub message: String,
}

impl RevertError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn last_line(&self) -> &str {
        self.message.rsplit('\n').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionError {
    /// The program reverted; expected during fuzzing.
    Revert(RevertError),
    /// The substrate could not be reached or answered nonsense; always fatal.
    Client(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Revert(r) => write!(f, "call reverted: {}", r.message),
            ExecutionError::Client(msg) => write!(f, "execution client error: {msg}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<RevertError> for ExecutionError {
    fn from(e: RevertError) -> Self {
        ExecutionError::Revert(e)
    }
}

/// One request to run an entry point.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub instance: &'a InstanceId,
    pub function: &'a str,
    pub args: &'a [Felt],
    pub sender: &'a Felt,
    pub value: u64,
    pub kind: EntryPointType,
    /// Only set for message-handler calls.
    pub nonce: Option<&'a Felt>,
}

/// Blocking request/response access to a running execution substrate.
pub trait ExecutionClient {
    /// Deploy `artifact`; the returned frame is the constructor call.
    fn deploy(
        &mut self,
        artifact: &CompiledArtifact,
        constructor_args: &[Felt],
    ) -> Result<CallInfo, ExecutionError>;

    /// Register `artifact` so deployed code can instantiate it by class hash.
    fn declare(&mut self, artifact: &CompiledArtifact) -> Result<ClassHash, ExecutionError>;

    /// State-mutating call.
    fn invoke(&mut self, call: &Invocation<'_>) -> Result<CallInfo, ExecutionError>;

    /// Query that never mutates state.
    fn call_readonly(&mut self, call: &Invocation<'_>) -> Result<CallInfo, ExecutionError>;

    /// Save the current state. The saved state is never mutated by later calls.
    fn snapshot(&mut self) -> Result<StateHandle, ExecutionError>;

    /// Replace the current state with a copy of a saved one.
    fn restore(&mut self, handle: &StateHandle) -> Result<(), ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_events_merges_nested_frames() {
        let event = |order: u64| Event {
            order,
            keys: vec![Felt::from(order)],
            data: vec![],
        };
        let call = CallInfo {
            events: vec![event(2)],
            internal_calls: vec![CallInfo {
                events: vec![event(0), event(1)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let orders: Vec<u64> = call.sorted_events().iter().map(|e| e.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn test_revert_last_line() {
        let err = RevertError::new("Error at pc=0:12\nTraceback\napp.AssertionException: boom");
        assert_eq!(err.last_line(), "app.AssertionException: boom");
        assert_eq!(RevertError::new("single").last_line(), "single");
    }

    #[test]
    fn test_call_info_deserializes_with_defaults() {
        let call: CallInfo = serde_json::from_str(
            r#"{"contract_address": "0x10", "entry_point_type": "L1_HANDLER", "executed_pcs": [3, 1]}"#,
        )
        .unwrap();
        assert_eq!(call.contract_address, Felt::from(16u64));
        assert_eq!(call.entry_point_type, EntryPointType::L1Handler);
        assert_eq!(call.executed_pcs.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert!(call.internal_calls.is_empty());
    }
}
