//! In-process execution substrate for tests.
//!
//! [`MockProgram`] describes a program as an ABI plus one Rust closure per
//! entry point. [`InMemoryExecutor`] deploys it and implements
//! [`ExecutionClient`] over a key/value state with copy-on-snapshot semantics,
//! so the engine can be driven end to end without an external service.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{json, Value};
use tayt_types::{selector_from_name, ArtifactError, CompiledArtifact, Felt};

use crate::execution::{
    CallInfo, ClassHash, EntryPointType, Event, ExecutionClient, ExecutionError, InstanceId,
    Invocation, RevertError, StateHandle,
};

/// Program storage: named felt slots, zero when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockState {
    slots: HashMap<String, Felt>,
}

impl MockState {
    pub fn get_felt(&self, key: &str) -> Felt {
        self.slots.get(key).cloned().unwrap_or_default()
    }

    pub fn set_felt(&mut self, key: &str, value: Felt) {
        self.slots.insert(key.to_string(), value);
    }

    /// Slot value truncated to `u64`, saturating.
    pub fn get(&self, key: &str) -> u64 {
        u64::try_from(self.get_felt(key).as_biguint()).unwrap_or(u64::MAX)
    }

    pub fn set(&mut self, key: &str, value: u64) {
        self.set_felt(key, Felt::from(value));
    }
}

/// What a handler sees of the call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub function: String,
    pub args: Vec<Felt>,
    pub sender: Felt,
    pub kind: EntryPointType,
}

/// What a successful handler returns.
#[derive(Debug, Clone, Default)]
pub struct MockOutcome {
    pub retdata: Vec<Felt>,
    /// Event name and data, in emission order.
    pub events: Vec<(String, Vec<Felt>)>,
    /// Extra instruction addresses to report as executed.
    pub pcs: Vec<u64>,
}

impl MockOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn ret(value: u64) -> Self {
        Self {
            retdata: vec![Felt::from(value)],
            ..Default::default()
        }
    }

    /// Property result: 1 when `holds`, 0 otherwise.
    pub fn holds(holds: bool) -> Self {
        Self::ret(u64::from(holds))
    }

    pub fn with_event(mut self, name: &str, data: &[u64]) -> Self {
        self.events
            .push((name.to_string(), data.iter().map(|d| Felt::from(*d)).collect()));
        self
    }

    pub fn with_pcs(mut self, pcs: &[u64]) -> Self {
        self.pcs.extend_from_slice(pcs);
        self
    }
}

pub type Handler =
    Arc<dyn Fn(&mut MockState, &MockCall) -> Result<MockOutcome, String> + Send + Sync>;

/// Builder for a scripted program.
#[derive(Clone, Default)]
pub struct MockProgram {
    abi: Vec<Value>,
    diagnostics: Vec<Value>,
    handlers: Vec<(String, Handler)>,
}

fn members(inputs: &[(&str, &str)]) -> Vec<Value> {
    inputs
        .iter()
        .map(|(name, ty)| json!({ "name": name, "type": ty }))
        .collect()
}

impl MockProgram {
    pub fn new() -> Self {
        Self::default()
    }

    fn handler<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut MockState, &MockCall) -> Result<MockOutcome, String> + Send + Sync + 'static,
    {
        self.handlers.push((name.to_string(), Arc::new(handler)));
        self
    }

    /// State-mutating external function.
    pub fn external<F>(mut self, name: &str, inputs: &[(&str, &str)], handler: F) -> Self
    where
        F: Fn(&mut MockState, &MockCall) -> Result<MockOutcome, String> + Send + Sync + 'static,
    {
        self.abi.push(json!({
            "type": "function",
            "name": name,
            "inputs": members(inputs),
            "outputs": [],
        }));
        self.handler(name, handler)
    }

    pub fn l1_handler<F>(mut self, name: &str, inputs: &[(&str, &str)], handler: F) -> Self
    where
        F: Fn(&mut MockState, &MockCall) -> Result<MockOutcome, String> + Send + Sync + 'static,
    {
        self.abi.push(json!({
            "type": "l1_handler",
            "name": name,
            "inputs": members(inputs),
            "outputs": [],
        }));
        self.handler(name, handler)
    }

    /// Read-only function with arbitrary inputs and outputs.
    pub fn view<F>(
        mut self,
        name: &str,
        inputs: &[(&str, &str)],
        outputs: &[(&str, &str)],
        handler: F,
    ) -> Self
    where
        F: Fn(&mut MockState, &MockCall) -> Result<MockOutcome, String> + Send + Sync + 'static,
    {
        self.abi.push(json!({
            "type": "function",
            "name": name,
            "inputs": members(inputs),
            "outputs": members(outputs),
            "stateMutability": "view",
        }));
        self.handler(name, handler)
    }

    /// View taking nothing and returning one felt.
    pub fn property<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut MockState, &MockCall) -> Result<MockOutcome, String> + Send + Sync + 'static,
    {
        self.view(name, &[], &[("res", "felt")], handler)
    }

    pub fn constructor<F>(mut self, inputs: &[(&str, &str)], handler: F) -> Self
    where
        F: Fn(&mut MockState, &MockCall) -> Result<MockOutcome, String> + Send + Sync + 'static,
    {
        self.abi.push(json!({
            "type": "constructor",
            "name": "constructor",
            "inputs": members(inputs),
            "outputs": [],
        }));
        self.handler("constructor", handler)
    }

    /// Struct whose members are laid out one felt each.
    pub fn structure(mut self, name: &str, fields: &[(&str, &str)]) -> Self {
        let members: Vec<Value> = fields
            .iter()
            .enumerate()
            .map(|(offset, (field, ty))| json!({ "name": field, "type": ty, "offset": offset }))
            .collect();
        self.abi.push(json!({
            "type": "struct",
            "name": name,
            "size": fields.len(),
            "members": members,
        }));
        self
    }

    pub fn event(mut self, name: &str) -> Self {
        self.abi.push(json!({
            "type": "event",
            "name": name,
            "keys": [],
            "data": [],
        }));
        self
    }

    /// Catalogued assertion failure message.
    pub fn diagnostic(mut self, signature: &str, message_template: &str) -> Self {
        self.diagnostics.push(json!({
            "signature": signature,
            "message_template": message_template,
        }));
        self
    }

    pub fn artifact_json(&self) -> Value {
        json!({
            "abi": self.abi,
            "diagnostics": self.diagnostics,
            "program": { "debug_info": null },
        })
    }

    pub fn artifact(&self) -> Result<CompiledArtifact, ArtifactError> {
        CompiledArtifact::from_value(self.artifact_json())
    }
}

/// Counters of the calls an [`InMemoryExecutor`] served.
#[derive(Debug, Clone, Default)]
pub struct CallStats {
    pub invokes: usize,
    pub readonly_calls: usize,
    pub reverts: usize,
    pub restores: usize,
    pub per_function: HashMap<String, usize>,
}

/// [`ExecutionClient`] running [`MockProgram`] handlers in process.
pub struct InMemoryExecutor {
    program: MockProgram,
    state: MockState,
    snapshots: Vec<MockState>,
    instance: Option<InstanceId>,
    declared: Vec<ClassHash>,
    stats: CallStats,
    event_order: u64,
}

const TARGET_ADDRESS: u64 = 0x1000;
const TARGET_CLASS: u64 = 0xc1a55;

impl InMemoryExecutor {
    pub fn new(program: MockProgram) -> Self {
        Self {
            program,
            state: MockState::default(),
            snapshots: Vec::new(),
            instance: None,
            declared: Vec::new(),
            stats: CallStats::default(),
            event_order: 0,
        }
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    pub fn state(&self) -> &MockState {
        &self.state
    }

    pub fn instance(&self) -> Option<&InstanceId> {
        self.instance.as_ref()
    }

    /// Stable address per entry point, so coverage is reproducible.
    fn entry_pc(&self, function: &str) -> Option<u64> {
        self.program
            .handlers
            .iter()
            .position(|(name, _)| name == function)
            .map(|idx| (idx as u64) * 10)
    }

    fn run(
        &mut self,
        call: &MockCall,
        instance: &InstanceId,
        commit: bool,
    ) -> Result<CallInfo, ExecutionError> {
        let Some((_, handler)) = self
            .program
            .handlers
            .iter()
            .find(|(name, _)| *name == call.function)
            .cloned()
        else {
            self.stats.reverts += 1;
            return Err(RevertError::new(format!(
                "Entry point {} not found in contract.",
                call.function
            ))
            .into());
        };
        let entry_pc = self.entry_pc(&call.function).unwrap_or_default();

        let mut scratch = self.state.clone();
        let outcome = match handler(&mut scratch, call) {
            Ok(outcome) => outcome,
            Err(message) => {
                self.stats.reverts += 1;
                return Err(RevertError::new(message).into());
            }
        };
        if commit {
            self.state = scratch;
        }

        let events = outcome
            .events
            .into_iter()
            .map(|(name, data)| {
                let event = Event {
                    order: self.event_order,
                    keys: vec![selector_from_name(&name)],
                    data,
                };
                self.event_order += 1;
                event
            })
            .collect();
        let mut executed_pcs: BTreeSet<u64> = outcome.pcs.into_iter().collect();
        executed_pcs.insert(entry_pc);

        Ok(CallInfo {
            contract_address: instance.clone(),
            class_hash: Some(Felt::from(TARGET_CLASS)),
            entry_point_type: call.kind,
            retdata: outcome.retdata,
            events,
            executed_pcs,
            internal_calls: Vec::new(),
        })
    }

    fn check_instance(&self, instance: &InstanceId) -> Result<(), ExecutionError> {
        match &self.instance {
            Some(deployed) if deployed == instance => Ok(()),
            _ => Err(RevertError::new(format!(
                "Requested contract address {} is not deployed.",
                instance.to_hex_string()
            ))
            .into()),
        }
    }

    fn mock_call(call: &Invocation<'_>) -> MockCall {
        MockCall {
            function: call.function.to_string(),
            args: call.args.to_vec(),
            sender: call.sender.clone(),
            kind: call.kind,
        }
    }
}

impl ExecutionClient for InMemoryExecutor {
    fn deploy(
        &mut self,
        _artifact: &CompiledArtifact,
        constructor_args: &[Felt],
    ) -> Result<CallInfo, ExecutionError> {
        let instance = Felt::from(TARGET_ADDRESS);
        let has_constructor = self
            .program
            .handlers
            .iter()
            .any(|(name, _)| name == "constructor");
        let frame = if has_constructor {
            let call = MockCall {
                function: "constructor".to_string(),
                args: constructor_args.to_vec(),
                sender: Felt::zero(),
                kind: EntryPointType::Constructor,
            };
            self.run(&call, &instance, true)?
        } else {
            CallInfo {
                contract_address: instance.clone(),
                class_hash: Some(Felt::from(TARGET_CLASS)),
                entry_point_type: EntryPointType::Constructor,
                ..Default::default()
            }
        };
        self.instance = Some(instance);
        Ok(frame)
    }

    fn declare(&mut self, _artifact: &CompiledArtifact) -> Result<ClassHash, ExecutionError> {
        let class_hash = Felt::from(TARGET_CLASS + 1 + self.declared.len() as u64);
        self.declared.push(class_hash.clone());
        Ok(class_hash)
    }

    fn invoke(&mut self, call: &Invocation<'_>) -> Result<CallInfo, ExecutionError> {
        self.check_instance(call.instance)?;
        self.stats.invokes += 1;
        *self
            .stats
            .per_function
            .entry(call.function.to_string())
            .or_default() += 1;
        self.run(&Self::mock_call(call), call.instance, true)
    }

    fn call_readonly(&mut self, call: &Invocation<'_>) -> Result<CallInfo, ExecutionError> {
        self.check_instance(call.instance)?;
        self.stats.readonly_calls += 1;
        self.run(&Self::mock_call(call), call.instance, false)
    }

    fn snapshot(&mut self) -> Result<StateHandle, ExecutionError> {
        self.snapshots.push(self.state.clone());
        Ok(StateHandle(self.snapshots.len() as u64 - 1))
    }

    fn restore(&mut self, handle: &StateHandle) -> Result<(), ExecutionError> {
        let saved = self
            .snapshots
            .get(handle.0 as usize)
            .cloned()
            .ok_or_else(|| ExecutionError::Client(format!("unknown state handle {}", handle.0)))?;
        self.state = saved;
        self.stats.restores += 1;
        Ok(())
    }
}
