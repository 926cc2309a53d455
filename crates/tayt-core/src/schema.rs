//! Discovery of the callable surface of a deployed program.
//!
//! Splits the ABI into state-mutating functions (the alphabet of generated
//! sequences), property functions (boolean invariants), and the struct and
//! event tables needed to generate arguments and print findings.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use tayt_types::{
    parse_arguments, selector_from_name, AbiEntry, CompiledArtifact, Felt, FunctionAbi,
    TypeDescriptor,
};

use crate::execution::EntryPointType;
use crate::setup::SetupError;

/// Struct name → member types in memory order.
pub type StructTable = HashMap<String, Vec<TypeDescriptor>>;

/// Entry points that are never fuzzed, whatever the user blacklists.
pub const ALWAYS_BLACKLISTED: [&str; 3] = ["constructor", "__default__", "__l1_default__"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Mutating,
    ReadOnlyProperty,
    MessageHandler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableFunction {
    pub name: String,
    pub arguments: Vec<TypeDescriptor>,
    pub kind: FunctionKind,
}

impl CallableFunction {
    pub fn entry_point_type(&self) -> EntryPointType {
        match self.kind {
            FunctionKind::MessageHandler => EntryPointType::L1Handler,
            FunctionKind::Mutating | FunctionKind::ReadOnlyProperty => EntryPointType::External,
        }
    }
}

/// Knobs for schema discovery.
#[derive(Debug, Clone)]
pub struct SchemaOptions {
    pub property_prefix: String,
    pub blacklist: BTreeSet<String>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            property_prefix: "tayt_".to_string(),
            blacklist: BTreeSet::new(),
        }
    }
}

impl SchemaOptions {
    fn is_blacklisted(&self, name: &str) -> bool {
        ALWAYS_BLACKLISTED.contains(&name) || self.blacklist.contains(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgramSchema {
    /// Mutating functions and message handlers, in ABI order.
    pub functions: Vec<CallableFunction>,
    /// Property functions, in ABI order.
    pub properties: Vec<CallableFunction>,
    pub structs: StructTable,
    /// Event selector → event name.
    pub events: HashMap<Felt, String>,
}

impl ProgramSchema {
    /// Build the schema of `target`. Structs and events of `declared` programs
    /// are registered too, since the target may emit or pass them along.
    pub fn discover(
        target: &CompiledArtifact,
        declared: &[&CompiledArtifact],
        options: &SchemaOptions,
    ) -> Result<Self, SetupError> {
        let mut schema = ProgramSchema::default();
        schema.register_types(&target.abi)?;
        for artifact in declared {
            schema.register_types(&artifact.abi)?;
        }

        for entry in &target.abi {
            match entry {
                AbiEntry::Function(f) if f.name.starts_with(&options.property_prefix) => {
                    if is_property_shape(f) {
                        schema.properties.push(CallableFunction {
                            name: f.name.clone(),
                            arguments: Vec::new(),
                            kind: FunctionKind::ReadOnlyProperty,
                        });
                    } else {
                        warn!(
                            function = %f.name,
                            prefix = %options.property_prefix,
                            "function has the property prefix but is not a view taking no \
                             arguments and returning one felt; it won't be used as a property"
                        );
                    }
                }
                AbiEntry::Function(f) if is_mutating(f, options) => {
                    schema
                        .functions
                        .push(callable(f, FunctionKind::Mutating)?);
                }
                AbiEntry::L1Handler(f) if is_mutating(f, options) => {
                    schema
                        .functions
                        .push(callable(f, FunctionKind::MessageHandler)?);
                }
                _ => {}
            }
        }

        Ok(schema)
    }

    /// Add the structs and events declared in `abi`.
    pub fn register_types(&mut self, abi: &[AbiEntry]) -> Result<(), SetupError> {
        for entry in abi {
            match entry {
                AbiEntry::Struct(s) => {
                    let members = s
                        .ordered_members()
                        .into_iter()
                        .map(|m| TypeDescriptor::parse(&m.ty))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|source| SetupError::MalformedType {
                            item: s.name.clone(),
                            source,
                        })?;
                    // Argument types name structs by their last scope segment.
                    let key = s.name.rsplit('.').next().unwrap_or(&s.name);
                    self.structs.insert(key.to_string(), members);
                }
                AbiEntry::Event(e) => {
                    self.events.insert(selector_from_name(&e.name), e.name.clone());
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn event_name(&self, selector: &Felt) -> Option<&str> {
        self.events.get(selector).map(String::as_str)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }
}

fn is_property_shape(f: &FunctionAbi) -> bool {
    f.inputs.is_empty() && f.is_view() && f.outputs.len() == 1 && f.outputs[0].ty == "felt"
}

fn is_mutating(f: &FunctionAbi, options: &SchemaOptions) -> bool {
    f.state_mutability.is_none() && !options.is_blacklisted(&f.name)
}

fn callable(f: &FunctionAbi, kind: FunctionKind) -> Result<CallableFunction, SetupError> {
    let arguments = parse_arguments(&f.inputs).map_err(|source| SetupError::MalformedType {
        item: f.name.clone(),
        source,
    })?;
    Ok(CallableFunction {
        name: f.name.clone(),
        arguments,
        kind,
    })
}
