//! Deployment of the program under test and discovery of its surface.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tayt_types::{ArtifactError, CompiledArtifact, DiagnosticTemplate, TypeParseError};
use tracing::info;

use crate::execution::{ClassHash, ExecutionClient, ExecutionError, InstanceId, StateHandle};
use crate::fuzz::coverage::CoverageAccumulator;
use crate::schema::{ProgramSchema, SchemaOptions};

/// Fatal problems found before fuzzing starts.
#[derive(Debug, Clone)]
pub enum SetupError {
    /// The artifact carries no ABI.
    MissingAbi,
    /// The artifact could not be parsed.
    InvalidArtifact(String),
    /// Only argument-less constructors can be deployed.
    ConstructorWithArguments { inputs: usize },
    ConstructorReverted(String),
    DeclarationReverted(String),
    /// Nothing left to fuzz once properties and blacklisted functions are removed.
    NoMutatingFunctions,
    MalformedType {
        item: String,
        source: TypeParseError,
    },
    /// The execution substrate failed.
    Client(String),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::MissingAbi => write!(f, "No abi generated."),
            SetupError::InvalidArtifact(reason) => write!(f, "invalid artifact: {reason}"),
            SetupError::ConstructorWithArguments { inputs } => write!(
                f,
                "Constructor with arguments not supported ({inputs} inputs)."
            ),
            SetupError::ConstructorReverted(message) => {
                write!(f, "Constructor raised an exception.\nMessage: {message}")
            }
            SetupError::DeclarationReverted(message) => {
                write!(f, "Declaring a contract failed: {message}")
            }
            SetupError::NoMutatingFunctions => {
                write!(f, "No state-mutating function left to fuzz.")
            }
            SetupError::MalformedType { item, source } => {
                write!(f, "unsupported type in '{item}': {source}")
            }
            SetupError::Client(message) => write!(f, "execution client error: {message}"),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SetupError::MalformedType { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ArtifactError> for SetupError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::MissingAbi => SetupError::MissingAbi,
            other => SetupError::InvalidArtifact(other.to_string()),
        }
    }
}

/// The deployed program, ready to fuzz.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub instance: InstanceId,
    pub class_hash: ClassHash,
    pub schema: ProgramSchema,
    /// State right after deployment; every iteration starts from here.
    pub baseline: StateHandle,
    /// Every known program, target included, by class hash.
    pub classes: HashMap<ClassHash, Arc<CompiledArtifact>>,
    /// Distinct exception templates of the target and declared programs.
    pub diagnostics: Vec<DiagnosticTemplate>,
}

/// Declare `declared`, deploy `target` with no constructor arguments, record
/// constructor coverage and snapshot the baseline.
pub fn deploy(
    client: &mut dyn ExecutionClient,
    target: Arc<CompiledArtifact>,
    declared: &[Arc<CompiledArtifact>],
    options: &SchemaOptions,
    coverage: &CoverageAccumulator,
) -> Result<Deployment, SetupError> {
    if let Some(constructor) = target.constructor() {
        if !constructor.inputs.is_empty() {
            return Err(SetupError::ConstructorWithArguments {
                inputs: constructor.inputs.len(),
            });
        }
    }

    let mut classes = HashMap::new();
    for artifact in declared {
        let class_hash = client.declare(artifact).map_err(|e| match e {
            ExecutionError::Revert(r) => SetupError::DeclarationReverted(r.message),
            ExecutionError::Client(m) => SetupError::Client(m),
        })?;
        classes.insert(class_hash, Arc::clone(artifact));
    }

    let frame = client.deploy(&target, &[]).map_err(|e| match e {
        ExecutionError::Revert(r) => SetupError::ConstructorReverted(r.message),
        ExecutionError::Client(m) => SetupError::Client(m),
    })?;
    let instance = frame.contract_address.clone();
    let class_hash = match &frame.class_hash {
        Some(hash) => hash.clone(),
        None => client
            .declare(&target)
            .map_err(|e| SetupError::Client(e.to_string()))?,
    };
    coverage.link_class(&instance, &class_hash);
    coverage.record_call(&frame);
    classes.insert(class_hash.clone(), Arc::clone(&target));

    let declared_refs: Vec<&CompiledArtifact> = declared.iter().map(Arc::as_ref).collect();
    let schema = ProgramSchema::discover(&target, &declared_refs, options)?;
    if schema.functions.is_empty() {
        return Err(SetupError::NoMutatingFunctions);
    }

    info!("Fuzzing the following properties:");
    for property in &schema.properties {
        info!("\t{}", property.name);
    }
    info!("External functions:");
    for function in &schema.functions {
        info!("\t{}", function.name);
    }

    let mut diagnostics: Vec<DiagnosticTemplate> = Vec::new();
    for artifact in std::iter::once(&target).chain(declared.iter()) {
        for template in artifact.message_templates() {
            if !diagnostics
                .iter()
                .any(|d| d.message_template == template.message_template)
            {
                diagnostics.push(template.clone());
            }
        }
    }

    let baseline = client
        .snapshot()
        .map_err(|e| SetupError::Client(e.to_string()))?;

    Ok(Deployment {
        instance,
        class_hash,
        schema,
        baseline,
        classes,
        diagnostics,
    })
}
