//! Compiled contract artifacts.
//!
//! An artifact is the JSON emitted by the external compiler: the ABI, the
//! program with its debug info (instruction address → source location), and
//! an optional list of structured assertion diagnostics.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::abi::{AbiEntry, FunctionAbi};

/// A compiled program together with its raw JSON form.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    pub abi: Vec<AbiEntry>,
    pub debug_info: Option<DebugInfo>,
    pub diagnostics: Vec<DiagnosticTemplate>,
    /// The artifact exactly as loaded; forwarded to the execution substrate.
    pub raw: Value,
}

/// Assertion signature and message template embedded by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticTemplate {
    /// Qualified name prefixing the last diagnostic line, e.g. `app.AssertionException`.
    pub signature: String,
    pub message_template: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugInfo {
    #[serde(default)]
    pub instruction_locations: BTreeMap<u64, InstructionLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionLocation {
    pub inst: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub input_file: InputFile,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub parent_location: Option<(Box<Location>, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFile {
    #[serde(default)]
    pub filename: Option<String>,
}

/// A resolved source span (1-based, inclusive lines).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    pub filename: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug)]
pub enum ArtifactError {
    Json(serde_json::Error),
    MissingAbi,
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::Json(e) => write!(f, "malformed artifact: {e}"),
            ArtifactError::MissingAbi => write!(f, "no abi generated"),
        }
    }
}

impl std::error::Error for ArtifactError {}

impl From<serde_json::Error> for ArtifactError {
    fn from(e: serde_json::Error) -> Self {
        ArtifactError::Json(e)
    }
}

impl CompiledArtifact {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ArtifactError> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    pub fn from_value(raw: Value) -> Result<Self, ArtifactError> {
        let abi = match raw.get("abi") {
            Some(Value::Null) | None => return Err(ArtifactError::MissingAbi),
            Some(abi) => serde_json::from_value(abi.clone())?,
        };
        let debug_info = match raw.get("program").and_then(|p| p.get("debug_info")) {
            Some(Value::Null) | None => None,
            Some(info) => Some(serde_json::from_value(info.clone())?),
        };
        let diagnostics = match raw.get("diagnostics") {
            Some(Value::Null) | None => Vec::new(),
            Some(list) => serde_json::from_value(list.clone())?,
        };
        Ok(Self {
            abi,
            debug_info,
            diagnostics,
            raw,
        })
    }

    pub fn constructor(&self) -> Option<&FunctionAbi> {
        self.abi.iter().find_map(|entry| match entry {
            AbiEntry::Constructor(f) => Some(f),
            _ => None,
        })
    }

    /// Distinct message templates in declaration order.
    pub fn message_templates(&self) -> Vec<&DiagnosticTemplate> {
        let mut seen = std::collections::HashSet::new();
        self.diagnostics
            .iter()
            .filter(|d| seen.insert(d.message_template.as_str()))
            .collect()
    }

    /// Every source span an instruction address maps to, innermost first.
    pub fn source_spans(&self, pc: u64) -> Vec<SourceSpan> {
        let Some(location) = self
            .debug_info
            .as_ref()
            .and_then(|d| d.instruction_locations.get(&pc))
        else {
            return Vec::new();
        };

        let mut spans = Vec::new();
        let mut current = Some(&location.inst);
        while let Some(loc) = current {
            if let Some(filename) = &loc.input_file.filename {
                spans.push(SourceSpan {
                    filename: filename.clone(),
                    start_line: loc.start_line,
                    end_line: loc.end_line,
                });
            }
            current = loc.parent_location.as_ref().map(|(parent, _)| parent.as_ref());
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_abi_is_rejected() {
        let err = CompiledArtifact::from_value(json!({"program": {}})).unwrap_err();
        assert!(matches!(err, ArtifactError::MissingAbi));
    }

    #[test]
    fn test_source_spans_follow_parents() {
        let artifact = CompiledArtifact::from_value(json!({
            "abi": [],
            "program": {"debug_info": {"instruction_locations": {
                "7": {"inst": {
                    "input_file": {"filename": "lib.cairo"},
                    "start_line": 3, "end_line": 4,
                    "parent_location": [
                        {"input_file": {"filename": "main.cairo"}, "start_line": 10, "end_line": 10},
                        "While expanding the reference"
                    ]
                }}
            }}}
        }))
        .unwrap();

        let spans = artifact.source_spans(7);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].filename, "lib.cairo");
        assert_eq!(spans[1].start_line, 10);
        assert!(artifact.source_spans(8).is_empty());
    }

    #[test]
    fn test_message_templates_are_distinct() {
        let artifact = CompiledArtifact::from_value(json!({
            "abi": [],
            "diagnostics": [
                {"signature": "app.AssertionException", "message_template": "balance overflow"},
                {"signature": "app.AssertionException", "message_template": "balance overflow"},
                {"signature": "app.AssertionException", "message_template": "bad owner"}
            ]
        }))
        .unwrap();
        let templates: Vec<_> = artifact
            .message_templates()
            .iter()
            .map(|d| d.message_template.as_str())
            .collect();
        assert_eq!(templates, vec!["balance overflow", "bad owner"]);
    }
}
