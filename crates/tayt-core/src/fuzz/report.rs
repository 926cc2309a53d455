//! Report types for fuzz findings.

use std::fmt;

use serde::{Deserialize, Serialize};
use tayt_types::Felt;
use tracing::info;

use crate::execution::{EntryPointType, Event};
use crate::schema::ProgramSchema;

/// What the run is looking for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleMode {
    /// Boolean property functions returning 0.
    #[default]
    Property,
    /// Internal assertion failures carrying a catalogued message.
    Exception,
}

impl fmt::Display for OracleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleMode::Property => write!(f, "property"),
            OracleMode::Exception => write!(f, "exception"),
        }
    }
}

/// One executed call of a reproducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSequenceElement {
    pub sender: Felt,
    pub function_name: String,
    pub arguments: Vec<Felt>,
    pub entry_point_type: EntryPointType,
    pub nonce: Option<Felt>,
    /// Events emitted by the call, in emission order. Empty for a call that reverted.
    pub events_emitted: Vec<Event>,
}

pub type TxSequence = Vec<TxSequenceElement>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Violation {
    PropertyViolated {
        name: String,
        events: Vec<Event>,
    },
    ExceptionRaised {
        /// The live message template the exception matched.
        template: String,
        /// Message extracted from the diagnostic.
        message: String,
    },
}

impl Violation {
    /// The obligation this violation discharges.
    pub fn obligation(&self) -> &str {
        match self {
            Violation::PropertyViolated { name, .. } => name,
            Violation::ExceptionRaised { template, .. } => template,
        }
    }
}

/// A reproducible violation and its (possibly shrunk) call sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Iteration of the fuzz loop that found it.
    pub iteration: u64,
    pub violations: Vec<Violation>,
    pub sequence: TxSequence,
    /// Length of the sequence before shrinking.
    pub original_len: usize,
    pub shrunk: bool,
}

impl Finding {
    /// Human-readable log lines for this finding.
    pub fn render(&self, schema: &ProgramSchema) -> Vec<String> {
        let mut lines = Vec::new();
        for violation in &self.violations {
            match violation {
                Violation::PropertyViolated { name, events } => {
                    lines.push(format!("[!] {name} violated"));
                    for event in events {
                        lines.push(format!("\tE {}", format_event(schema, event)));
                    }
                }
                Violation::ExceptionRaised { message, .. } => {
                    lines.push(format!("[!] {message} violated"));
                }
            }
            lines.push("Call sequence:".to_string());
        }
        for tx in &self.sequence {
            lines.push(format!(
                "\t{}{} from {}",
                tx.function_name,
                format_felts(&tx.arguments),
                tx.sender
            ));
            for event in &tx.events_emitted {
                lines.push(format!("\t E {}", format_event(schema, event)));
            }
        }
        lines
    }

    pub fn log(&self, schema: &ProgramSchema) {
        for line in self.render(schema) {
            info!("{line}");
        }
    }
}

/// Complete report from a fuzz run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzReport {
    /// Target artifact or source file.
    pub target: String,
    pub mode: OracleMode,
    /// Random seed used.
    pub seed: u64,
    /// Iterations completed.
    pub iterations: u64,
    /// Elapsed time in milliseconds.
    pub elapsed_ms: u64,
    /// Obligations at the start of the run.
    pub obligations: Vec<String>,
    /// Obligations still live when the run stopped.
    pub remaining: Vec<String>,
    pub findings: Vec<Finding>,
    /// Distinct instruction addresses executed across all instances.
    pub covered_instructions: usize,
}

impl FuzzReport {
    pub fn all_violated(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// `[a, b, c]` in decimal.
pub fn format_felts(values: &[Felt]) -> String {
    let items: Vec<String> = values.iter().map(Felt::to_string).collect();
    format!("[{}]", items.join(", "))
}

/// Event name (resolved from its first key) followed by its data.
pub fn format_event(schema: &ProgramSchema, event: &Event) -> String {
    let name = match event.keys.first() {
        Some(selector) => schema
            .event_name(selector)
            .map(str::to_string)
            .unwrap_or_else(|| selector.to_hex_string()),
        None => "<anonymous>".to_string(),
    };
    format!("{name}{}", format_felts(&event.data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tayt_types::selector_from_name;

    fn schema_with_event(name: &str) -> ProgramSchema {
        let mut schema = ProgramSchema::default();
        schema
            .events
            .insert(selector_from_name(name), name.to_string());
        schema
    }

    fn element(function: &str, args: &[u64], events: Vec<Event>) -> TxSequenceElement {
        TxSequenceElement {
            sender: Felt::from(1u64),
            function_name: function.to_string(),
            arguments: args.iter().map(|a| Felt::from(*a)).collect(),
            entry_point_type: EntryPointType::External,
            nonce: None,
            events_emitted: events,
        }
    }

    #[test]
    fn test_render_property_finding() {
        let schema = schema_with_event("Transfer");
        let transfer = Event {
            order: 0,
            keys: vec![selector_from_name("Transfer")],
            data: vec![Felt::from(3u64), Felt::from(4u64)],
        };
        let finding = Finding {
            iteration: 7,
            violations: vec![Violation::PropertyViolated {
                name: "tayt_balance".into(),
                events: vec![transfer.clone()],
            }],
            sequence: vec![element("transfer", &[3, 4], vec![transfer])],
            original_len: 4,
            shrunk: true,
        };
        assert_eq!(
            finding.render(&schema),
            vec![
                "[!] tayt_balance violated",
                "\tE Transfer[3, 4]",
                "Call sequence:",
                "\ttransfer[3, 4] from 1",
                "\t E Transfer[3, 4]",
            ]
        );
    }

    #[test]
    fn test_render_exception_finding_and_unknown_event() {
        let schema = ProgramSchema::default();
        let unknown = Event {
            order: 0,
            keys: vec![Felt::from(0xffu64)],
            data: vec![],
        };
        let finding = Finding {
            iteration: 0,
            violations: vec![Violation::ExceptionRaised {
                template: "overflow".into(),
                message: "overflow at 3".into(),
            }],
            sequence: vec![element("bump", &[], vec![unknown])],
            original_len: 1,
            shrunk: false,
        };
        let lines = finding.render(&schema);
        assert_eq!(lines[0], "[!] overflow at 3 violated");
        assert_eq!(lines[2], "\tbump[] from 1");
        assert_eq!(lines[3], "\t E 0xff[]");
    }

    #[test]
    fn test_violation_serialization() {
        let violation = Violation::ExceptionRaised {
            template: "t".into(),
            message: "t: 1".into(),
        };
        let json = serde_json::to_string(&violation).unwrap();
        assert!(json.contains("\"type\":\"ExceptionRaised\""));
        assert_eq!(violation.obligation(), "t");
    }
}
