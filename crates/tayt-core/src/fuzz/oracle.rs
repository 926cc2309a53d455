//! Violation detection.
//!
//! An [`Oracle`] decides whether the state reached by a call sequence breaks
//! one of the live obligations. The engine and the shrinker only talk to the
//! trait, so both oracle modes share the same loop.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tayt_types::Felt;
use tracing::debug;

use super::coverage::CoverageAccumulator;
use super::obligations::ObligationSet;
use super::report::Violation;
use crate::execution::{
    EntryPointType, ExecutionClient, ExecutionError, InstanceId, Invocation, RevertError,
};

pub trait Oracle: Send + Sync {
    fn obligations(&self) -> &ObligationSet;

    /// Inspect the state after a successful state-mutating call.
    fn check_after_call(&self, client: &mut dyn ExecutionClient) -> Result<Vec<Violation>>;

    /// Inspect a reverted call. The revert's state change was never applied.
    fn check_revert(&self, revert: &RevertError) -> Option<Violation>;

    /// Inspect the state at the end of a replayed sequence.
    fn check_after_replay(&self, client: &mut dyn ExecutionClient) -> Result<Vec<Violation>>;

    /// Whether `replayed` counts as the same finding as `original`.
    fn reproduces(&self, original: &[Violation], replayed: &[Violation]) -> bool;

    /// Discharge the obligations of an accepted finding.
    fn retire(&self, violations: &[Violation]) {
        for violation in violations {
            if self.obligations().retire(violation.obligation()) {
                debug!(obligation = violation.obligation(), "obligation retired");
            }
        }
    }
}

/// Calls every live property function after each mutating call.
pub struct PropertyOracle {
    target: InstanceId,
    psender: Felt,
    obligations: Arc<ObligationSet>,
    coverage: Arc<CoverageAccumulator>,
}

impl PropertyOracle {
    pub fn new(
        target: InstanceId,
        psender: Felt,
        obligations: Arc<ObligationSet>,
        coverage: Arc<CoverageAccumulator>,
    ) -> Self {
        Self {
            target,
            psender,
            obligations,
            coverage,
        }
    }

    fn evaluate(&self, client: &mut dyn ExecutionClient) -> Result<Vec<Violation>> {
        let mut violated = Vec::new();
        for name in self.obligations.live() {
            let query = Invocation {
                instance: &self.target,
                function: &name,
                args: &[],
                sender: &self.psender,
                value: 0,
                kind: EntryPointType::External,
                nonce: None,
            };
            match client.call_readonly(&query) {
                Ok(call) => {
                    self.coverage.record_call(&call);
                    if call.retdata.len() == 1 && call.retdata[0].is_zero() {
                        violated.push(Violation::PropertyViolated {
                            name,
                            events: call.sorted_events(),
                        });
                    }
                }
                Err(ExecutionError::Revert(revert)) => {
                    // Only a returned 0 breaks a property.
                    debug!(property = %name, reason = %revert.last_line(), "property query reverted");
                }
                Err(e @ ExecutionError::Client(_)) => {
                    return Err(anyhow!(e).context(format!("querying property {name}")));
                }
            }
        }
        Ok(violated)
    }
}

impl Oracle for PropertyOracle {
    fn obligations(&self) -> &ObligationSet {
        &self.obligations
    }

    fn check_after_call(&self, client: &mut dyn ExecutionClient) -> Result<Vec<Violation>> {
        self.evaluate(client)
    }

    fn check_revert(&self, _revert: &RevertError) -> Option<Violation> {
        None
    }

    fn check_after_replay(&self, client: &mut dyn ExecutionClient) -> Result<Vec<Violation>> {
        self.evaluate(client)
    }

    // Same number of violated properties, not necessarily the same ones.
    fn reproduces(&self, original: &[Violation], replayed: &[Violation]) -> bool {
        replayed.len() == original.len()
    }
}

/// Matches internal assertion failures against catalogued message templates.
pub struct ExceptionOracle {
    obligations: Arc<ObligationSet>,
    signatures: Vec<String>,
}

impl ExceptionOracle {
    pub fn new(obligations: Arc<ObligationSet>, signatures: Vec<String>) -> Self {
        Self {
            obligations,
            signatures,
        }
    }

    /// Message carried by the last diagnostic line, if it starts with a known
    /// assertion signature followed by `": "`.
    pub fn extract_message<'a>(&self, revert: &'a RevertError) -> Option<&'a str> {
        let last_line = revert.last_line();
        self.signatures.iter().find_map(|signature| {
            last_line
                .strip_prefix(signature.as_str())
                .and_then(|rest| rest.strip_prefix(": "))
        })
    }
}

impl Oracle for ExceptionOracle {
    fn obligations(&self) -> &ObligationSet {
        &self.obligations
    }

    fn check_after_call(&self, _client: &mut dyn ExecutionClient) -> Result<Vec<Violation>> {
        Ok(Vec::new())
    }

    fn check_revert(&self, revert: &RevertError) -> Option<Violation> {
        let message = self.extract_message(revert)?;
        let template = self.obligations.match_prefix(message)?;
        Some(Violation::ExceptionRaised {
            template,
            message: message.to_string(),
        })
    }

    fn check_after_replay(&self, _client: &mut dyn ExecutionClient) -> Result<Vec<Violation>> {
        Ok(Vec::new())
    }

    fn reproduces(&self, original: &[Violation], replayed: &[Violation]) -> bool {
        let message_of = |v: &Violation| match v {
            Violation::ExceptionRaised { message, .. } => Some(message.clone()),
            Violation::PropertyViolated { .. } => None,
        };
        let original: Vec<_> = original.iter().filter_map(message_of).collect();
        let replayed: Vec<_> = replayed.iter().filter_map(message_of).collect();
        !original.is_empty() && original == replayed
    }
}
