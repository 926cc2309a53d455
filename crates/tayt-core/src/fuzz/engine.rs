//! One fuzzing iteration: a random call sequence from the baseline state.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, trace};

use super::coverage::CoverageAccumulator;
use super::oracle::Oracle;
use super::report::{TxSequence, TxSequenceElement, Violation};
use super::tx_gen::{FuzzedCall, TxGenerator};
use crate::execution::{
    Event, ExecutionClient, ExecutionError, InstanceId, Invocation, RevertError, StateHandle,
};
use crate::schema::ProgramSchema;

/// A violating sequence as first found, before shrinking.
#[derive(Debug, Clone)]
pub struct IterationFinding {
    pub sequence: TxSequence,
    pub violations: Vec<Violation>,
}

pub struct SequenceEngine {
    target: InstanceId,
    baseline: StateHandle,
    seq_len: usize,
    coverage: Arc<CoverageAccumulator>,
    /// Retire obligations as soon as they are violated (no-shrink mode).
    retire_on_detection: bool,
}

impl SequenceEngine {
    pub fn new(
        target: InstanceId,
        baseline: StateHandle,
        seq_len: usize,
        coverage: Arc<CoverageAccumulator>,
        retire_on_detection: bool,
    ) -> Self {
        Self {
            target,
            baseline,
            seq_len,
            coverage,
            retire_on_detection,
        }
    }

    /// Run up to `seq_len` random calls, stopping at the first violation.
    ///
    /// Reverted calls are dropped from the sequence unless the oracle turns
    /// the revert itself into a violation, in which case the reverted call is
    /// the last element.
    pub fn run_iteration(
        &self,
        client: &mut dyn ExecutionClient,
        tx_gen: &mut TxGenerator,
        schema: &ProgramSchema,
        oracle: &dyn Oracle,
    ) -> Result<Option<IterationFinding>> {
        client
            .restore(&self.baseline)
            .context("restoring baseline state")?;

        let mut sequence = TxSequence::new();
        for _ in 0..self.seq_len {
            let tx = tx_gen.generate_fuzzed_tx(&schema.functions, &schema.structs)?;
            let call = Invocation {
                instance: &self.target,
                function: &tx.function,
                args: &tx.arguments,
                sender: &tx.sender,
                value: 0,
                kind: tx.kind,
                nonce: tx.nonce.as_ref(),
            };

            let violations = match client.invoke(&call) {
                Ok(info) => {
                    self.coverage.record_call(&info);
                    sequence.push(element(tx, info.sorted_events()));
                    oracle.check_after_call(client)?
                }
                Err(ExecutionError::Revert(revert)) => match oracle.check_revert(&revert) {
                    Some(violation) => {
                        sequence.push(element(tx, Vec::new()));
                        vec![violation]
                    }
                    None => {
                        trace!(function = %tx.function, reason = %revert.last_line(), "call reverted");
                        continue;
                    }
                },
                Err(e @ ExecutionError::Client(_)) => {
                    return Err(e).with_context(|| format!("invoking {}", tx.function));
                }
            };

            if !violations.is_empty() {
                if self.retire_on_detection {
                    oracle.retire(&violations);
                }
                debug!(
                    calls = sequence.len(),
                    violations = violations.len(),
                    "violating sequence found"
                );
                return Ok(Some(IterationFinding {
                    sequence,
                    violations,
                }));
            }
        }

        Ok(None)
    }
}

fn element(tx: FuzzedCall, events: Vec<Event>) -> TxSequenceElement {
    TxSequenceElement {
        sender: tx.sender,
        function_name: tx.function,
        arguments: tx.arguments,
        entry_point_type: tx.kind,
        nonce: tx.nonce,
        events_emitted: events,
    }
}

/// Restore `baseline` and re-execute the exact recorded calls of `sequence`.
///
/// Reverts are passed to `on_revert`; returning `true` stops the replay.
/// Returns whether the replay was stopped early.
pub fn replay_sequence<F>(
    client: &mut dyn ExecutionClient,
    target: &InstanceId,
    baseline: &StateHandle,
    sequence: &[TxSequenceElement],
    mut on_revert: F,
) -> Result<bool>
where
    F: FnMut(&RevertError) -> bool,
{
    client.restore(baseline).context("restoring baseline state")?;
    for tx in sequence {
        let call = Invocation {
            instance: target,
            function: &tx.function_name,
            args: &tx.arguments,
            sender: &tx.sender,
            value: 0,
            kind: tx.entry_point_type,
            nonce: tx.nonce.as_ref(),
        };
        match client.invoke(&call) {
            Ok(_) => {}
            Err(ExecutionError::Revert(revert)) => {
                if on_revert(&revert) {
                    return Ok(true);
                }
            }
            Err(e @ ExecutionError::Client(_)) => {
                return Err(e).with_context(|| format!("replaying {}", tx.function_name));
            }
        }
    }
    Ok(false)
}
