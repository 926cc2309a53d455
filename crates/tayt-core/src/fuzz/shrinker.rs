//! One-pass delta debugging of violating call sequences.

use anyhow::Result;
use tracing::debug;

use super::engine::replay_sequence;
use super::oracle::Oracle;
use super::report::{TxSequence, Violation};
use crate::execution::{ExecutionClient, InstanceId, StateHandle};

pub struct Shrinker {
    target: InstanceId,
    baseline: StateHandle,
}

impl Shrinker {
    pub fn new(target: InstanceId, baseline: StateHandle) -> Self {
        Self { target, baseline }
    }

    /// Drop every call whose removal still reproduces `violations`.
    ///
    /// A cursor walks the sequence once. When removing the element under the
    /// cursor still reproduces, the shorter sequence is adopted and the cursor
    /// stays put, otherwise it advances. The violated obligations are retired
    /// once shrinking ends.
    pub fn shrink(
        &self,
        client: &mut dyn ExecutionClient,
        oracle: &dyn Oracle,
        sequence: TxSequence,
        violations: &[Violation],
    ) -> Result<TxSequence> {
        let original_len = sequence.len();
        let mut current = sequence;
        let mut i = 0;
        while i < current.len() {
            let mut trial = current.clone();
            trial.remove(i);

            if self.reproduces(client, oracle, &trial, violations)? {
                current = trial;
            } else {
                i += 1;
            }
        }

        debug!(from = original_len, to = current.len(), "sequence shrunk");
        oracle.retire(violations);
        Ok(current)
    }

    /// Replay `trial` from the baseline and compare the outcome with `violations`.
    pub fn reproduces(
        &self,
        client: &mut dyn ExecutionClient,
        oracle: &dyn Oracle,
        trial: &TxSequence,
        violations: &[Violation],
    ) -> Result<bool> {
        let mut raised = false;
        let stopped = replay_sequence(client, &self.target, &self.baseline, trial, |revert| {
            match oracle.check_revert(revert) {
                Some(violation) => {
                    raised = oracle.reproduces(violations, std::slice::from_ref(&violation));
                    raised
                }
                None => false,
            }
        })?;
        if stopped {
            return Ok(raised);
        }

        let replayed = oracle.check_after_replay(client)?;
        Ok(!replayed.is_empty() && oracle.reproduces(violations, &replayed))
    }
}
