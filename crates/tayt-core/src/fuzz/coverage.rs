//! Running union of executed instruction addresses per deployed instance.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;

use crate::execution::{CallInfo, ClassHash, EntryPointType, InstanceId};

#[derive(Debug, Clone, Default)]
pub struct CoverageSnapshot {
    pub pcs: BTreeMap<InstanceId, BTreeSet<u64>>,
    /// Instance → class linkage, needed to map addresses back to source.
    pub classes: BTreeMap<InstanceId, ClassHash>,
}

impl CoverageSnapshot {
    pub fn total(&self) -> usize {
        self.pcs.values().map(BTreeSet::len).sum()
    }
}

/// Coverage shared across iterations. Grows monotonically.
#[derive(Debug, Default)]
pub struct CoverageAccumulator {
    inner: Mutex<CoverageSnapshot>,
}

impl CoverageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `pcs` into the instance's set. Returns how many were new.
    pub fn update(&self, instance: &InstanceId, pcs: impl IntoIterator<Item = u64>) -> usize {
        let mut inner = self.inner.lock();
        let covered = inner.pcs.entry(instance.clone()).or_default();
        pcs.into_iter().filter(|pc| covered.insert(*pc)).count()
    }

    pub fn link_class(&self, instance: &InstanceId, class_hash: &ClassHash) {
        self.inner
            .lock()
            .classes
            .insert(instance.clone(), class_hash.clone());
    }

    /// Merge a whole call tree, attributing every frame to its own instance.
    ///
    /// Constructor frames also register the instance → class linkage of the
    /// program they deployed. Returns how many addresses were new.
    pub fn record_call(&self, call: &CallInfo) -> usize {
        let mut inner = self.inner.lock();
        let mut new = 0;
        let mut stack = vec![call];
        while let Some(frame) = stack.pop() {
            if frame.entry_point_type == EntryPointType::Constructor {
                if let Some(class_hash) = &frame.class_hash {
                    inner
                        .classes
                        .insert(frame.contract_address.clone(), class_hash.clone());
                }
            }
            let covered = inner.pcs.entry(frame.contract_address.clone()).or_default();
            new += frame
                .executed_pcs
                .iter()
                .filter(|pc| covered.insert(**pc))
                .count();
            stack.extend(frame.internal_calls.iter());
        }
        new
    }

    pub fn class_of(&self, instance: &InstanceId) -> Option<ClassHash> {
        self.inner.lock().classes.get(instance).cloned()
    }

    pub fn covered(&self, instance: &InstanceId) -> BTreeSet<u64> {
        self.inner
            .lock()
            .pcs
            .get(instance)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> CoverageSnapshot {
        self.inner.lock().clone()
    }

    pub fn total(&self) -> usize {
        self.inner.lock().total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tayt_types::Felt;

    fn frame(address: u64, pcs: &[u64]) -> CallInfo {
        CallInfo {
            contract_address: Felt::from(address),
            executed_pcs: pcs.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_never_shrinks() {
        let coverage = CoverageAccumulator::new();
        let instance = Felt::from(1u64);
        assert_eq!(coverage.update(&instance, [1, 2, 3]), 3);
        assert_eq!(coverage.update(&instance, [2, 3, 4]), 1);
        assert_eq!(coverage.update(&instance, []), 0);
        assert_eq!(
            coverage.covered(&instance).into_iter().collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_nested_calls_attributed_to_their_instance() {
        let coverage = CoverageAccumulator::new();
        let mut child = frame(20, &[7, 8]);
        child.entry_point_type = EntryPointType::Constructor;
        child.class_hash = Some(Felt::from(0xabcu64));

        let mut call = frame(10, &[1, 2]);
        call.internal_calls = vec![child, frame(30, &[5])];

        assert_eq!(coverage.record_call(&call), 5);
        assert_eq!(coverage.covered(&Felt::from(10u64)).len(), 2);
        assert_eq!(coverage.covered(&Felt::from(20u64)).len(), 2);
        assert_eq!(coverage.covered(&Felt::from(30u64)).len(), 1);
        assert_eq!(
            coverage.class_of(&Felt::from(20u64)),
            Some(Felt::from(0xabcu64))
        );
        assert_eq!(coverage.class_of(&Felt::from(30u64)), None);

        // Replaying the same tree adds nothing.
        assert_eq!(coverage.record_call(&call), 0);
        assert_eq!(coverage.total(), 5);
    }
}
