//! The set of obligations still being searched for.

use parking_lot::Mutex;

/// Live property names (or exception message templates), in declaration order.
///
/// Shared between the engine, the oracles and the shrinker. Entries only ever
/// leave the set, each at most once.
#[derive(Debug, Default)]
pub struct ObligationSet {
    live: Mutex<Vec<String>>,
}

impl ObligationSet {
    pub fn new<I, S>(obligations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut live: Vec<String> = Vec::new();
        for obligation in obligations {
            let obligation = obligation.into();
            if !live.contains(&obligation) {
                live.push(obligation);
            }
        }
        Self {
            live: Mutex::new(live),
        }
    }

    /// Copy of the live entries, so callers never hold the lock across calls.
    pub fn live(&self) -> Vec<String> {
        self.live.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }

    /// First live entry that `message` starts with.
    pub fn match_prefix(&self, message: &str) -> Option<String> {
        self.live
            .lock()
            .iter()
            .find(|template| message.starts_with(template.as_str()))
            .cloned()
    }

    /// Remove an obligation. Returns `false` if it was already retired.
    pub fn retire(&self, obligation: &str) -> bool {
        let mut live = self.live.lock();
        match live.iter().position(|o| o == obligation) {
            Some(idx) => {
                live.remove(idx);
                true
            }
            None => false,
        }
    }
}
