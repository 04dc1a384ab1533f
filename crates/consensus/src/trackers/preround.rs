//! Tracks which values were advertised during the bootstrap phase.

use hare_types::{HareMessage, PublicKey, ValueId, ValueSet};
use std::collections::{BTreeMap, BTreeSet};

/// Records, per value, the distinct senders that advertised it in a
/// PreRound message. A value is proven once f+1 distinct senders vouch for
/// it, which guarantees at least one honest participant started with it.
#[derive(Debug)]
pub struct PreRoundTracker {
    /// Senders that advertised each value.
    senders_by_value: BTreeMap<ValueId, BTreeSet<PublicKey>>,
    /// Proof threshold (f+1).
    threshold: usize,
}

impl PreRoundTracker {
    /// Create a tracker requiring `threshold` distinct senders per value.
    pub fn new(threshold: usize) -> Self {
        Self {
            senders_by_value: BTreeMap::new(),
            threshold,
        }
    }

    /// Record a PreRound advertisement. Duplicate senders collapse.
    pub fn on_pre_round(&mut self, msg: &HareMessage) {
        for value in &msg.inner.values {
            self.senders_by_value
                .entry(*value)
                .or_default()
                .insert(msg.pub_key);
        }
    }

    /// Can this single value be proven?
    pub fn can_prove_value(&self, value: &ValueId) -> bool {
        self.senders_by_value
            .get(value)
            .is_some_and(|senders| senders.len() >= self.threshold)
    }

    /// Can every value of `set` be proven?
    pub fn can_prove_set(&self, set: &ValueSet) -> bool {
        set.iter().all(|value| self.can_prove_value(value))
    }

    /// Shrink `set` to its provable subset.
    pub fn filter_set(&self, set: &mut ValueSet) {
        set.retain(|value| self.can_prove_value(value));
    }
}
