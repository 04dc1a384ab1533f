//! Tracks Status messages and derives the safe-value proof.

use hare_types::{AggregatedMessages, HareMessage, PublicKey, SafeValueProof, ValueSet};
use std::collections::BTreeMap;
use tracing::debug;

/// Records one Status per sender during the status round, then analyses the
/// record at end of round to find the statuses whose sets can actually be
/// proven. Those back the safe-value proof and the proposal set.
#[derive(Debug)]
pub struct StatusTracker {
    /// First status seen from each sender.
    statuses: BTreeMap<PublicKey, HareMessage>,
    /// Statuses that passed analysis, in sender order.
    analyzed: Vec<HareMessage>,
    /// Proof threshold (f+1).
    threshold: usize,
}

impl StatusTracker {
    /// Create a tracker requiring `threshold` proving statuses.
    pub fn new(threshold: usize) -> Self {
        Self {
            statuses: BTreeMap::new(),
            analyzed: Vec::new(),
            threshold,
        }
    }

    /// Record a status. The first message from a sender wins.
    pub fn record_status(&mut self, msg: HareMessage) {
        if self.statuses.contains_key(&msg.pub_key) {
            debug!(sender = %msg.pub_key, "duplicate status ignored");
            return;
        }
        self.statuses.insert(msg.pub_key, msg);
    }

    /// Number of recorded statuses.
    pub fn recorded(&self) -> usize {
        self.statuses.len()
    }

    /// Mark the statuses for which `is_proving` holds. Called once at the
    /// end of the status round.
    pub fn analyze_statuses(&mut self, mut is_proving: impl FnMut(&HareMessage) -> bool) {
        self.analyzed = self
            .statuses
            .values()
            .filter(|msg| is_proving(msg))
            .cloned()
            .collect();
    }

    /// Do enough analysed statuses exist to build a safe-value proof?
    pub fn is_svp_ready(&self) -> bool {
        self.analyzed.len() >= self.threshold
    }

    /// The union of all analysed status sets, capped at `capacity` values
    /// in canonical order.
    pub fn proposal_set(&self, capacity: usize) -> ValueSet {
        let mut union = ValueSet::new();
        for msg in &self.analyzed {
            union.union_with(&msg.value_set());
        }
        union.truncated(capacity)
    }

    /// Build the safe-value proof, or `None` when below threshold.
    pub fn build_svp(&self) -> Option<SafeValueProof> {
        if !self.is_svp_ready() {
            return None;
        }
        Some(SafeValueProof {
            aggregate: AggregatedMessages {
                messages: self.analyzed.clone(),
            },
        })
    }
}
