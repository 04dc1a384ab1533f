//! Selects the unique proposal for an iteration and detects equivocation.

use hare_types::{HareMessage, ValueSet};
use tracing::warn;

/// Tracks the winning proposal of the current iteration.
///
/// Several leaders may be sampled for the same round; the proposal whose
/// role proof has the smallest byte order wins the tie. A single leader
/// sending two distinct sets is equivocation and poisons the iteration:
/// once the conflict flag is up, no set is proposed and the iteration
/// cannot commit.
#[derive(Debug, Default)]
pub struct ProposalTracker {
    proposal: Option<HareMessage>,
    conflicting: bool,
}

impl ProposalTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a proposal received during the proposal round.
    pub fn on_proposal(&mut self, msg: HareMessage) {
        let Some(current) = &self.proposal else {
            self.proposal = Some(msg);
            return;
        };

        if current.pub_key == msg.pub_key && current.value_set() != msg.value_set() {
            warn!(sender = %msg.pub_key, "equivocating proposal detected");
            self.conflicting = true;
        }

        // Smaller role proof wins among distinct leaders.
        if msg.inner.role_proof.as_bytes() < current.inner.role_proof.as_bytes() {
            self.proposal = Some(msg);
        }
    }

    /// Record a proposal that arrived during the commit round. Late
    /// proposals can still reveal equivocation but never replace the
    /// tracked proposal.
    pub fn on_late_proposal(&mut self, msg: &HareMessage) {
        if let Some(current) = &self.proposal {
            if current.pub_key == msg.pub_key && current.value_set() != msg.value_set() {
                warn!(sender = %msg.pub_key, "late equivocating proposal detected");
                self.conflicting = true;
            }
        }
    }

    /// Has equivocation been observed?
    pub fn is_conflicting(&self) -> bool {
        self.conflicting
    }

    /// The proposed set, unless none was tracked or a conflict was seen.
    pub fn proposed_set(&self) -> Option<ValueSet> {
        if self.conflicting {
            return None;
        }
        self.proposal.as_ref().map(HareMessage::value_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{keypair, make_proposal, make_svp, values};
    use hare_types::{HareMessage, InstanceId, Keypair};

    const INSTANCE: InstanceId = InstanceId(1);

    fn proposal(signer: &Keypair, seeds: &[u8]) -> HareMessage {
        let backers = [keypair(10), keypair(11)];
        let svp = make_svp(&[&backers[0], &backers[1]], INSTANCE, 0, seeds);
        make_proposal(signer, INSTANCE, 1, seeds, svp)
    }

    #[test]
    fn test_first_proposal_adopted() {
        let mut tracker = ProposalTracker::new();
        tracker.on_proposal(proposal(&keypair(1), &[1]));
        assert_eq!(tracker.proposed_set(), Some(values(&[1])));
    }

    #[test]
    fn test_equivocation_raises_conflict() {
        let mut tracker = ProposalTracker::new();
        let leader = keypair(1);
        tracker.on_proposal(proposal(&leader, &[1]));
        tracker.on_proposal(proposal(&leader, &[2]));

        assert!(tracker.is_conflicting());
        assert_eq!(tracker.proposed_set(), None);
    }

    #[test]
    fn test_duplicate_proposal_is_not_conflict() {
        let mut tracker = ProposalTracker::new();
        let leader = keypair(1);
        tracker.on_proposal(proposal(&leader, &[1]));
        tracker.on_proposal(proposal(&leader, &[1]));

        assert!(!tracker.is_conflicting());
        assert_eq!(tracker.proposed_set(), Some(values(&[1])));
    }

    #[test]
    fn test_smaller_role_proof_wins() {
        let mut tracker = ProposalTracker::new();
        let (a, b) = (keypair(1), keypair(2));
        let (pa, pb) = (proposal(&a, &[1]), proposal(&b, &[2]));

        let expect = if pa.inner.role_proof.as_bytes() < pb.inner.role_proof.as_bytes() {
            values(&[1])
        } else {
            values(&[2])
        };

        tracker.on_proposal(pa);
        tracker.on_proposal(pb);
        // Competing leaders are not equivocation.
        assert!(!tracker.is_conflicting());
        assert_eq!(tracker.proposed_set(), Some(expect));
    }

    #[test]
    fn test_late_proposal_only_flags_conflict() {
        let mut tracker = ProposalTracker::new();
        let leader = keypair(1);
        tracker.on_proposal(proposal(&leader, &[1]));

        // A late duplicate changes nothing.
        tracker.on_late_proposal(&proposal(&leader, &[1]));
        assert_eq!(tracker.proposed_set(), Some(values(&[1])));

        // A late distinct set from the same leader poisons the iteration.
        tracker.on_late_proposal(&proposal(&leader, &[2]));
        assert!(tracker.is_conflicting());
        assert_eq!(tracker.proposed_set(), None);
    }

    #[test]
    fn test_empty_tracker_proposes_nothing() {
        let tracker = ProposalTracker::new();
        assert_eq!(tracker.proposed_set(), None);
        assert!(!tracker.is_conflicting());
    }
}
