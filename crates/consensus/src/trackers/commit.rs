//! Aggregates Commit votes over the proposed set into a certificate.

use hare_types::{AggregatedMessages, Certificate, HareMessage, PublicKey, ValueSet};
use std::collections::BTreeMap;
use tracing::debug;

/// Collects Commit messages that match the set proposed this iteration.
///
/// Constructed fresh at the start of each commit round, parameterised by
/// the proposed set. With no proposal the tracker is inert and ignores
/// every commit.
#[derive(Debug)]
pub struct CommitTracker {
    /// The set commits must match, if any was proposed.
    target: Option<ValueSet>,
    /// First matching commit per sender.
    commits: BTreeMap<PublicKey, HareMessage>,
    /// Certificate threshold (f+1).
    threshold: usize,
}

impl CommitTracker {
    /// Create a tracker for `target`. `None` means no proposal this
    /// iteration.
    pub fn new(threshold: usize, target: Option<ValueSet>) -> Self {
        Self {
            target,
            commits: BTreeMap::new(),
            threshold,
        }
    }

    /// Record a commit. Mismatching sets and duplicate senders are ignored.
    pub fn on_commit(&mut self, msg: HareMessage) {
        let Some(target) = &self.target else {
            return;
        };
        if &msg.value_set() != target {
            debug!(sender = %msg.pub_key, "commit for a different set ignored");
            return;
        }
        self.commits.entry(msg.pub_key).or_insert(msg);
    }

    /// Number of distinct committing senders.
    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Has the certificate threshold been reached?
    pub fn has_enough_commits(&self) -> bool {
        self.commits.len() >= self.threshold
    }

    /// Build the certificate, or `None` while below threshold.
    pub fn build_certificate(&self) -> Option<Certificate> {
        if !self.has_enough_commits() {
            return None;
        }
        let target = self.target.as_ref()?;
        Some(Certificate {
            values: target.to_vec(),
            aggregate: AggregatedMessages {
                messages: self.commits.values().cloned().collect(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{keypair, make_commit, values};
    use hare_types::InstanceId;

    const INSTANCE: InstanceId = InstanceId(1);

    #[test]
    fn test_collects_matching_commits() {
        let mut tracker = CommitTracker::new(2, Some(values(&[1, 2])));
        tracker.on_commit(make_commit(&keypair(1), INSTANCE, 2, &[1, 2]));
        assert!(!tracker.has_enough_commits());

        tracker.on_commit(make_commit(&keypair(2), INSTANCE, 2, &[1, 2]));
        assert!(tracker.has_enough_commits());

        let cert = tracker.build_certificate().unwrap();
        assert_eq!(cert.aggregate.len(), 2);
        assert_eq!(cert.value_set(), values(&[1, 2]));
    }

    #[test]
    fn test_mismatching_set_ignored() {
        let mut tracker = CommitTracker::new(2, Some(values(&[1])));
        tracker.on_commit(make_commit(&keypair(1), INSTANCE, 2, &[2]));
        assert_eq!(tracker.commit_count(), 0);
    }

    #[test]
    fn test_duplicate_sender_counts_once() {
        let mut tracker = CommitTracker::new(2, Some(values(&[1])));
        let signer = keypair(1);
        tracker.on_commit(make_commit(&signer, INSTANCE, 2, &[1]));
        tracker.on_commit(make_commit(&signer, INSTANCE, 2, &[1]));
        assert_eq!(tracker.commit_count(), 1);
        assert!(tracker.build_certificate().is_none());
    }

    #[test]
    fn test_without_target_everything_is_ignored() {
        let mut tracker = CommitTracker::new(2, None);
        tracker.on_commit(make_commit(&keypair(1), INSTANCE, 2, &[1]));
        tracker.on_commit(make_commit(&keypair(2), INSTANCE, 2, &[1]));
        assert_eq!(tracker.commit_count(), 0);
        assert!(tracker.build_certificate().is_none());
    }
}
