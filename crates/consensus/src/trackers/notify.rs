//! Counts notifications per set and stores the certificates they carry.

use hare_types::{Certificate, HareMessage, PublicKey, SetId, ValueSet};
use std::collections::{BTreeMap, BTreeSet};

/// Tracks Notify messages across the lifetime of the instance.
///
/// Notification counts are keyed by the canonical set id, so equal sets
/// assembled in different orders accumulate together. Certificates are
/// remembered under `(ki, set)` and later back the validation of statuses
/// claiming a prior-iteration commit.
#[derive(Debug, Default)]
pub struct NotifyTracker {
    /// Distinct notifiers per set.
    notifiers: BTreeMap<SetId, BTreeSet<PublicKey>>,
    /// Certificates extracted from notify payloads.
    certificates: BTreeMap<(i32, SetId), Certificate>,
}

impl NotifyTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notification. Returns true when the sender was already
    /// counted for this set and the message is to be ignored.
    pub fn on_notify(&mut self, msg: &HareMessage) -> bool {
        let set_id = msg.value_set().id();
        let notifiers = self.notifiers.entry(set_id).or_default();
        if !notifiers.insert(msg.pub_key) {
            return true;
        }
        if let Some(cert) = &msg.certificate {
            self.certificates
                .entry((msg.inner.ki, set_id))
                .or_insert_with(|| cert.clone());
        }
        false
    }

    /// Number of distinct senders that notified for `set`.
    pub fn notifications_count(&self, set: &ValueSet) -> usize {
        self.notifiers
            .get(&set.id())
            .map_or(0, |senders| senders.len())
    }

    /// Is a certificate stored for `set` committed at iteration `ki`?
    pub fn has_certificate(&self, ki: i32, set: &ValueSet) -> bool {
        self.certificates.contains_key(&(ki, set.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{keypair, make_certificate, make_notify, values};
    use hare_types::InstanceId;

    const INSTANCE: InstanceId = InstanceId(1);

    fn notify(seed: u8, ki: i32, seeds: &[u8]) -> HareMessage {
        let (a, b) = (keypair(20), keypair(21));
        let cert = make_certificate(&[&a, &b], INSTANCE, 2, seeds);
        make_notify(&keypair(seed), INSTANCE, 2, ki, seeds, cert)
    }

    #[test]
    fn test_counts_distinct_senders_per_set() {
        let mut tracker = NotifyTracker::new();
        assert!(!tracker.on_notify(&notify(1, 0, &[1])));
        assert!(!tracker.on_notify(&notify(2, 0, &[1])));
        assert!(!tracker.on_notify(&notify(3, 0, &[2])));

        assert_eq!(tracker.notifications_count(&values(&[1])), 2);
        assert_eq!(tracker.notifications_count(&values(&[2])), 1);
        assert_eq!(tracker.notifications_count(&values(&[3])), 0);
    }

    #[test]
    fn test_duplicate_sender_is_ignored() {
        let mut tracker = NotifyTracker::new();
        assert!(!tracker.on_notify(&notify(1, 0, &[1])));
        assert!(tracker.on_notify(&notify(1, 0, &[1])));
        assert_eq!(tracker.notifications_count(&values(&[1])), 1);
    }

    #[test]
    fn test_same_sender_distinct_sets_both_count() {
        let mut tracker = NotifyTracker::new();
        assert!(!tracker.on_notify(&notify(1, 0, &[1])));
        assert!(!tracker.on_notify(&notify(1, 0, &[2])));
        assert_eq!(tracker.notifications_count(&values(&[1])), 1);
        assert_eq!(tracker.notifications_count(&values(&[2])), 1);
    }

    #[test]
    fn test_certificates_keyed_by_iteration_and_set() {
        let mut tracker = NotifyTracker::new();
        tracker.on_notify(&notify(1, 0, &[1]));

        assert!(tracker.has_certificate(0, &values(&[1])));
        assert!(!tracker.has_certificate(1, &values(&[1])));
        assert!(!tracker.has_certificate(0, &values(&[2])));
    }
}
