//! Protocol message types.
//!
//! A [`HareMessage`] is the unit of gossip. The signature covers only the
//! encoded [`InnerMessage`]; the optional aggregates ([`Certificate`],
//! [`SafeValueProof`]) ride outside the signed payload and carry their own
//! individually signed messages for independent verification.

use crate::crypto::{PublicKey, Signature};
use crate::identifiers::{InstanceId, ValueId};
use crate::set::ValueSet;
use serde::{Deserialize, Serialize};

/// The five protocol message kinds, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Bootstrap advertisement of the starting set.
    PreRound = 0,
    /// Per-iteration report of the sender's current set.
    Status = 1,
    /// Leader's proposed set, justified by a safe-value proof.
    Proposal = 2,
    /// Vote to commit the proposed set.
    Commit = 3,
    /// Announcement that a set was committed, carrying the certificate.
    Notify = 4,
}

impl MessageType {
    /// Human-readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::PreRound => "PreRound",
            MessageType::Status => "Status",
            MessageType::Proposal => "Proposal",
            MessageType::Commit => "Commit",
            MessageType::Notify => "Notify",
        }
    }
}

/// The signed payload of a [`HareMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerMessage {
    /// Message kind.
    pub message_type: MessageType,
    /// The protocol instance this message belongs to.
    pub instance_id: InstanceId,
    /// Round counter at the sender when the message was built.
    pub k: u32,
    /// Iteration in which the sender last committed, or -1 for never.
    pub ki: i32,
    /// The value set the message speaks about, in canonical order.
    pub values: Vec<ValueId>,
    /// Signature over the role-proof digest for `(sender, k)`.
    pub role_proof: Signature,
}

impl InnerMessage {
    /// The exact bytes covered by the outer signature.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }
}

/// A signed protocol message as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HareMessage {
    /// Sender identity.
    pub pub_key: PublicKey,
    /// Signature over the encoded inner payload.
    pub signature: Signature,
    /// The signed payload.
    pub inner: InnerMessage,
    /// Commit certificate. Required for Notify messages.
    pub certificate: Option<Certificate>,
    /// Safe-value proof. Required for Proposal messages.
    pub svp: Option<SafeValueProof>,
}

impl HareMessage {
    /// Check the outer signature against the sender's key.
    pub fn verify_signature(&self) -> bool {
        match self.inner.signed_bytes() {
            Ok(bytes) => self.pub_key.verify(&bytes, &self.signature),
            Err(_) => false,
        }
    }

    /// The inner values as a [`ValueSet`].
    pub fn value_set(&self) -> ValueSet {
        self.inner.values.iter().copied().collect()
    }
}

/// A batch of individually signed messages backing an aggregate claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedMessages {
    /// The underlying messages, kept whole for independent verification.
    pub messages: Vec<HareMessage>,
}

impl AggregatedMessages {
    /// Number of aggregated messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when no messages are aggregated.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Proof that a set was committed: f+1 distinct-sender Commit messages over
/// the same set in the same round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// The committed set, in canonical order.
    pub values: Vec<ValueId>,
    /// The commit messages backing the claim.
    pub aggregate: AggregatedMessages,
}

impl Certificate {
    /// The certified values as a [`ValueSet`].
    pub fn value_set(&self) -> ValueSet {
        self.values.iter().copied().collect()
    }
}

/// Proof that a proposed set is safe: f+1 validated Status messages whose
/// every value is either preround-justified or certified by a prior
/// iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeValueProof {
    /// The status messages backing the claim.
    pub aggregate: AggregatedMessages,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn signed_message(keypair: &Keypair) -> HareMessage {
        let inner = InnerMessage {
            message_type: MessageType::Status,
            instance_id: InstanceId(1),
            k: 4,
            ki: -1,
            values: vec![ValueId::from_seed(1), ValueId::from_seed(2)],
            role_proof: Signature::zero(),
        };
        let signature = keypair.sign(&inner.signed_bytes().unwrap());
        HareMessage {
            pub_key: keypair.public_key(),
            signature,
            inner,
            certificate: None,
            svp: None,
        }
    }

    #[test]
    fn test_signature_covers_inner() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let mut msg = signed_message(&keypair);
        assert!(msg.verify_signature());

        msg.inner.k += 1;
        assert!(!msg.verify_signature());
    }

    #[test]
    fn test_signature_rejects_foreign_key() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let other = Keypair::from_seed(&[2u8; 32]);
        let mut msg = signed_message(&keypair);
        msg.pub_key = other.public_key();
        assert!(!msg.verify_signature());
    }

    #[test]
    fn test_wire_roundtrip() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let msg = signed_message(&keypair);
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: HareMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
        assert!(decoded.verify_signature());
    }

    #[test]
    fn test_value_set_ignores_wire_order() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let mut msg = signed_message(&keypair);
        msg.inner.values.reverse();
        let expected: ValueSet = [ValueId::from_seed(1), ValueId::from_seed(2)]
            .into_iter()
            .collect();
        assert_eq!(msg.value_set(), expected);
    }
}
