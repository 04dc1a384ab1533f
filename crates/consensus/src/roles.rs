//! Per-round participation roles and role proofs.
//!
//! Eligibility is sampled by the oracle from a seed derived from the
//! instance id and round counter. A participant proves its claim to a role
//! by signing a digest bound to its identity and the round counter; the
//! same digest construction validates proofs from remote senders.

use hare_types::{role_proof_digest, Keypair, PublicKey, Signature};

/// Participation level for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Not sampled for this round; stays silent.
    Passive,
    /// Sampled; may broadcast round messages.
    Active,
    /// Sampled during the proposal round; may propose.
    Leader,
}

/// Committee size the oracle should sample for round counter `k`.
///
/// The proposal round elects leaders, so the requested size drops to 1 and
/// the oracle decides the actual sampling width. Every other round runs
/// with the full committee.
pub fn expected_committee_size(k: u32, n: usize) -> usize {
    if k % 4 == 1 {
        1
    } else {
        n
    }
}

/// Build this participant's role proof for round counter `k`.
pub fn role_proof(keypair: &Keypair, k: u32) -> Signature {
    let digest = role_proof_digest(keypair.public_key().as_bytes(), k);
    keypair.sign(&digest)
}

/// Check a remote sender's role proof for round counter `k`.
pub fn validate_role_proof(sender: &PublicKey, k: u32, proof: &Signature) -> bool {
    let digest = role_proof_digest(sender.as_bytes(), k);
    sender.verify(&digest, proof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_committee_size_per_round() {
        assert_eq!(expected_committee_size(0, 7), 7);
        assert_eq!(expected_committee_size(1, 7), 1);
        assert_eq!(expected_committee_size(2, 7), 7);
        assert_eq!(expected_committee_size(3, 7), 7);
        assert_eq!(expected_committee_size(5, 7), 1);
    }

    #[test]
    fn test_role_proof_verifies() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let proof = role_proof(&keypair, 6);
        assert!(validate_role_proof(&keypair.public_key(), 6, &proof));
    }

    #[test]
    fn test_role_proof_is_round_bound() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let proof = role_proof(&keypair, 6);
        assert!(!validate_role_proof(&keypair.public_key(), 7, &proof));
    }

    #[test]
    fn test_role_proof_is_identity_bound() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let other = Keypair::from_seed(&[2u8; 32]);
        let proof = role_proof(&keypair, 6);
        assert!(!validate_role_proof(&other.public_key(), 6, &proof));
    }
}
