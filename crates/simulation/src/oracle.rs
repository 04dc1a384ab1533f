//! Deterministic role oracle for simulation.

use hare_consensus::{OracleError, RoleOracle};
use hare_types::{Fnv32, PublicKey, Signature};

/// Samples committees by ranking the known identities under the round seed.
///
/// Deterministic and agreement-preserving: the decision depends only on the
/// seed, the requested committee size, and the fixed identity list, so
/// every node reaches the same verdict about every identity. The role proof
/// is not consulted; its signature has already been checked by the caller.
pub struct SimOracle {
    identities: Vec<PublicKey>,
    /// Pins the single-slot election to one identity, for tests that need
    /// a known leader.
    leader: Option<PublicKey>,
}

impl SimOracle {
    /// Create an oracle over the given committee identities.
    pub fn new(identities: Vec<PublicKey>) -> Self {
        Self {
            identities,
            leader: None,
        }
    }

    /// Pin every leader election to `leader`.
    pub fn with_leader(identities: Vec<PublicKey>, leader: PublicKey) -> Self {
        Self {
            identities,
            leader: Some(leader),
        }
    }

    /// The committee of `size` identities sampled for `seed`, best rank
    /// first.
    pub fn sampled(&self, seed: u32, size: usize) -> Vec<PublicKey> {
        let mut ranked: Vec<(u32, PublicKey)> = self
            .identities
            .iter()
            .map(|pk| {
                let mut h = Fnv32::new();
                h.write(&seed.to_le_bytes());
                h.write(pk.as_bytes());
                (h.finish(), *pk)
            })
            .collect();
        ranked.sort();
        ranked.into_iter().take(size).map(|(_, pk)| pk).collect()
    }
}

impl RoleOracle for SimOracle {
    fn eligible(
        &self,
        seed: u32,
        committee_size: usize,
        identity: &PublicKey,
        _role_proof: &Signature,
    ) -> Result<bool, OracleError> {
        if !self.identities.contains(identity) {
            return Ok(false);
        }
        if committee_size >= self.identities.len() {
            return Ok(true);
        }
        if committee_size == 1 {
            if let Some(leader) = &self.leader {
                return Ok(identity == leader);
            }
        }
        Ok(self.sampled(seed, committee_size).contains(identity))
    }
}
