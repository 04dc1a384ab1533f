//! FNV-32 hashing for protocol-observable identifiers.
//!
//! The wire format pins the 32-bit FNV-1 function (multiply, then xor) for
//! both the eligibility seed and the role-proof digest, so the exact byte
//! layout matters here. This is domain separation, not a security primitive;
//! the Ed25519 signature over the digest is what actually gets verified.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Incremental 32-bit FNV-1 hasher.
#[derive(Debug, Clone)]
pub struct Fnv32 {
    state: u32,
}

impl Fnv32 {
    /// Create a hasher seeded with the FNV offset basis.
    pub fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    /// Absorb bytes into the hash state.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state = self.state.wrapping_mul(FNV_PRIME);
            self.state ^= u32::from(b);
        }
    }

    /// Finish and return the 32-bit digest.
    pub fn finish(&self) -> u32 {
        self.state
    }

    /// Hash a single byte slice.
    pub fn hash(bytes: &[u8]) -> u32 {
        let mut h = Self::new();
        h.write(bytes);
        h.finish()
    }
}

impl Default for Fnv32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the role-sampling seed for `(instance_id, k)`.
///
/// Only the low byte of the round counter participates, per the wire format.
pub fn eligibility_seed(instance_id: crate::InstanceId, k: u32) -> u32 {
    let mut h = Fnv32::new();
    h.write(&instance_id.to_bytes());
    h.write(&[k as u8]);
    h.finish()
}

/// Compute the 4-byte digest that a participant signs as its role proof.
///
/// Layout: FNV-32 over `verifier_bytes ‖ k (u32 little-endian)`, with the
/// 32-bit result re-encoded little-endian.
pub fn role_proof_digest(verifier_bytes: &[u8], k: u32) -> [u8; 4] {
    let mut h = Fnv32::new();
    h.write(verifier_bytes);
    h.write(&k.to_le_bytes());
    h.finish().to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstanceId;

    #[test]
    fn test_fnv32_reference_vectors() {
        // Standard FNV-1 32-bit vectors.
        assert_eq!(Fnv32::hash(b""), 0x811c_9dc5);
        assert_eq!(Fnv32::hash(b"a"), 0x050c_5d7e);
        assert_eq!(Fnv32::hash(b"foobar"), 0x31f0_b262);
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut h = Fnv32::new();
        h.write(b"foo");
        h.write(b"bar");
        assert_eq!(h.finish(), Fnv32::hash(b"foobar"));
    }

    #[test]
    fn test_eligibility_seed_uses_low_byte_only() {
        let id = InstanceId(7);
        // Counters that agree on the low byte produce the same seed.
        assert_eq!(eligibility_seed(id, 1), eligibility_seed(id, 257));
        assert_ne!(eligibility_seed(id, 1), eligibility_seed(id, 2));
    }

    #[test]
    fn test_role_proof_digest_is_little_endian() {
        let digest = role_proof_digest(b"verifier", 3);
        let mut h = Fnv32::new();
        h.write(b"verifier");
        h.write(&3u32.to_le_bytes());
        assert_eq!(digest, h.finish().to_le_bytes());
    }
}
