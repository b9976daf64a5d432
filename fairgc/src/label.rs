use rand::RngCore;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

use crate::constants::WIRE_LABEL_LEN;
use crate::hash::keccak256;

/// Domain tag for permutation-bit flips
const TAG_FLIP: &[u8] = b"P";
/// Domain tag for wire label derivation
const TAG_LABEL: &[u8] = b"L";

/// 256-bit per-instance garbling seed owned by the Garbler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed(pub [u8; 32]);

impl Seed {
    /// Draw a fresh seed from the provided CSPRNG
    pub fn random(rng: &mut ChaCha12Rng) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Seed(bytes)
    }
}

/// Opaque 32-byte session circuit identifier mixed into every derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitId(pub [u8; 32]);

impl CircuitId {
    /// Circuit id from a small integer, widened big-endian (CLI convenience)
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..32].copy_from_slice(&value.to_be_bytes());
        CircuitId(bytes)
    }
}

/// 128-bit wire label; the LSB of byte 0 is the permutation bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLabel([u8; WIRE_LABEL_LEN]);

impl WireLabel {
    /// Create a new wire label from 16 bytes
    pub fn new(bytes: [u8; WIRE_LABEL_LEN]) -> Self {
        WireLabel(bytes)
    }

    /// XOR this wire label with another wire label
    pub fn xor(&self, other: &WireLabel) -> WireLabel {
        let mut result = [0u8; WIRE_LABEL_LEN];
        for (i, result_byte) in result.iter_mut().enumerate() {
            *result_byte = self.0[i] ^ other.0[i];
        }
        WireLabel(result)
    }

    /// Permutation bit the evaluator uses to index the garbled table row
    pub fn perm_bit(&self) -> bool {
        self.0[0] & 1 == 1
    }

    /// Get the raw bytes of this wire label
    pub fn as_bytes(&self) -> &[u8; WIRE_LABEL_LEN] {
        &self.0
    }
}

/// Per-(seed, instance, wire) flip bit mapping semantic bits to
/// permutation bits: `p = flip XOR b`.
///
/// Derived as the low bit of byte 31 of
/// `H("P" || circuitId || instance || wire || seed)`.
pub fn flip_bit(seed: &Seed, circuit_id: &CircuitId, instance: u32, wire: u16) -> bool {
    let digest = keccak256(&[
        TAG_FLIP,
        &circuit_id.0,
        &instance.to_be_bytes(),
        &wire.to_be_bytes(),
        &seed.0,
    ]);
    digest[31] & 1 == 1
}

/// Deterministic label for semantic bit `bit` on `wire`.
///
/// The first 16 bytes of `H("L" || circuitId || instance || wire || bit ||
/// seed)` with the LSB of byte 0 overwritten by `flip XOR bit`; the other
/// 127 bits stay as hashed.
pub fn derive_label(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    wire: u16,
    bit: bool,
) -> WireLabel {
    let raw = keccak256(&[
        TAG_LABEL,
        &circuit_id.0,
        &instance.to_be_bytes(),
        &wire.to_be_bytes(),
        &[bit as u8],
        &seed.0,
    ]);
    let mut label = [0u8; WIRE_LABEL_LEN];
    label.copy_from_slice(&raw[..WIRE_LABEL_LEN]);
    let perm = flip_bit(seed, circuit_id, instance, wire) ^ bit;
    label[0] = (label[0] & 0xFE) | (perm as u8);
    WireLabel(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn test_seed() -> Seed {
        Seed([0x42; 32])
    }

    #[test]
    fn test_wire_label_xor() {
        let label1 = WireLabel::new([0x01; 16]);
        let label2 = WireLabel::new([0x02; 16]);
        let result = label1.xor(&label2);
        assert_eq!(result.as_bytes(), &[0x03; 16]);
    }

    #[test]
    fn test_wire_label_xor_self_cancellation() {
        let label = WireLabel::new([0xCD; 16]);
        let result = label.xor(&label);
        assert_eq!(result.as_bytes(), &[0x00; 16]);
    }

    #[test]
    fn test_perm_bit_complementary() {
        // For every wire the two labels carry complementary permutation bits
        let seed = test_seed();
        let cid = CircuitId::from_u64(7);
        for instance in 0..3u32 {
            for wire in [0u16, 1, 5, 999] {
                let label0 = derive_label(&seed, &cid, instance, wire, false);
                let label1 = derive_label(&seed, &cid, instance, wire, true);
                assert_ne!(label0.perm_bit(), label1.perm_bit());
                assert_eq!(
                    label0.perm_bit(),
                    flip_bit(&seed, &cid, instance, wire),
                    "p(L(w,0)) must equal flip(w)"
                );
            }
        }
    }

    #[test]
    fn test_derivation_is_pure() {
        let seed = test_seed();
        let cid = CircuitId::from_u64(1);
        let first = derive_label(&seed, &cid, 4, 17, true);
        let second = derive_label(&seed, &cid, 4, 17, true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_labels_differ_across_context() {
        let seed = test_seed();
        let cid = CircuitId::from_u64(1);
        let base = derive_label(&seed, &cid, 0, 0, false);
        assert_ne!(base, derive_label(&seed, &cid, 1, 0, false));
        assert_ne!(base, derive_label(&seed, &cid, 0, 1, false));
        assert_ne!(
            base,
            derive_label(&seed, &CircuitId::from_u64(2), 0, 0, false)
        );
        assert_ne!(base, derive_label(&Seed([0x43; 32]), &cid, 0, 0, false));
    }

    #[test]
    fn test_seed_random_distinct() {
        let mut rng = ChaCha12Rng::from_seed([0u8; 32]);
        let a = Seed::random(&mut rng);
        let b = Seed::random(&mut rng);
        assert_ne!(a, b);
    }
}
