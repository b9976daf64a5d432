use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::circuit::{CircuitLayout, GateDescriptor, GateType};
use crate::constants::{GATE_LEAF_LEN, WIRE_LABEL_LEN};
use crate::hash::{Digest32, keccak256};
use crate::label::{CircuitId, Seed, WireLabel, derive_label, flip_bit};

/// Domain tag for garbled row keys
const TAG_ROW_KEY: &[u8] = b"K";
/// Domain tag for row pads
const TAG_ROW_PAD: &[u8] = b"PAD";

/// One garbled gate in its committed 71-byte form: descriptor plus four
/// point-and-permute rows (all zero for NOT gates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateLeaf {
    /// Plaintext gate descriptor, repeated in the leaf so a single leaf is
    /// self-describing under dispute
    pub desc: GateDescriptor,
    /// Garbled rows indexed by `2*permA + permB`
    pub rows: [[u8; WIRE_LABEL_LEN]; 4],
}

impl GateLeaf {
    /// Serialize to the normative 71-byte wire format
    pub fn to_bytes(&self) -> [u8; GATE_LEAF_LEN] {
        let mut bytes = [0u8; GATE_LEAF_LEN];
        bytes[..7].copy_from_slice(&self.desc.to_bytes());
        for (row_index, row) in self.rows.iter().enumerate() {
            let start = 7 + row_index * WIRE_LABEL_LEN;
            bytes[start..start + WIRE_LABEL_LEN].copy_from_slice(row);
        }
        bytes
    }

    /// Parse a 71-byte leaf; rejects any other length or unknown gate code
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != GATE_LEAF_LEN {
            bail!(
                "Invalid gate leaf: expected {} bytes, got {}",
                GATE_LEAF_LEN,
                bytes.len()
            );
        }
        let desc = GateDescriptor::from_bytes(&bytes[..7])?;
        let mut rows = [[0u8; WIRE_LABEL_LEN]; 4];
        for (row_index, row) in rows.iter_mut().enumerate() {
            let start = 7 + row_index * WIRE_LABEL_LEN;
            row.copy_from_slice(&bytes[start..start + WIRE_LABEL_LEN]);
        }
        Ok(GateLeaf { desc, rows })
    }
}

/// Row key binding a pad to `(circuit, instance, gate, permA, permB)` and
/// the two input labels the evaluator will hold when selecting this row
pub fn row_key(
    circuit_id: &CircuitId,
    instance: u32,
    gate_index: u32,
    perm_a: bool,
    perm_b: bool,
    label_a: &WireLabel,
    label_b: &WireLabel,
) -> Digest32 {
    keccak256(&[
        TAG_ROW_KEY,
        &circuit_id.0,
        &instance.to_be_bytes(),
        &gate_index.to_be_bytes(),
        &[perm_a as u8],
        &[perm_b as u8],
        label_a.as_bytes(),
        label_b.as_bytes(),
    ])
}

/// One-time pad for a garbled row, the first 16 bytes of `H("PAD" || rowKey)`
pub fn row_pad(key: &Digest32) -> WireLabel {
    let digest = keccak256(&[TAG_ROW_PAD, key]);
    let mut pad = [0u8; WIRE_LABEL_LEN];
    pad.copy_from_slice(&digest[..WIRE_LABEL_LEN]);
    WireLabel::new(pad)
}

/// Garble a single gate deterministically from the instance seed.
///
/// For AND/XOR, row `2*permA + permB` encrypts the output label for the
/// semantic bits `(permA XOR flipA, permB XOR flipB)`. NOT gates carry four
/// zero rows; their semantics live in the layout.
pub fn garble_gate(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    gate_index: u32,
    desc: &GateDescriptor,
) -> GateLeaf {
    let mut rows = [[0u8; WIRE_LABEL_LEN]; 4];
    if desc.gate_type != GateType::Not {
        let flip_a = flip_bit(seed, circuit_id, instance, desc.wire_a);
        let flip_b = flip_bit(seed, circuit_id, instance, desc.wire_b);
        for perm_a in [false, true] {
            for perm_b in [false, true] {
                let bit_a = perm_a ^ flip_a;
                let bit_b = perm_b ^ flip_b;
                let out_bit = desc.gate_type.eval(bit_a, bit_b);
                let label_a = derive_label(seed, circuit_id, instance, desc.wire_a, bit_a);
                let label_b = derive_label(seed, circuit_id, instance, desc.wire_b, bit_b);
                let out_label = derive_label(seed, circuit_id, instance, desc.wire_c, out_bit);
                let key = row_key(
                    circuit_id, instance, gate_index, perm_a, perm_b, &label_a, &label_b,
                );
                let row = out_label.xor(&row_pad(&key));
                rows[2 * (perm_a as usize) + (perm_b as usize)] = *row.as_bytes();
            }
        }
    }
    GateLeaf { desc: *desc, rows }
}

/// Recompute the committed 71-byte leaf for one gate from the revealed
/// seed. This is the shared function the dispute verifier runs; it must be
/// byte-identical to what the prover committed for an honest instance.
pub fn recompute_gate_leaf_bytes(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    gate_index: u32,
    desc: &GateDescriptor,
) -> [u8; GATE_LEAF_LEN] {
    garble_gate(seed, circuit_id, instance, gate_index, desc).to_bytes()
}

/// All gate leaves of one cut-and-choose instance, in layout order
pub fn garble_instance(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    layout: &CircuitLayout,
) -> Vec<GateLeaf> {
    layout
        .gates
        .iter()
        .enumerate()
        .map(|(gate_index, desc)| garble_gate(seed, circuit_id, instance, gate_index as u32, desc))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::comparator_circuit;

    fn test_context() -> (Seed, CircuitId) {
        (Seed([0x42; 32]), CircuitId::from_u64(7))
    }

    #[test]
    fn test_leaf_roundtrip() {
        let (seed, cid) = test_context();
        let desc = GateDescriptor {
            gate_type: GateType::And,
            wire_a: 3,
            wire_b: 9,
            wire_c: 12,
        };
        let leaf = garble_gate(&seed, &cid, 0, 5, &desc);
        let bytes = leaf.to_bytes();
        assert_eq!(bytes.len(), GATE_LEAF_LEN);
        assert_eq!(GateLeaf::from_bytes(&bytes).unwrap(), leaf);
        // Descriptor prefix is the normative 7-byte encoding
        assert_eq!(&bytes[..7], &desc.to_bytes());
    }

    #[test]
    fn test_leaf_rejects_wrong_length() {
        assert!(GateLeaf::from_bytes(&[0u8; 70]).is_err());
        assert!(GateLeaf::from_bytes(&[0u8; 72]).is_err());
    }

    #[test]
    fn test_not_gate_rows_are_zero() {
        let (seed, cid) = test_context();
        let desc = GateDescriptor {
            gate_type: GateType::Not,
            wire_a: 4,
            wire_b: 0,
            wire_c: 5,
        };
        let leaf = garble_gate(&seed, &cid, 2, 8, &desc);
        assert_eq!(leaf.rows, [[0u8; 16]; 4]);
    }

    #[test]
    fn test_row_decryption_yields_output_label() {
        // Property 2 of the protocol: for every permutation-bit pair, the
        // row decrypts to the output label of the plaintext truth table.
        let (seed, cid) = test_context();
        for gate_type in [GateType::And, GateType::Xor] {
            let desc = GateDescriptor {
                gate_type,
                wire_a: 0,
                wire_b: 1,
                wire_c: 2,
            };
            let leaf = garble_gate(&seed, &cid, 1, 0, &desc);
            let flip_a = flip_bit(&seed, &cid, 1, 0);
            let flip_b = flip_bit(&seed, &cid, 1, 1);
            for perm_a in [false, true] {
                for perm_b in [false, true] {
                    let bit_a = perm_a ^ flip_a;
                    let bit_b = perm_b ^ flip_b;
                    let label_a = derive_label(&seed, &cid, 1, 0, bit_a);
                    let label_b = derive_label(&seed, &cid, 1, 1, bit_b);
                    // The derived labels expose exactly the permutation bits
                    assert_eq!(label_a.perm_bit(), perm_a);
                    assert_eq!(label_b.perm_bit(), perm_b);
                    let key = row_key(&cid, 1, 0, perm_a, perm_b, &label_a, &label_b);
                    let row =
                        WireLabel::new(leaf.rows[2 * (perm_a as usize) + (perm_b as usize)]);
                    let decrypted = row.xor(&row_pad(&key));
                    let expected =
                        derive_label(&seed, &cid, 1, 2, gate_type.eval(bit_a, bit_b));
                    assert_eq!(decrypted, expected);
                }
            }
        }
    }

    #[test]
    fn test_recompute_matches_instance_garbling() {
        // Prover and verifier paths must agree byte for byte on every gate
        let (seed, cid) = test_context();
        let layout = comparator_circuit(4).unwrap();
        let leaves = garble_instance(&seed, &cid, 3, &layout);
        for (gate_index, (leaf, desc)) in leaves.iter().zip(layout.gates.iter()).enumerate() {
            let recomputed =
                recompute_gate_leaf_bytes(&seed, &cid, 3, gate_index as u32, desc);
            assert_eq!(leaf.to_bytes(), recomputed);
        }
    }

    #[test]
    fn test_garbling_is_restart_invariant() {
        // Two independent derivations from the same inputs are identical
        let layout = comparator_circuit(2).unwrap();
        let first = garble_instance(&Seed([9; 32]), &CircuitId::from_u64(1), 0, &layout);
        let second = garble_instance(&Seed([9; 32]), &CircuitId::from_u64(1), 0, &layout);
        assert_eq!(first, second);
    }

    #[test]
    fn test_instances_diverge_per_seed_and_index() {
        let layout = comparator_circuit(2).unwrap();
        let cid = CircuitId::from_u64(1);
        let base = garble_instance(&Seed([9; 32]), &cid, 0, &layout);
        assert_ne!(base, garble_instance(&Seed([9; 32]), &cid, 1, &layout));
        assert_ne!(base, garble_instance(&Seed([8; 32]), &cid, 0, &layout));
    }
}
