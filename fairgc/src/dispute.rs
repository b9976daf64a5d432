use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::circuit::{CircuitLayout, GateDescriptor};
use crate::commitment::{IhProof, ih_proof, ih_root, layout_proof};
use crate::garble::{GateLeaf, recompute_gate_leaf_bytes};
use crate::hash::Digest32;
use crate::label::{CircuitId, Seed};

/// A single-gate fraud proof: the committed leaf at one position of an
/// opened instance, with the evidence the adjudicator needs to check it
/// against `rootGC` and the layout root, to be judged against the leaf
/// recomputed from the revealed seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Opened instance the challenged gate belongs to
    pub instance_id: u32,
    /// Position of the gate in the layout
    pub gate_index: u32,
    /// Plaintext descriptor, proven against the layout root
    pub desc: GateDescriptor,
    /// The committed 71-byte leaf as published by the prover
    pub leaf_bytes: Vec<u8>,
    /// IH chain evidence for `leaf_bytes` at `gate_index`
    pub ih_proof: IhProof,
    /// Sibling path for `desc` against the layout Merkle root
    pub layout_proof: Vec<Digest32>,
}

/// Options steering challenge preparation
#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengeOptions {
    /// Challenge this gate instead of scanning for a divergence
    pub gate_index: Option<u32>,
    /// Sanity check: the claimed leaves must fold to this root
    pub expected_root_gc: Option<Digest32>,
    /// Permit building a challenge for a leaf that matches the seed
    /// (a deliberately losing challenge; used to exercise the two-way
    /// slashing rule)
    pub allow_false_challenge: bool,
}

/// Build a challenge from an opened instance's seed and the leaf file the
/// prover published.
///
/// Scans the claimed leaves against recomputation from the seed and picks
/// the first divergent gate, unless `options.gate_index` pins one. The IH
/// proof is built over the *claimed* leaves so that it folds to the
/// committed `rootGC` even when the prover tampered with a leaf.
pub fn prepare_challenge(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance_id: u32,
    layout: &CircuitLayout,
    claimed_leaves: &[GateLeaf],
    options: &ChallengeOptions,
) -> Result<Challenge> {
    if claimed_leaves.len() != layout.gates.len() {
        bail!(
            "Claimed leaf count {} does not match layout gate count {}",
            claimed_leaves.len(),
            layout.gates.len()
        );
    }
    if let Some(expected) = options.expected_root_gc {
        let actual = ih_root(claimed_leaves);
        if actual != expected {
            bail!(
                "Claimed leaves fold to {} instead of the committed root {}",
                hex::encode(actual),
                hex::encode(expected)
            );
        }
    }

    let gate_index = match options.gate_index {
        Some(forced) => {
            if forced as usize >= claimed_leaves.len() {
                bail!("Gate index {} out of range", forced);
            }
            forced
        }
        None => {
            let divergent = claimed_leaves.iter().enumerate().find(|(index, leaf)| {
                let expected = recompute_gate_leaf_bytes(
                    seed,
                    circuit_id,
                    instance_id,
                    *index as u32,
                    &layout.gates[*index],
                );
                leaf.to_bytes() != expected
            });
            match divergent {
                Some((index, _)) => index as u32,
                None if options.allow_false_challenge => 0,
                None => bail!(
                    "Every claimed leaf of instance {} matches the seed; nothing to dispute",
                    instance_id
                ),
            }
        }
    };

    let k = gate_index as usize;
    let claimed = claimed_leaves[k];
    if !options.allow_false_challenge {
        let expected = recompute_gate_leaf_bytes(
            seed,
            circuit_id,
            instance_id,
            gate_index,
            &layout.gates[k],
        );
        if claimed.to_bytes() == expected {
            bail!(
                "Leaf at gate {} matches the seed; refusing to build a losing challenge",
                gate_index
            );
        }
    }

    Ok(Challenge {
        instance_id,
        gate_index,
        desc: layout.gates[k],
        leaf_bytes: claimed.to_bytes().to_vec(),
        ih_proof: ih_proof(claimed_leaves, k),
        layout_proof: layout_proof(&layout.gates, k),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::comparator_circuit;
    use crate::garble::garble_instance;

    fn setup() -> (Seed, CircuitId, CircuitLayout, Vec<GateLeaf>) {
        let layout = comparator_circuit(4).unwrap();
        let seed = Seed([0x42; 32]);
        let cid = CircuitId::from_u64(7);
        let leaves = garble_instance(&seed, &cid, 1, &layout);
        (seed, cid, layout, leaves)
    }

    #[test]
    fn test_honest_leaves_yield_no_challenge() {
        let (seed, cid, layout, leaves) = setup();
        let err = prepare_challenge(
            &seed,
            &cid,
            1,
            &layout,
            &leaves,
            &ChallengeOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("nothing to dispute"));
    }

    #[test]
    fn test_finds_first_tampered_gate() {
        let (seed, cid, layout, mut leaves) = setup();
        leaves[5].rows[0][3] ^= 0xFF;
        let challenge = prepare_challenge(
            &seed,
            &cid,
            1,
            &layout,
            &leaves,
            &ChallengeOptions::default(),
        )
        .unwrap();
        assert_eq!(challenge.gate_index, 5);
        assert_eq!(challenge.leaf_bytes, leaves[5].to_bytes().to_vec());
        assert_eq!(challenge.desc, layout.gates[5]);
    }

    #[test]
    fn test_expected_root_mismatch_detected() {
        let (seed, cid, layout, mut leaves) = setup();
        let committed = ih_root(&leaves);
        // Tampering after commitment makes the leaf file fold elsewhere
        leaves[0].rows[0][0] ^= 1;
        let options = ChallengeOptions {
            expected_root_gc: Some(committed),
            ..Default::default()
        };
        assert!(prepare_challenge(&seed, &cid, 1, &layout, &leaves, &options).is_err());
    }

    #[test]
    fn test_false_challenge_requires_opt_in() {
        let (seed, cid, layout, leaves) = setup();
        let options = ChallengeOptions {
            gate_index: Some(2),
            ..Default::default()
        };
        assert!(prepare_challenge(&seed, &cid, 1, &layout, &leaves, &options).is_err());

        let options = ChallengeOptions {
            gate_index: Some(2),
            allow_false_challenge: true,
            ..Default::default()
        };
        let challenge =
            prepare_challenge(&seed, &cid, 1, &layout, &leaves, &options).unwrap();
        assert_eq!(challenge.gate_index, 2);
    }
}
