use anyhow::{Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::circuit::CircuitLayout;
use crate::commitment::{InstanceCommitment, commit_instance};
use crate::constants::NUM_INSTANCES;
use crate::evaluator::EvalPackage;
use crate::garble::garble_instance;
use crate::label::{CircuitId, Seed, WireLabel, derive_label};

/// The Garbler's private per-session material: one seed per cut-and-choose
/// instance. Everything she publishes derives from these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarblerSecrets {
    /// Instance seeds, indexed by instance id
    pub seeds: [Seed; NUM_INSTANCES],
}

impl GarblerSecrets {
    /// Draw the ten instance seeds from the provided CSPRNG
    pub fn generate(rng: &mut ChaCha12Rng) -> Self {
        GarblerSecrets {
            seeds: core::array::from_fn(|_| Seed::random(rng)),
        }
    }

    /// Save secrets as JSON (demo-only convenience; these never go on the
    /// ledger)
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load secrets from JSON
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let secrets = serde_json::from_str(&data)?;
        Ok(secrets)
    }
}

/// Compute all ten instance commitments for one atomic submission
pub fn build_commitments(
    seeds: &[Seed; NUM_INSTANCES],
    circuit_id: &CircuitId,
    layout: &CircuitLayout,
) -> [InstanceCommitment; NUM_INSTANCES] {
    let pb = ProgressBar::new(NUM_INSTANCES as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    pb.set_message("Committing instances...");

    let commitments = core::array::from_fn(|instance| {
        let commitment =
            commit_instance(&seeds[instance], circuit_id, instance as u32, layout);
        pb.set_position(instance as u64 + 1);
        commitment
    });

    pb.finish_with_message(format!("✓ Committed {} instances", NUM_INSTANCES));
    commitments
}

/// Pair the opened indices with their seeds for `reveal_openings`
pub fn opening_seeds(
    seeds: &[Seed; NUM_INSTANCES],
    open_indices: &[u32],
) -> (Vec<u32>, Vec<Seed>) {
    let indices = open_indices.to_vec();
    let opened = open_indices
        .iter()
        .map(|&index| seeds[index as usize])
        .collect();
    (indices, opened)
}

/// The Garbler's semantic-correct input labels for her private `x` on
/// instance `m`, in Alice-wire order (LSB first)
pub fn alice_input_labels(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    layout: &CircuitLayout,
    x: u64,
) -> Result<Vec<WireLabel>> {
    let width = layout.alice_wires.len();
    if width > 64 {
        bail!("Garbler input of {} bits exceeds u64 range", width);
    }
    if width < 64 && x >> width != 0 {
        bail!("Input {} does not fit in {} bits", x, width);
    }
    Ok(layout
        .alice_wires
        .iter()
        .enumerate()
        .map(|(bit, &wire)| {
            let bit_value = (x >> bit) & 1 == 1;
            derive_label(seed, circuit_id, instance, wire, bit_value)
        })
        .collect())
}

/// Both candidate labels per Evaluator input wire, the payload the
/// simulated OT selects from
pub fn bob_wire_label_pairs(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    layout: &CircuitLayout,
) -> Vec<(u16, [WireLabel; 2])> {
    layout
        .bob_wires
        .iter()
        .map(|&wire| {
            let label_0 = derive_label(seed, circuit_id, instance, wire, false);
            let label_1 = derive_label(seed, circuit_id, instance, wire, true);
            (wire, [label_0, label_1])
        })
        .collect()
}

/// Assemble the evaluation payload for the chosen instance `m`
pub fn build_eval_package(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    layout: &CircuitLayout,
    bit_width: u16,
) -> EvalPackage {
    EvalPackage {
        circuit_id: *circuit_id,
        instance_id: instance,
        bit_width,
        leaves: garble_instance(seed, circuit_id, instance, layout),
        bob_wire_labels: bob_wire_label_pairs(seed, circuit_id, instance, layout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::comparator_circuit;
    use crate::hash::keccak256;
    use rand::SeedableRng;

    #[test]
    fn test_secrets_generation_distinct() {
        let mut rng = ChaCha12Rng::from_seed([0x42; 32]);
        let secrets = GarblerSecrets::generate(&mut rng);
        for i in 0..NUM_INSTANCES {
            for j in i + 1..NUM_INSTANCES {
                assert_ne!(secrets.seeds[i], secrets.seeds[j]);
            }
        }
    }

    #[test]
    fn test_secrets_json_roundtrip() -> Result<()> {
        let mut rng = ChaCha12Rng::from_seed([0x42; 32]);
        let secrets = GarblerSecrets::generate(&mut rng);
        let file = tempfile::NamedTempFile::new()?;
        secrets.save_json(file.path())?;
        let loaded = GarblerSecrets::load_json(file.path())?;
        assert_eq!(loaded.seeds, secrets.seeds);
        Ok(())
    }

    #[test]
    fn test_commitments_bind_seeds() {
        let layout = comparator_circuit(2).unwrap();
        let cid = CircuitId::from_u64(1);
        let mut rng = ChaCha12Rng::from_seed([0x42; 32]);
        let secrets = GarblerSecrets::generate(&mut rng);
        let commitments = build_commitments(&secrets.seeds, &cid, &layout);
        for (instance, commitment) in commitments.iter().enumerate() {
            assert_eq!(
                commitment.com_seed,
                keccak256(&[&secrets.seeds[instance].0])
            );
        }
    }

    #[test]
    fn test_opening_seeds_preserve_order() {
        let seeds: [Seed; NUM_INSTANCES] = core::array::from_fn(|i| Seed([i as u8; 32]));
        let open = [0u32, 1, 2, 4, 5, 6, 7, 8, 9];
        let (indices, opened) = opening_seeds(&seeds, &open);
        assert_eq!(indices, open);
        assert_eq!(opened[3], seeds[4]);
    }

    #[test]
    fn test_alice_labels_follow_bits() {
        let layout = comparator_circuit(4).unwrap();
        let seed = Seed([0x42; 32]);
        let cid = CircuitId::from_u64(7);
        let labels = alice_input_labels(&seed, &cid, 0, &layout, 0b1010).unwrap();
        for (bit, label) in labels.iter().enumerate() {
            let expected = derive_label(
                &seed,
                &cid,
                0,
                layout.alice_wires[bit],
                (0b1010 >> bit) & 1 == 1,
            );
            assert_eq!(*label, expected);
        }
        assert!(alice_input_labels(&seed, &cid, 0, &layout, 16).is_err());
    }
}
