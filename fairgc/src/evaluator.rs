use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::circuit::{CircuitLayout, GateType};
use crate::garble::{GateLeaf, row_key, row_pad};
use crate::label::{CircuitId, WireLabel};

/// Everything the Evaluator needs to run instance `m`: the garbled payload
/// plus, for each of his input wires, both candidate labels from which the
/// simulated OT selects one per input bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalPackage {
    /// Session circuit identifier the payload was garbled under
    pub circuit_id: CircuitId,
    /// The evaluation instance index `m`
    pub instance_id: u32,
    /// Comparator width the layout was built with
    pub bit_width: u16,
    /// Gate leaves of instance `m` in layout order
    pub leaves: Vec<GateLeaf>,
    /// `(wire, [label_0, label_1])` per Evaluator input wire, LSB first
    pub bob_wire_labels: Vec<(u16, [WireLabel; 2])>,
}

impl EvalPackage {
    /// Save the package to a binary file for the Evaluator to pick up
    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    /// Load a package from a binary file
    pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        let (package, _) = bincode::serde::decode_from_slice(&data, bincode::config::standard())?;
        Ok(package)
    }
}

/// Combine the Garbler's revealed input labels with the Evaluator's
/// OT-selected ones into the full input-wire assignment
pub fn assemble_inputs(
    layout: &CircuitLayout,
    alice_labels: &[WireLabel],
    bob_labels: &HashMap<u16, WireLabel>,
) -> Result<HashMap<u16, WireLabel>> {
    if alice_labels.len() != layout.alice_wires.len() {
        bail!(
            "Expected {} garbler labels, got {}",
            layout.alice_wires.len(),
            alice_labels.len()
        );
    }
    let mut inputs = HashMap::new();
    for (&wire, &label) in layout.alice_wires.iter().zip(alice_labels.iter()) {
        inputs.insert(wire, label);
    }
    for &wire in &layout.bob_wires {
        let label = bob_labels
            .get(&wire)
            .ok_or_else(|| anyhow::anyhow!("Missing evaluator label for wire {}", wire))?;
        inputs.insert(wire, *label);
    }
    Ok(inputs)
}

/// Evaluate a garbled instance and return the output-wire label.
///
/// Walks the gates in layout order: for AND/XOR the permutation bits of
/// the two held labels select the row, which is decrypted with the
/// rebuilt pad; NOT passes the label through unchanged. The Evaluator
/// learns no semantics along the way, only the final label to submit for
/// settlement.
pub fn evaluate_instance(
    circuit_id: &CircuitId,
    instance_id: u32,
    layout: &CircuitLayout,
    leaves: &[GateLeaf],
    inputs: &HashMap<u16, WireLabel>,
) -> Result<WireLabel> {
    if leaves.len() != layout.gates.len() {
        bail!(
            "Garbled payload has {} leaves for {} gates",
            leaves.len(),
            layout.gates.len()
        );
    }

    let mut active: HashMap<u16, WireLabel> = inputs.clone();
    for (gate_index, (gate, leaf)) in layout.gates.iter().zip(leaves.iter()).enumerate() {
        if leaf.desc != *gate {
            bail!(
                "Leaf descriptor diverges from the layout at gate {}; escalate to dispute",
                gate_index
            );
        }
        let label_a = *active
            .get(&gate.wire_a)
            .ok_or_else(|| anyhow::anyhow!("Input wire {} not found", gate.wire_a))?;
        let output = match gate.gate_type {
            GateType::Not => label_a,
            _ => {
                let label_b = *active
                    .get(&gate.wire_b)
                    .ok_or_else(|| anyhow::anyhow!("Input wire {} not found", gate.wire_b))?;
                let perm_a = label_a.perm_bit();
                let perm_b = label_b.perm_bit();
                let row =
                    WireLabel::new(leaf.rows[2 * (perm_a as usize) + (perm_b as usize)]);
                let key = row_key(
                    circuit_id,
                    instance_id,
                    gate_index as u32,
                    perm_a,
                    perm_b,
                    &label_a,
                    &label_b,
                );
                row.xor(&row_pad(&key))
            }
        };
        active.insert(gate.wire_c, output);
    }

    active
        .get(&layout.output_wire)
        .copied()
        .ok_or_else(|| anyhow::anyhow!("Output wire {} not found", layout.output_wire))
}
