use serde::{Deserialize, Serialize};

use crate::circuit::{CircuitLayout, GateDescriptor};
use crate::constants::GATE_LEAF_LEN;
use crate::garble::{GateLeaf, garble_instance};
use crate::hash::{Digest32, ZERO_DIGEST, be_word, keccak256};
use crate::label::{CircuitId, Seed, derive_label};

/// Per-instance record published on the ledger in one atomic message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCommitment {
    /// `H(seed)`, checked when the seed is revealed during Open
    pub com_seed: Digest32,
    /// Terminal state of the IH chain over the instance's gate leaves
    pub root_gc: Digest32,
    /// Root over Garbler-input-label messages (reserved, stored opaquely)
    pub root_xg: Digest32,
    /// Root over OT-transcript messages (reserved, stored opaquely)
    pub root_ot: Digest32,
    /// `H(L_out(0))`; a settle match here means the Garbler won
    pub h0: Digest32,
    /// `H(L_out(1))`; a settle match here means the Evaluator won
    pub h1: Digest32,
}

/// IH block for gate `k`: `H(gateIndex(32 BE) || leafBytes(71))`, binding
/// the gate's position into the chain before folding
pub fn ih_block(gate_index: u32, leaf_bytes: &[u8]) -> Digest32 {
    keccak256(&[&be_word(gate_index as u64), leaf_bytes])
}

/// Fold the ordered gate leaves into the chain's terminal state:
/// `state := H(state || block)` starting from the all-zero digest
pub fn ih_root(leaves: &[GateLeaf]) -> Digest32 {
    let mut state = ZERO_DIGEST;
    for (gate_index, leaf) in leaves.iter().enumerate() {
        let block = ih_block(gate_index as u32, &leaf.to_bytes());
        state = keccak256(&[&state, &block]);
    }
    state
}

/// Evidence that one leaf sits at position `k` of a committed IH chain.
///
/// Wire format per the dispute interface: element 0 is the prefix state
/// `IH_{k-1}` (omitted when `k = 0`), followed by the already-hashed
/// blocks for gates `k+1 .. G-1` in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IhProof {
    /// Prefix state plus suffix blocks, as described above
    pub nodes: Vec<Digest32>,
}

/// Build the IH proof for gate `k` over the claimed leaves
pub fn ih_proof(leaves: &[GateLeaf], k: usize) -> IhProof {
    let mut nodes = Vec::new();
    if k > 0 {
        let mut state = ZERO_DIGEST;
        for (gate_index, leaf) in leaves[..k].iter().enumerate() {
            let block = ih_block(gate_index as u32, &leaf.to_bytes());
            state = keccak256(&[&state, &block]);
        }
        nodes.push(state);
    }
    for (offset, leaf) in leaves[k + 1..].iter().enumerate() {
        let gate_index = (k + 1 + offset) as u32;
        nodes.push(ih_block(gate_index, &leaf.to_bytes()));
    }
    IhProof { nodes }
}

/// Reconstruct the chain state for `leaf_bytes` at position `k` and compare
/// it against the committed root
pub fn verify_ih(root: &Digest32, k: u32, leaf_bytes: &[u8], proof: &IhProof) -> bool {
    if leaf_bytes.len() != GATE_LEAF_LEN {
        return false;
    }
    let (prefix, suffix) = if k == 0 {
        (ZERO_DIGEST, proof.nodes.as_slice())
    } else {
        match proof.nodes.split_first() {
            Some((prefix, suffix)) => (*prefix, suffix),
            None => return false,
        }
    };
    let mut state = keccak256(&[&prefix, &ih_block(k, leaf_bytes)]);
    for block in suffix {
        state = keccak256(&[&state, block]);
    }
    state == *root
}

/// Layout Merkle leaf:
/// `H(gateIndex(32 BE) || gateType(1) || wireA(2) || wireB(2) || wireC(2))`
pub fn layout_leaf(gate_index: u32, desc: &GateDescriptor) -> Digest32 {
    keccak256(&[&be_word(gate_index as u64), &desc.to_bytes()])
}

/// Sorted-pair parent: `H(min || max)`
fn hash_pair(left: &Digest32, right: &Digest32) -> Digest32 {
    if left <= right {
        keccak256(&[left, right])
    } else {
        keccak256(&[right, left])
    }
}

/// Sorted-pair Merkle root over the plaintext circuit structure, fixed at
/// session construction. An odd node is promoted unchanged to the next
/// level.
pub fn layout_root(gates: &[GateDescriptor]) -> Digest32 {
    let mut level: Vec<Digest32> = gates
        .iter()
        .enumerate()
        .map(|(gate_index, desc)| layout_leaf(gate_index as u32, desc))
        .collect();
    if level.is_empty() {
        return ZERO_DIGEST;
    }
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next.push(hash_pair(left, right)),
                [odd] => next.push(*odd),
                _ => unreachable!(),
            }
        }
        level = next;
    }
    level[0]
}

/// Sibling path proving the descriptor at `gate_index` against the layout
/// root
pub fn layout_proof(gates: &[GateDescriptor], gate_index: usize) -> Vec<Digest32> {
    let mut level: Vec<Digest32> = gates
        .iter()
        .enumerate()
        .map(|(index, desc)| layout_leaf(index as u32, desc))
        .collect();
    let mut path = Vec::new();
    let mut position = gate_index;
    while level.len() > 1 {
        let sibling = position ^ 1;
        if sibling < level.len() {
            path.push(level[sibling]);
        }
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next.push(hash_pair(left, right)),
                [odd] => next.push(*odd),
                _ => unreachable!(),
            }
        }
        level = next;
        position /= 2;
    }
    path
}

/// Fold a sibling path from the descriptor leaf and compare against the
/// committed layout root
pub fn verify_layout(
    root: &Digest32,
    gate_index: u32,
    desc: &GateDescriptor,
    proof: &[Digest32],
) -> bool {
    let mut node = layout_leaf(gate_index, desc);
    for sibling in proof {
        node = hash_pair(&node, sibling);
    }
    node == *root
}

/// Result anchors `(h0, h1)` binding each output label to its semantic
/// bit. A terminal NOT chain is resolved here, so the anchors refer to the
/// label bytes the evaluator actually finishes with.
pub fn result_anchors(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    layout: &CircuitLayout,
) -> (Digest32, Digest32) {
    let (wire, parity) = layout.resolved_output();
    let label_for = |out_bit: bool| {
        let label = derive_label(seed, circuit_id, instance, wire, out_bit ^ parity);
        keccak256(&[label.as_bytes()])
    };
    (label_for(false), label_for(true))
}

/// Opaque placeholder roots for the reserved `rootXG` / `rootOT` fields;
/// the dispute core never consumes them
fn reserved_root(tag: &[u8], seed: &Seed, circuit_id: &CircuitId, instance: u32) -> Digest32 {
    keccak256(&[tag, &circuit_id.0, &instance.to_be_bytes(), &seed.0])
}

/// Assemble the full commitment record for one instance: seed commitment,
/// IH root over all gate leaves, reserved roots, and result anchors
pub fn commit_instance(
    seed: &Seed,
    circuit_id: &CircuitId,
    instance: u32,
    layout: &CircuitLayout,
) -> InstanceCommitment {
    let leaves = garble_instance(seed, circuit_id, instance, layout);
    let (h0, h1) = result_anchors(seed, circuit_id, instance, layout);
    InstanceCommitment {
        com_seed: keccak256(&[&seed.0]),
        root_gc: ih_root(&leaves),
        root_xg: reserved_root(b"XG", seed, circuit_id, instance),
        root_ot: reserved_root(b"OT", seed, circuit_id, instance),
        h0,
        h1,
    }
}
