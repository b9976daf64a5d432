use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Boolean gate kind carried in the plaintext circuit layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateType {
    /// Two-input AND, garbled with four rows
    And,
    /// Two-input XOR, garbled with four rows
    Xor,
    /// Single-input NOT; its leaf carries zero rows and the evaluator
    /// passes the input label through unchanged
    Not,
}

impl GateType {
    /// Wire-format code of this gate type (AND=0, XOR=1, NOT=2)
    pub fn code(self) -> u8 {
        match self {
            GateType::And => 0,
            GateType::Xor => 1,
            GateType::Not => 2,
        }
    }

    /// Parse a wire-format gate type code
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(GateType::And),
            1 => Ok(GateType::Xor),
            2 => Ok(GateType::Not),
            _ => bail!("Unsupported gate type code: {}", code),
        }
    }

    /// Plaintext truth table of the gate (second input ignored for NOT)
    pub fn eval(self, bit_a: bool, bit_b: bool) -> bool {
        match self {
            GateType::And => bit_a && bit_b,
            GateType::Xor => bit_a ^ bit_b,
            GateType::Not => !bit_a,
        }
    }
}

/// Plaintext description of one gate: type plus input/output wire ids.
/// `wire_b` is zero for NOT gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDescriptor {
    /// Gate kind
    pub gate_type: GateType,
    /// First input wire
    pub wire_a: u16,
    /// Second input wire (0 for NOT)
    pub wire_b: u16,
    /// Output wire
    pub wire_c: u16,
}

impl GateDescriptor {
    /// Serialized descriptor bytes as they appear at the head of a gate
    /// leaf: `gateType(1) || wireA(2 BE) || wireB(2 BE) || wireC(2 BE)`
    pub fn to_bytes(&self) -> [u8; 7] {
        let mut bytes = [0u8; 7];
        bytes[0] = self.gate_type.code();
        bytes[1..3].copy_from_slice(&self.wire_a.to_be_bytes());
        bytes[3..5].copy_from_slice(&self.wire_b.to_be_bytes());
        bytes[5..7].copy_from_slice(&self.wire_c.to_be_bytes());
        bytes
    }

    /// Parse the 7-byte descriptor prefix of a gate leaf
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 7 {
            bail!("Gate descriptor too short: {} bytes", bytes.len());
        }
        Ok(GateDescriptor {
            gate_type: GateType::from_code(bytes[0])?,
            wire_a: u16::from_be_bytes([bytes[1], bytes[2]]),
            wire_b: u16::from_be_bytes([bytes[3], bytes[4]]),
            wire_c: u16::from_be_bytes([bytes[5], bytes[6]]),
        })
    }
}

/// Agreed plaintext circuit structure shared by both parties.
/// Fixed per session; only its Merkle root goes on the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitLayout {
    /// Gates in topological order; the gate index is the position here
    pub gates: Vec<GateDescriptor>,
    /// Garbler input wires, least significant bit first
    pub alice_wires: Vec<u16>,
    /// Evaluator input wires, least significant bit first
    pub bob_wires: Vec<u16>,
    /// Wire carrying the circuit result
    pub output_wire: u16,
    /// Total number of wires referenced by the layout
    pub wire_count: u16,
}

impl CircuitLayout {
    /// Check structural well-formedness: wires in range, topological
    /// ordering, and NOT outputs feeding nothing but further NOT gates
    /// or the circuit output (inner inversions must be synthesized from
    /// AND/XOR so that leaf recomputation stays local to one descriptor).
    pub fn validate(&self) -> Result<()> {
        let mut produced = vec![false; self.wire_count as usize];
        let mut primary = vec![false; self.wire_count as usize];
        for &wire in self.alice_wires.iter().chain(self.bob_wires.iter()) {
            if wire >= self.wire_count {
                bail!("Input wire {} out of range", wire);
            }
            primary[wire as usize] = true;
        }

        let mut not_outputs = vec![false; self.wire_count as usize];
        for (index, gate) in self.gates.iter().enumerate() {
            for wire in [gate.wire_a, gate.wire_b, gate.wire_c] {
                if wire >= self.wire_count {
                    bail!("Wire {} out of range at gate {}", wire, index);
                }
            }
            let known = |wire: u16| primary[wire as usize] || produced[wire as usize];
            if !known(gate.wire_a) {
                bail!("Gate {} reads undriven wire {}", index, gate.wire_a);
            }
            if gate.gate_type != GateType::Not {
                if !known(gate.wire_b) {
                    bail!("Gate {} reads undriven wire {}", index, gate.wire_b);
                }
            } else if gate.wire_b != 0 {
                bail!("NOT gate {} must carry wire_b = 0", index);
            }
            if gate.gate_type != GateType::Not {
                for wire in [gate.wire_a, gate.wire_b] {
                    if not_outputs[wire as usize] {
                        bail!("Gate {} consumes NOT output wire {}", index, wire);
                    }
                }
            }
            if produced[gate.wire_c as usize] || primary[gate.wire_c as usize] {
                bail!("Wire {} driven twice", gate.wire_c);
            }
            produced[gate.wire_c as usize] = true;
            if gate.gate_type == GateType::Not {
                not_outputs[gate.wire_c as usize] = true;
            }
        }

        if self.output_wire >= self.wire_count || !produced[self.output_wire as usize] {
            bail!("Output wire {} is not driven by any gate", self.output_wire);
        }
        Ok(())
    }

    /// Resolve the output wire through any terminal NOT chain.
    ///
    /// Returns the wire whose derived labels the evaluator actually ends
    /// up holding, plus the accumulated semantic inversion: the circuit
    /// output bit `b` corresponds to label `L(wire, b XOR parity)`.
    pub fn resolved_output(&self) -> (u16, bool) {
        let mut wire = self.output_wire;
        let mut parity = false;
        loop {
            let producer = self
                .gates
                .iter()
                .find(|gate| gate.wire_c == wire && gate.gate_type == GateType::Not);
            match producer {
                Some(gate) => {
                    parity = !parity;
                    wire = gate.wire_a;
                }
                None => return (wire, parity),
            }
        }
    }
}

/// Build the millionaires comparator over AND/XOR with one terminal NOT.
///
/// Wires `0..bit_width` carry the Garbler's `x` (LSB first) and wires
/// `bit_width..2*bit_width` the Evaluator's `y`. The ladder walks from the
/// most significant bit down, carrying `gt` ("x already won") and `ne`
/// ("prefixes differ"), built from the identities
/// `a AND (NOT b) = a XOR (a AND b)` and `p OR q = p XOR q XOR (p AND q)`.
/// The terminal NOT makes semantic output bit 0 mean `x > y`, matching the
/// result-anchor convention where a match on `h0` settles in Alice's favor.
pub fn comparator_circuit(bit_width: u16) -> Result<CircuitLayout> {
    if bit_width == 0 || bit_width > 256 {
        bail!("Unsupported comparator width: {}", bit_width);
    }

    let alice_wires: Vec<u16> = (0..bit_width).collect();
    let bob_wires: Vec<u16> = (bit_width..2 * bit_width).collect();

    let mut gates = Vec::new();
    let mut next_wire = 2 * bit_width;
    let mut fresh = |gates: &mut Vec<GateDescriptor>,
                     gate_type: GateType,
                     wire_a: u16,
                     wire_b: u16| {
        let wire_c = next_wire;
        next_wire += 1;
        gates.push(GateDescriptor {
            gate_type,
            wire_a,
            wire_b,
            wire_c,
        });
        wire_c
    };

    // Most significant bit seeds the ladder
    let msb = bit_width - 1;
    let a = msb;
    let b = bit_width + msb;
    let ab = fresh(&mut gates, GateType::And, a, b);
    let mut gt = fresh(&mut gates, GateType::Xor, a, ab); // a AND (NOT b)
    let mut ne = fresh(&mut gates, GateType::Xor, a, b);

    for k in (0..msb).rev() {
        let a = k;
        let b = bit_width + k;
        let d = fresh(&mut gates, GateType::Xor, a, b);
        let ab = fresh(&mut gates, GateType::And, a, b);
        let t = fresh(&mut gates, GateType::Xor, a, ab);
        // c = t AND eq, with eq tracked as NOT ne
        let tn = fresh(&mut gates, GateType::And, t, ne);
        let c = fresh(&mut gates, GateType::Xor, t, tn);
        // gt = gt OR c
        let gc = fresh(&mut gates, GateType::And, gt, c);
        let g1 = fresh(&mut gates, GateType::Xor, gt, c);
        gt = fresh(&mut gates, GateType::Xor, g1, gc);
        // ne = ne OR d
        let nd = fresh(&mut gates, GateType::And, ne, d);
        let n1 = fresh(&mut gates, GateType::Xor, ne, d);
        ne = fresh(&mut gates, GateType::Xor, n1, nd);
    }

    let output_wire = next_wire;
    next_wire += 1;
    gates.push(GateDescriptor {
        gate_type: GateType::Not,
        wire_a: gt,
        wire_b: 0,
        wire_c: output_wire,
    });

    let layout = CircuitLayout {
        gates,
        alice_wires,
        bob_wires,
        output_wire,
        wire_count: next_wire,
    };
    layout.validate()?;
    Ok(layout)
}

/// Evaluate a layout over plaintext inputs, used to cross-check garbled
/// evaluation in tests
pub fn eval_plain(layout: &CircuitLayout, x: u64, y: u64) -> Result<bool> {
    let mut values = vec![None; layout.wire_count as usize];
    for (bit, &wire) in layout.alice_wires.iter().enumerate() {
        values[wire as usize] = Some((x >> bit) & 1 == 1);
    }
    for (bit, &wire) in layout.bob_wires.iter().enumerate() {
        values[wire as usize] = Some((y >> bit) & 1 == 1);
    }
    for gate in &layout.gates {
        let bit_a = values[gate.wire_a as usize]
            .ok_or_else(|| anyhow::anyhow!("Wire {} not set", gate.wire_a))?;
        let bit_b = if gate.gate_type == GateType::Not {
            false
        } else {
            values[gate.wire_b as usize]
                .ok_or_else(|| anyhow::anyhow!("Wire {} not set", gate.wire_b))?
        };
        values[gate.wire_c as usize] = Some(gate.gate_type.eval(bit_a, bit_b));
    }
    values[layout.output_wire as usize]
        .ok_or_else(|| anyhow::anyhow!("Output wire {} not set", layout.output_wire))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_type_codec_roundtrip() {
        for gate_type in [GateType::And, GateType::Xor, GateType::Not] {
            assert_eq!(GateType::from_code(gate_type.code()).unwrap(), gate_type);
        }
        assert!(GateType::from_code(3).is_err());
    }

    #[test]
    fn test_descriptor_bytes_big_endian() {
        let desc = GateDescriptor {
            gate_type: GateType::Xor,
            wire_a: 0x0102,
            wire_b: 0x0304,
            wire_c: 0x0506,
        };
        let bytes = desc.to_bytes();
        assert_eq!(bytes, [1, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(GateDescriptor::from_bytes(&bytes).unwrap(), desc);
    }

    #[test]
    fn test_comparator_semantics() -> Result<()> {
        let layout = comparator_circuit(4)?;
        for x in 0..16u64 {
            for y in 0..16u64 {
                // Output bit 0 means x > y (the terminal NOT inverts gt)
                assert_eq!(eval_plain(&layout, x, y)?, !(x > y), "x={} y={}", x, y);
            }
        }
        Ok(())
    }

    #[test]
    fn test_comparator_single_bit() -> Result<()> {
        let layout = comparator_circuit(1)?;
        assert_eq!(eval_plain(&layout, 1, 0)?, false); // x > y
        assert_eq!(eval_plain(&layout, 0, 1)?, true);
        assert_eq!(eval_plain(&layout, 1, 1)?, true);
        Ok(())
    }

    #[test]
    fn test_comparator_terminal_not_resolution() -> Result<()> {
        let layout = comparator_circuit(8)?;
        let (wire, parity) = layout.resolved_output();
        assert!(parity);
        assert_ne!(wire, layout.output_wire);
        // The resolved wire is the gt ladder result feeding the final NOT
        let last = layout.gates.last().unwrap();
        assert_eq!(last.gate_type, GateType::Not);
        assert_eq!(last.wire_a, wire);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_not_feeding_and() {
        let layout = CircuitLayout {
            gates: vec![
                GateDescriptor {
                    gate_type: GateType::Not,
                    wire_a: 0,
                    wire_b: 0,
                    wire_c: 2,
                },
                GateDescriptor {
                    gate_type: GateType::And,
                    wire_a: 2,
                    wire_b: 1,
                    wire_c: 3,
                },
            ],
            alice_wires: vec![0],
            bob_wires: vec![1],
            output_wire: 3,
            wire_count: 4,
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_undriven_wire() {
        let layout = CircuitLayout {
            gates: vec![GateDescriptor {
                gate_type: GateType::And,
                wire_a: 0,
                wire_b: 5,
                wire_c: 2,
            }],
            alice_wires: vec![0],
            bob_wires: vec![1],
            output_wire: 2,
            wire_count: 6,
        };
        assert!(layout.validate().is_err());
    }
}
