//! Shared constants for the fair-exchange protocol

/// Number of cut-and-choose instances per session (N-1 opened, 1 evaluated)
pub const NUM_INSTANCES: usize = 10;

/// Byte length of a serialized gate leaf:
/// `gateType(1) || wireA(2) || wireB(2) || wireC(2) || 4 x row(16)`
pub const GATE_LEAF_LEN: usize = 71;

/// Byte length of a wire label (128 bits, LSB of byte 0 is the permutation bit)
pub const WIRE_LABEL_LEN: usize = 16;

/// Byte length of a Keccak-256 digest
pub const DIGEST_LEN: usize = 32;

/// Upper bound on IH proof nodes the adjudicator will fold (caps the
/// compute a single challenge can demand)
pub const MAX_IH_PROOF_NODES: usize = 4096;

/// Upper bound on layout Merkle proof depth
pub const MAX_LAYOUT_PROOF_DEPTH: usize = 32;

/// Collateral each party locks during the Deposits stage, in ledger units
pub const DEFAULT_DEPOSIT: u64 = 1;

/// Default per-stage deadline window in seconds
pub const DEFAULT_STAGE_DELTA_SECS: u64 = 3600;
