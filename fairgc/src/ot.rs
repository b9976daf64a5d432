use anyhow::{Result, bail};
use std::collections::HashMap;

use crate::label::WireLabel;

/// Simulate the oblivious transfer step: for each Evaluator input wire,
/// select the label matching that bit of `y`.
///
/// The real protocol would run an OT so the Garbler never sees the choice
/// and the Evaluator never sees the discarded label; here the package
/// carries both labels and selection happens locally.
pub fn select_input_labels(
    pairs: &[(u16, [WireLabel; 2])],
    y: u64,
) -> Result<HashMap<u16, WireLabel>> {
    if pairs.len() > 64 {
        bail!("Evaluator input of {} bits exceeds u64 range", pairs.len());
    }
    if pairs.len() < 64 && y >> pairs.len() != 0 {
        bail!("Input {} does not fit in {} bits", y, pairs.len());
    }
    let mut selected = HashMap::new();
    for (bit, (wire, labels)) in pairs.iter().enumerate() {
        let bit_value = (y >> bit) & 1 == 1;
        selected.insert(*wire, labels[bit_value as usize]);
    }
    Ok(selected)
}
