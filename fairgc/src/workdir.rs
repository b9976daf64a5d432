use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use crate::circuit::CircuitLayout;
use crate::commitment::ih_root;
use crate::constants::NUM_INSTANCES;
use crate::garble::{GateLeaf, garble_instance};
use crate::hash::Digest32;
use crate::label::{CircuitId, Seed};

/// Strip an optional `0x` prefix and decode hex
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(stripped).with_context(|| format!("Invalid hex: '{}'", trimmed))
}

/// Decode hex into a 32-byte value (seeds, digests, circuit ids)
pub fn parse_hex32(text: &str) -> Result<[u8; 32]> {
    let bytes = parse_hex(text)?;
    if bytes.len() != 32 {
        bail!("Expected 32 bytes of hex, got {}", bytes.len());
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Read one hex value per line, skipping `#` comments and blank lines
pub fn read_hex_lines<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<u8>>> {
    let data = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
    let mut values = Vec::new();
    for (line_number, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bytes = parse_hex(line)
            .with_context(|| format!("Line {} of {}", line_number + 1, path.as_ref().display()))?;
        values.push(bytes);
    }
    Ok(values)
}

fn seed_path(dir: &Path, instance: usize) -> PathBuf {
    dir.join(format!("instance-{}-seed.txt", instance))
}

fn leaves_path(dir: &Path, instance: usize) -> PathBuf {
    dir.join(format!("instance-{}-leaves.txt", instance))
}

fn root_gc_path(dir: &Path, instance: usize) -> PathBuf {
    dir.join(format!("instance-{}-root-gc.txt", instance))
}

/// Read a single-value hex file (seed or root)
fn read_single_hex32<P: AsRef<Path>>(path: P) -> Result<[u8; 32]> {
    let values = read_hex_lines(&path)?;
    match values.as_slice() {
        [value] if value.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(value);
            Ok(out)
        }
        _ => bail!(
            "{} must contain exactly one 32-byte hex value",
            path.as_ref().display()
        ),
    }
}

/// Read an instance seed from the work directory
pub fn read_seed(dir: &Path, instance: usize) -> Result<Seed> {
    Ok(Seed(read_single_hex32(seed_path(dir, instance))?))
}

/// Read a committed IH root from the work directory
pub fn read_root_gc(dir: &Path, instance: usize) -> Result<Digest32> {
    read_single_hex32(root_gc_path(dir, instance))
}

/// Parse a leaves file: one 71-byte leaf in hex per line
pub fn read_leaves_file<P: AsRef<Path>>(path: P) -> Result<Vec<GateLeaf>> {
    read_hex_lines(path)?
        .iter()
        .map(|bytes| GateLeaf::from_bytes(bytes))
        .collect()
}

/// Read the leaves of one instance from the work directory
pub fn read_leaves(dir: &Path, instance: usize) -> Result<Vec<GateLeaf>> {
    read_leaves_file(leaves_path(dir, instance))
}

/// Write the full prover work directory: per-instance seed, gate leaves,
/// and IH root, in the hex-with-comments layout both parties' tooling
/// consumes for inspection and dispute preparation
pub fn export_artifacts(
    dir: &Path,
    seeds: &[Seed; NUM_INSTANCES],
    circuit_id: &CircuitId,
    layout: &CircuitLayout,
) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for (instance, seed) in seeds.iter().enumerate() {
        let leaves = garble_instance(seed, circuit_id, instance as u32, layout);

        fs::write(
            seed_path(dir, instance),
            format!("# instance {} seed\n{}\n", instance, hex::encode(seed.0)),
        )?;

        let mut leaves_text =
            format!("# instance {} gate leaves, one 71-byte leaf per line\n", instance);
        for leaf in &leaves {
            leaves_text.push_str(&hex::encode(leaf.to_bytes()));
            leaves_text.push('\n');
        }
        fs::write(leaves_path(dir, instance), leaves_text)?;

        fs::write(
            root_gc_path(dir, instance),
            format!(
                "# instance {} rootGC\n{}\n",
                instance,
                hex::encode(ih_root(&leaves))
            ),
        )?;
    }
    Ok(())
}
