use sha3::{Digest, Keccak256};

/// 256-bit Keccak digest, the single hash used for every commitment,
/// proof, and anchor in the protocol
pub type Digest32 = [u8; 32];

/// All-zero digest, the initial state of the incremental-hash chain
pub const ZERO_DIGEST: Digest32 = [0u8; 32];

/// Keccak-256 over the concatenation of `parts`
pub fn keccak256(parts: &[&[u8]]) -> Digest32 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// A value widened to a 32-byte big-endian word, the encoding used for
/// gate indices in IH and layout leaf preimages
pub fn be_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..32].copy_from_slice(&value.to_be_bytes());
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_deterministic() {
        let a = keccak256(&[b"fair", b"gc"]);
        let b = keccak256(&[b"fairgc"]);
        // Concatenation is what gets hashed, not the part boundaries
        assert_eq!(a, b);
        assert_eq!(a, keccak256(&[b"fair", b"gc"]));
    }

    #[test]
    fn test_keccak_distinct_inputs() {
        assert_ne!(keccak256(&[b"alice"]), keccak256(&[b"bob"]));
        assert_ne!(keccak256(&[&[0u8]]), keccak256(&[]));
    }

    #[test]
    fn test_be_word_layout() {
        let word = be_word(0x0102);
        assert_eq!(&word[..30], &[0u8; 30]);
        assert_eq!(word[30], 0x01);
        assert_eq!(word[31], 0x02);
    }
}
