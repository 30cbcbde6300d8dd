//! Hash and seed primitives.
//!
//! All consensus hashing is SHA3-256. `Hash::EMPTY` (32 zero bytes) doubles
//! as the reduction fallback value signalling "no candidate".

use sha3::{Digest, Sha3_256};
use thiserror::Error;

/// Errors from hex parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    /// Input length is not exactly 64 hex characters.
    #[error("expected 64 hex characters, got {0}")]
    InvalidLength(usize),
    /// Input contains a non-hex character.
    #[error("invalid hex character {0:?}")]
    InvalidCharacter(char),
}

/// A 32-byte SHA3-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zero hash. Used as the reduction fallback ("no candidate").
    pub const EMPTY: Hash = Hash([0u8; 32]);

    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Hash arbitrary data with SHA3-256.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }

    /// Hash the concatenation of multiple byte slices.
    pub fn digest_all(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha3_256::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(hasher.finalize().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True if this is the fallback hash.
    pub fn is_empty(&self) -> bool {
        *self == Hash::EMPTY
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        if s.len() != 64 {
            return Err(HexError::InvalidLength(s.len()));
        }
        let mut out = [0u8; 32];
        let bytes = s.as_bytes();
        for (i, chunk) in bytes.chunks(2).enumerate() {
            let hi = hex_val(chunk[0]).ok_or(HexError::InvalidCharacter(chunk[0] as char))?;
            let lo = hex_val(chunk[1]).ok_or(HexError::InvalidCharacter(chunk[1] as char))?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Hash(out))
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Abbreviated form for logs; full digest is rarely useful inline.
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}..",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

/// The 33-byte seed carried in block headers and fed to score generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed([u8; 33]);

impl Seed {
    /// Wrap raw seed bytes.
    pub const fn new(bytes: [u8; 33]) -> Self {
        Seed(bytes)
    }

    /// Raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Derive the next round's seed from the previous one and the round number.
    pub fn next(&self, round: u64) -> Seed {
        let digest = Hash::digest_all(&[&self.0, &round.to_le_bytes()]);
        let mut out = [0u8; 33];
        out[0] = 0x02;
        out[1..].copy_from_slice(digest.as_bytes());
        Seed(out)
    }
}

impl Default for Seed {
    fn default() -> Self {
        Seed([0u8; 33])
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Seed({:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2]
        )
    }
}

impl AsRef<[u8]> for Seed {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = Hash::digest(b"nocturne");
        let b = Hash::digest(b"nocturne");
        assert_eq!(a, b);
        assert_ne!(a, Hash::digest(b"nocturn"));
    }

    #[test]
    fn digest_all_matches_concatenation() {
        let joined = Hash::digest(b"hello world");
        let parts = Hash::digest_all(&[b"hello", b" ", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash::digest(b"round trip");
        let parsed = Hash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn hex_rejects_bad_input() {
        assert_eq!(Hash::from_hex("abcd"), Err(HexError::InvalidLength(4)));
        let bad = "zz".repeat(32);
        assert!(matches!(
            Hash::from_hex(&bad),
            Err(HexError::InvalidCharacter('z'))
        ));
    }

    #[test]
    fn empty_hash_is_all_zeroes() {
        assert!(Hash::EMPTY.is_empty());
        assert_eq!(Hash::EMPTY.as_bytes(), &[0u8; 32]);
        assert!(!Hash::digest(b"x").is_empty());
    }

    #[test]
    fn seed_chain_differs_per_round() {
        let genesis = Seed::default();
        let s1 = genesis.next(1);
        let s2 = genesis.next(2);
        assert_ne!(s1, s2);
        assert_eq!(s1, genesis.next(1));
    }
}
