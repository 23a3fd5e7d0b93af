use std::fmt;
use std::str::FromStr;

use crate::Error;

/// git object id (SHA-1) of a state commit
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 20]);

impl Hash {
    /// null hash: the branch does not exist / has no state yet
    pub const NULL: Hash = Hash([0u8; 20]);

    /// number of hex digits in a full hash
    pub const HEX_LEN: usize = 40;

    /// create from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// parse from a full 40-digit hex string
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != Self::HEX_LEN {
            return Err(Error::InvalidHashHex(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHashHex(s.to_string()))?;
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// true if `s` has the shape of a full hash
    pub fn looks_like_hex(s: &str) -> bool {
        s.len() == Self::HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// abbreviated hex form for display
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::NULL
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_roundtrip() {
        let hex = "deadbeef00112233445566778899aabbccddeeff";
        let hash = Hash::from_hex(hex).unwrap();
        assert_eq!(hash.to_hex(), hex);
        assert_eq!(hash.to_string(), hex);
        assert_eq!(hash.short(), "deadbeef0011");
    }

    #[test]
    fn test_null_hash() {
        let null = Hash::from_hex(&"0".repeat(40)).unwrap();
        assert!(null.is_null());
        assert_eq!(null, Hash::NULL);
        assert_eq!(Hash::default(), Hash::NULL);
    }

    #[test]
    fn test_invalid_hex() {
        assert!(Hash::from_hex("abc").is_err());
        assert!(Hash::from_hex(&"g".repeat(40)).is_err());
        // sha-256 length is not a git sha-1 id
        assert!(Hash::from_hex(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_looks_like_hex() {
        assert!(Hash::looks_like_hex("deadbeef00112233445566778899aabbccddeeff"));
        assert!(!Hash::looks_like_hex("deadbeef"));
        assert!(!Hash::looks_like_hex("master"));
    }
}
