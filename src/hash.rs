use std::fmt;
use std::str::FromStr;

use base58check::{FromBase58Check, ToBase58Check};
use ring::digest::{Context, SHA256};
use ripemd::{Digest, Ripemd160};
use serde::{Deserialize, Serialize};

/// Address version byte used when base58check-encoding a [Hash168]. ELA mainnet uses
/// a single version byte regardless of the prefix carried inside the hash itself.
pub const ADDRESS_VERSION: u8 = 0x21;

/// Prefix carried by the first byte of a [Hash168] for a single-signature address.
pub const PREFIX_SINGLE_SIG: u8 = 0x21;
/// Prefix carried by the first byte of a [Hash168] for a multisig/script address.
pub const PREFIX_SCRIPT: u8 = 0x12;

/// A 32-byte content hash (block hash, transaction hash, asset ID...).
///
/// In-memory and wire layout is big-endian-as-array. Display and the RPC layer show
/// hashes byte-reversed to match external tooling (`ToArrayReverse` in the original).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn sha256d(data: &[u8]) -> Hash256 {
        let first = sha256(data);
        Hash256(sha256(&first))
    }

    pub fn sha256(data: &[u8]) -> Hash256 {
        Hash256(sha256(data))
    }

    pub fn to_array_reverse(&self) -> [u8; 32] {
        let mut out = self.0;
        out.reverse();
        out
    }

    /// Hex-encodes in the reversed, user-facing byte order used throughout the RPC layer.
    pub fn to_hex_reverse(&self) -> String {
        hex::encode(self.to_array_reverse())
    }

    /// Parses a hex string that is itself in reversed (user-facing) byte order.
    pub fn from_hex_reverse(s: &str) -> Result<Hash256, HashParseError> {
        let bytes = hex::decode(s).map_err(|_| HashParseError)?;
        if bytes.len() != 32 {
            return Err(HashParseError);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        arr.reverse();
        Ok(Hash256(arr))
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

#[derive(Debug)]
pub struct HashParseError;

impl fmt::Display for HashParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid hash encoding")
    }
}

impl std::error::Error for HashParseError {}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_reverse())
    }
}

/// A 21-byte program hash: one prefix byte plus RIPEMD160(SHA256(redeem script)).
///
/// The prefix determines which signature type the matching redeem script must hash
/// under: [PREFIX_SCRIPT] for multisig/script contracts, [PREFIX_SINGLE_SIG] for a
/// plain single-signature contract.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash168(pub [u8; 21]);

impl Hash168 {
    pub fn new(prefix: u8, code: &[u8]) -> Hash168 {
        let sha = sha256(code);
        let mut ripemd = Ripemd160::new();
        ripemd.update(sha);
        let digest = ripemd.finalize();

        let mut out = [0u8; 21];
        out[0] = prefix;
        out[1..].copy_from_slice(&digest);
        Hash168(out)
    }

    pub fn prefix(&self) -> u8 {
        self.0[0]
    }

    pub fn to_address(&self) -> String {
        self.0.to_base58check(ADDRESS_VERSION)
    }
}

impl fmt::Debug for Hash168 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_address())
    }
}

impl fmt::Display for Hash168 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_address())
    }
}

impl FromStr for Hash168 {
    type Err = HashParseError;

    fn from_str(addr: &str) -> Result<Self, Self::Err> {
        let (version, bytes) = addr.from_base58check().map_err(|_| HashParseError)?;
        if version != ADDRESS_VERSION || bytes.len() != 21 {
            return Err(HashParseError);
        }
        let mut out = [0u8; 21];
        out.copy_from_slice(&bytes);
        Ok(Hash168(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash256_reverse_hex_round_trips() {
        let h = Hash256([7u8; 32]);
        let hex = h.to_hex_reverse();
        let back = Hash256::from_hex_reverse(&hex).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn hash168_address_round_trips() {
        let h = Hash168::new(PREFIX_SINGLE_SIG, b"some redeem script");
        let addr = h.to_address();
        let parsed: Hash168 = addr.parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn hash168_prefix_is_preserved() {
        let script_hash = Hash168::new(PREFIX_SCRIPT, b"multisig redeem");
        assert_eq!(script_hash.prefix(), PREFIX_SCRIPT);
    }
}
