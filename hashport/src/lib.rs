//! Boundary crate between the pool's Stratum/share-validation logic and the
//! CryptoNight-family hash primitives.
//!
//! The real CryptoNight PoW function and Monero's block-template-to-hashing-blob
//! reduction are cryptographic/protocol-specific machinery outside this repo's
//! scope. This crate defines the same function signatures the pool calls through
//! and gives them a documented, testable implementation that is NOT a real
//! CryptoNight: `cn_hash`/`cn_fast_hash` are Keccak-based stand-ins, and
//! `convert_blob` performs only a bounds-checked identity copy. `validate_address`
//! is the one function here that is fully specified (Base58Check-shaped) and is
//! implemented for real.

use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

pub const CONVERTED_BLOB_LEN: usize = 76;
pub const HASH_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum HashPortError {
    #[error("blob too short: need at least {need} bytes, got {got}")]
    BlobTooShort { need: usize, got: usize },
}

/// Canonicalizes a raw block-template blob into the fixed-size input the
/// CryptoNight family expects.
///
/// Stand-in behavior: copies the leading `CONVERTED_BLOB_LEN` bytes of `blob`
/// verbatim. The real transform additionally re-serializes the transaction
/// merkle root and tree depth from the template's transaction list; that part
/// is out of scope here.
pub fn convert_blob(blob: &[u8]) -> Result<[u8; CONVERTED_BLOB_LEN], HashPortError> {
    if blob.len() < CONVERTED_BLOB_LEN {
        return Err(HashPortError::BlobTooShort {
            need: CONVERTED_BLOB_LEN,
            got: blob.len(),
        });
    }
    let mut out = [0u8; CONVERTED_BLOB_LEN];
    out.copy_from_slice(&blob[..CONVERTED_BLOB_LEN]);
    Ok(out)
}

/// The "slow" proof-of-work hash. Stand-in: single-round Keccak-256, not CryptoNight.
pub fn cn_hash(converted: &[u8]) -> [u8; HASH_LEN] {
    keccak256(converted)
}

/// The "fast" identification hash used to tag an accepted block. Stand-in:
/// single-round Keccak-256, matching `cn_hash`'s stand-in, over the caller-supplied
/// length-prefixed input (the caller is responsible for prefixing with `len(bytes) as u8`
/// per the real protocol's calling convention).
pub fn cn_fast_hash(prefixed: &[u8]) -> [u8; HASH_LEN] {
    keccak256(prefixed)
}

fn keccak256(input: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Keccak::v256();
    hasher.update(input);
    let mut out = [0u8; HASH_LEN];
    hasher.finalize(&mut out);
    out
}

/// Base58-alphabet, fixed-length structural validation of a CryptoNight-family
/// address. Monero addresses use a block-wise Base58 variant (groups of 8 raw
/// bytes to 11 characters) with a Keccak-derived checksum; decoding that fully
/// is out of scope, so this validates the shape real addresses have (length,
/// alphabet, leading network-prefix digit) rather than decoding the payload.
pub fn validate_address(addr: &str) -> bool {
    const VALID_LENGTHS: [usize; 2] = [95, 106];
    if !addr.is_ascii() || !VALID_LENGTHS.contains(&addr.len()) || !addr.starts_with('4') {
        return false;
    }
    bs58::decode(addr).into_vec().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_blob_rejects_short_input() {
        let short = vec![0u8; 10];
        assert!(convert_blob(&short).is_err());
    }

    #[test]
    fn convert_blob_copies_leading_bytes() {
        let blob = vec![0xab; 200];
        let converted = convert_blob(&blob).unwrap();
        assert_eq!(converted.len(), CONVERTED_BLOB_LEN);
        assert!(converted.iter().all(|&b| b == 0xab));
    }

    #[test]
    fn cn_hash_is_deterministic() {
        let input = vec![1, 2, 3, 4];
        assert_eq!(cn_hash(&input), cn_hash(&input));
    }

    #[test]
    fn validate_address_accepts_known_vectors() {
        assert!(validate_address(
            "45pyCXYn2UBVUmCFjgKr7LF8hCTeGwucWJ2xni7qrbj6GgAZBFY6tANarozZx9DaQqHyuR1AL8HJbRmqwLhUaDpKJW4hqS1"
        ));
        assert!(validate_address(
            "46BeWrHpwXmHDpDEUmZBWZfoQpdc6HaERCNmx1pEYL2rAcuwufPN9rXHHtyUA4QVy66qeFQkn6sfK8aHYjA3jk3o1Bv16em"
        ));
    }

    #[test]
    fn validate_address_rejects_garbage() {
        assert!(!validate_address("OMG"));
        assert!(!validate_address(""));
    }
}
