//! Fixed 256-bit target/difficulty conversions shared by the endpoint (target_hex)
//! and the share validator (hash-to-difficulty comparison).

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// 2^256 - 1, the numerator for every target/difficulty conversion.
pub fn diff1() -> BigUint {
    (BigUint::one() << 256) - BigUint::one()
}

/// Converts a port/share difficulty into the 8-hex-char target string miners compare
/// their hash against: `floor(diff1/difficulty)`, left-padded to 32 bytes big-endian,
/// take the first 4 bytes, reverse them to little-endian, hex-encode.
///
/// Panics if `difficulty == 0` — callers must never construct a zero-difficulty port.
pub fn target_hex(difficulty: u64) -> String {
    assert!(difficulty > 0, "difficulty must be positive");
    let quotient = diff1() / BigUint::from(difficulty);
    let mut padded = quotient.to_bytes_be();
    if padded.len() < 32 {
        let mut buf = vec![0u8; 32 - padded.len()];
        buf.extend_from_slice(&padded);
        padded = buf;
    }
    let mut first4 = [0u8; 4];
    first4.copy_from_slice(&padded[..4]);
    first4.reverse();
    hex::encode(first4)
}

/// Inverse of the target relation: treats `hash` as a little-endian 256-bit integer
/// and returns `diff1 / hash`. Returns `None` if the reversed hash is zero (the
/// source's "not ok" signal).
pub fn hash_difficulty(hash: &[u8]) -> Option<BigUint> {
    if hash.is_empty() {
        return None;
    }
    let mut reversed = hash.to_vec();
    reversed.reverse();
    let value = BigUint::from_bytes_be(&reversed);
    if value.is_zero() {
        return None;
    }
    Some(diff1() / value)
}

/// 256-bit difficulty value used to compare against a hash's difficulty:
/// `diff1 / difficulty`, precomputed once per endpoint/template.
pub fn difficulty_to_target_value(difficulty: u64) -> BigUint {
    diff1() / BigUint::from(difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_hex_matches_fixed_vectors() {
        assert_eq!(target_hex(500), "6e128300");
        assert_eq!(target_hex(15000), "7b5e0400");
    }

    #[test]
    fn hash_difficulty_matches_fixed_vector() {
        let hash =
            hex::decode("8e3c1865f22801dc3df0a688da80701e2390e7838e65c142604cc00eafe34000")
                .unwrap();
        let diff = hash_difficulty(&hash).unwrap();
        assert_eq!(diff, BigUint::from(1009u32));
    }

    #[test]
    fn hash_difficulty_rejects_empty_input() {
        assert!(hash_difficulty(&[]).is_none());
    }

    #[test]
    fn hash_difficulty_rejects_all_zero_hash() {
        let zero = vec![0u8; 32];
        assert!(hash_difficulty(&zero).is_none());
    }
}
