//! Immutable snapshot of a daemon block template.

use num_bigint::BigUint;

use crate::error::PoolError;

/// A block template as returned by the daemon, decoded and ready to mint jobs
/// from. Instances are immutable once built; a new template always replaces
/// the whole snapshot (see `blockchain::refresher`).
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub height: i64,
    pub difficulty: BigUint,
    pub prev_hash: String,
    pub reserved_offset: usize,
    pub buffer: Vec<u8>,
}

impl BlockTemplate {
    pub fn decode(
        blob_hex: &str,
        difficulty: u64,
        height: i64,
        prev_hash: String,
        reserved_offset: usize,
    ) -> Result<Self, PoolError> {
        let buffer = hex::decode(blob_hex)?;
        if reserved_offset + 7 > buffer.len() {
            return Err(PoolError::Config(format!(
                "reserved_offset {reserved_offset} + 7 exceeds buffer length {}",
                buffer.len()
            )));
        }
        Ok(Self {
            height,
            difficulty: BigUint::from(difficulty),
            prev_hash,
            reserved_offset,
            buffer,
        })
    }

    /// Builds the hex-encoded job blob for one (extra_nonce, instance_id) pair:
    /// stamps the extra-nonce and instance-id into the reserved region, then
    /// passes the result through the hashing-input canonicalizer.
    pub fn next_blob(&self, extra_nonce: u32, instance_id: &[u8; 4]) -> Result<String, PoolError> {
        let mut blob = self.buffer.clone();
        let off = self.reserved_offset;
        blob[off + 4..off + 7].copy_from_slice(&instance_id[..3]);
        blob[off..off + 4].copy_from_slice(&extra_nonce.to_be_bytes());
        let converted = hashport::convert_blob(&blob)
            .map_err(|e| PoolError::Config(format!("convert_blob failed: {e}")))?;
        Ok(hex::encode(converted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hex(len: usize) -> String {
        "00".repeat(len)
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = BlockTemplate::decode(&sample_hex(10), 1000, 1, String::new(), 10);
        assert!(err.is_err());
    }

    #[test]
    fn next_blob_stamps_extra_nonce_and_instance_id() {
        let template = BlockTemplate::decode(&sample_hex(100), 1000, 1, String::new(), 40).unwrap();
        let instance_id = [0xaa, 0xbb, 0xcc, 0xdd];
        let blob_hex = template.next_blob(0x01020304, &instance_id).unwrap();
        let blob = hex::decode(blob_hex).unwrap();
        assert_eq!(blob.len(), hashport::CONVERTED_BLOB_LEN);
        assert_eq!(&blob[40..44], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&blob[44..47], &[0xaa, 0xbb, 0xcc]);
    }
}
