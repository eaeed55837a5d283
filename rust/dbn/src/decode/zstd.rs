//! Detection of Zstandard-compressed input.

use std::ops::RangeInclusive;

use super::FromLittleEndianSlice;

/// The magic number at the beginning of every standard Zstandard frame.
pub const ZSTD_FRAME_MAGIC: u32 = 0xFD2F_B528;
/// The range of magic numbers used by Zstandard skippable frames, which DBN uses to
/// encapsulate metadata in some streams.
pub const ZSTD_SKIPPABLE_MAGIC_RANGE: RangeInclusive<u32> = 0x184D_2A50..=0x184D_2A5F;

/// Returns `true` if `bytes` begins with a Zstandard frame, standard or skippable.
pub fn starts_with_prefix(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }
    let magic = u32::from_le_slice(bytes);
    magic == ZSTD_FRAME_MAGIC || ZSTD_SKIPPABLE_MAGIC_RANGE.contains(&magic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_zstd_output() {
        let compressed = zstd::encode_all(b"DBN test payload".as_slice(), 0).unwrap();
        assert!(starts_with_prefix(&compressed));
    }

    #[test]
    fn rejects_uncompressed() {
        assert!(!starts_with_prefix(b"DBN\x02"));
        assert!(!starts_with_prefix(b"\x01"));
    }
}
