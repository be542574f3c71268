//! Advisory CRC32C verification for v5 metadata.
//!
//! XFS computes CRC32C over the whole metadata buffer with the CRC field
//! zeroed, applying the standard final inversion, and stores the result
//! little-endian. Read-only traversal treats a mismatch as a warning, not
//! a failure.

/// Verify the CRC32C of `region`, whose 4-byte little-endian CRC field
/// lives at `crc_offset`. Returns `false` on mismatch or if the region is
/// too short to contain the field.
#[must_use]
pub fn verify_region_crc(region: &[u8], crc_offset: usize) -> bool {
    let Some(end) = crc_offset.checked_add(4) else {
        return false;
    };
    if end > region.len() {
        return false;
    }

    let stored = u32::from_le_bytes([
        region[crc_offset],
        region[crc_offset + 1],
        region[crc_offset + 2],
        region[crc_offset + 3],
    ]);

    let mut zeroed = region.to_vec();
    zeroed[crc_offset..end].fill(0);
    crc32c::crc32c(&zeroed) == stored
}

/// Compute and stamp the CRC field of a metadata buffer (fixtures only).
pub fn stamp_region_crc(region: &mut [u8], crc_offset: usize) {
    region[crc_offset..crc_offset + 4].fill(0);
    let crc = crc32c::crc32c(region);
    region[crc_offset..crc_offset + 4].copy_from_slice(&crc.to_le_bytes());
}
