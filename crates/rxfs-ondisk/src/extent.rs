//! Packed `bmbt` extent record decoding.
//!
//! A record is 128 bits, big-endian, packed as
//! `flag:1 | file_offset:54 | start_block:52 | block_count:21`.
//! `start_block` is a packed filesystem block number (AG index in the
//! upper bits); translation to a physical offset goes through
//! `InodeGeometry::fsblock_to_byte`.

use rxfs_types::{read_be_u64, ParseError};
use serde::{Deserialize, Serialize};

/// Size of one on-disk record.
pub const BMBT_REC_SIZE: usize = 16;

const FILE_OFFSET_MASK: u64 = (1_u64 << 54) - 1;
const BLOCK_COUNT_MASK: u64 = (1_u64 << 21) - 1;

/// A raw 128-bit record, still packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmbtRec {
    pub l0: u64,
    pub l1: u64,
}

/// An unpacked extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    /// Logical offset within the file, in filesystem blocks.
    pub logical_offset: u64,
    /// Packed filesystem block number of the first block.
    pub start_block: u64,
    /// Run length in filesystem blocks.
    pub block_count: u64,
    /// Preallocated-but-unwritten extents read as zeroes.
    pub unwritten: bool,
}

impl BmbtRec {
    /// Decode one record from `data` at `offset`.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self, ParseError> {
        Ok(Self {
            l0: read_be_u64(data, offset)?,
            l1: read_be_u64(data, offset + 8)?,
        })
    }

    /// Unpack the bit fields.
    #[must_use]
    pub fn unpack(&self) -> Extent {
        Extent {
            unwritten: (self.l0 >> 63) != 0,
            logical_offset: (self.l0 >> 9) & FILE_OFFSET_MASK,
            start_block: ((self.l0 & 0x1FF) << 43) | (self.l1 >> 21),
            block_count: self.l1 & BLOCK_COUNT_MASK,
        }
    }

    /// Pack an extent back into record form (fixtures and tests).
    #[must_use]
    pub fn pack(extent: Extent) -> Self {
        let flag = u64::from(extent.unwritten) << 63;
        let l0 = flag
            | ((extent.logical_offset & FILE_OFFSET_MASK) << 9)
            | (extent.start_block >> 43);
        let l1 = ((extent.start_block & ((1_u64 << 43) - 1)) << 21)
            | (extent.block_count & BLOCK_COUNT_MASK);
        Self { l0, l1 }
    }

    /// On-disk bytes for this record.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; BMBT_REC_SIZE] {
        let mut out = [0_u8; BMBT_REC_SIZE];
        out[..8].copy_from_slice(&self.l0.to_be_bytes());
        out[8..].copy_from_slice(&self.l1.to_be_bytes());
        out
    }
}

/// Decode `nextents` contiguous records from a data fork.
///
/// The count comes from the inode's `di_nextents`; there is no sentinel
/// record on disk.
pub fn parse_bmbt_records(fork: &[u8], nextents: u32) -> Result<Vec<BmbtRec>, ParseError> {
    let count = nextents as usize;
    let needed = count
        .checked_mul(BMBT_REC_SIZE)
        .ok_or(ParseError::InvalidField {
            field: "di_nextents",
            reason: "overflow",
        })?;
    if fork.len() < needed {
        return Err(ParseError::InsufficientData {
            needed,
            offset: 0,
            actual: fork.len(),
        });
    }

    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        records.push(BmbtRec::parse(fork, i * BMBT_REC_SIZE)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxfs_types::{BlockNumber, InodeGeometry};

    fn geometry() -> InodeGeometry {
        InodeGeometry {
            block_size: 4096,
            inode_size: 256,
            ag_blocks: 1024,
            ag_count: 4,
            ag_block_log: 10,
            inodes_per_block_log: 4,
        }
    }

    #[test]
    fn pack_unpack_round_trip() {
        let cases = [
            Extent {
                logical_offset: 0,
                start_block: 24,
                block_count: 1,
                unwritten: false,
            },
            Extent {
                logical_offset: 7,
                start_block: (2 << 10) | 9, // AG 2, block 9
                block_count: 3,
                unwritten: false,
            },
            Extent {
                logical_offset: (1 << 54) - 1,
                start_block: (1 << 52) - 1,
                block_count: (1 << 21) - 1,
                unwritten: true,
            },
        ];
        for extent in cases {
            let rec = BmbtRec::pack(extent);
            assert_eq!(rec.unpack(), extent);
        }
    }

    #[test]
    fn unpack_known_bit_pattern() {
        // flag=0, offset=1, start_block=2, count=3:
        // l0 = 1 << 9, l1 = (2 << 21) | 3
        let rec = BmbtRec {
            l0: 1 << 9,
            l1: (2 << 21) | 3,
        };
        let ext = rec.unpack();
        assert!(!ext.unwritten);
        assert_eq!(ext.logical_offset, 1);
        assert_eq!(ext.start_block, 2);
        assert_eq!(ext.block_count, 3);
    }

    #[test]
    fn unwritten_flag_is_top_bit() {
        let rec = BmbtRec {
            l0: 1 << 63,
            l1: 0,
        };
        assert!(rec.unpack().unwritten);
    }

    #[test]
    fn parse_record_array_honors_count() {
        let a = BmbtRec::pack(Extent {
            logical_offset: 0,
            start_block: 10,
            block_count: 2,
            unwritten: false,
        });
        let b = BmbtRec::pack(Extent {
            logical_offset: 2,
            start_block: 40,
            block_count: 1,
            unwritten: false,
        });
        let mut fork = Vec::new();
        fork.extend_from_slice(&a.to_bytes());
        fork.extend_from_slice(&b.to_bytes());
        // Trailing garbage past the counted records must be ignored.
        fork.extend_from_slice(&[0xFF_u8; 8]);

        let recs = parse_bmbt_records(&fork, 2).expect("records");
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].unpack().start_block, 10);
        assert_eq!(recs[1].unpack().logical_offset, 2);

        assert!(matches!(
            parse_bmbt_records(&fork[..20], 2),
            Err(ParseError::InsufficientData { .. })
        ));
    }

    #[test]
    fn physical_translation_through_geometry() {
        let geo = geometry();
        let ext = Extent {
            logical_offset: 0,
            start_block: (3 << 10) | 17, // AG 3, block 17
            block_count: 1,
            unwritten: false,
        };
        assert_eq!(
            geo.fsblock_to_physical(ext.start_block),
            Some(BlockNumber(3 * 1024 + 17))
        );
        // Physical offsets land inside the image: 4 AGs * 1024 blocks * 4096.
        let byte = geo.fsblock_to_byte(ext.start_block).unwrap();
        assert!(byte.0 < 4 * 1024 * 4096);
    }
}
