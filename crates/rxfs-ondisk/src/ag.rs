//! Allocation group header decoding: AGF, AGI, AGFL.
//!
//! Each AG opens with four sector-sized headers: a superblock copy, the
//! free-space header (AGF), the inode header (AGI), and the free block
//! list (AGFL). The read-only core keeps the fields that allow
//! sanity-checking; inode lookup is direct arithmetic, not a B+tree walk.

use rxfs_types::{
    read_be_u32, read_fixed, ParseError, XFS_AGFL_MAGIC, XFS_AGF_MAGIC, XFS_AGI_MAGIC,
};
use serde::{Deserialize, Serialize};

/// Byte offset of `agf_crc` within the AGF sector.
pub const AGF_CRC_OFFSET: usize = 0xD8;
/// Byte offset of `agi_crc` within the AGI sector.
pub const AGI_CRC_OFFSET: usize = 0x138;
/// Byte offset of `agfl_crc` within a v5 AGFL sector.
pub const AGFL_CRC_OFFSET: usize = 0x20;

/// Free-space header (AGF), sector 1 of each AG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agf {
    pub version: u32,
    pub seq_no: u32,
    pub length: u32,
    pub bno_root: u32,
    pub cnt_root: u32,
    pub bno_level: u32,
    pub cnt_level: u32,
    pub fl_first: u32,
    pub fl_last: u32,
    pub fl_count: u32,
    pub free_blocks: u32,
    pub longest_free: u32,
}

impl Agf {
    /// Parse an AGF sector. `expected_seq` is the AG index.
    pub fn parse(region: &[u8], expected_seq: u32) -> Result<Self, ParseError> {
        let magic = read_be_u32(region, 0x00)?;
        if magic != XFS_AGF_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(XFS_AGF_MAGIC),
                actual: u64::from(magic),
            });
        }

        let agf = Self {
            version: read_be_u32(region, 0x04)?,
            seq_no: read_be_u32(region, 0x08)?,
            length: read_be_u32(region, 0x0C)?,
            bno_root: read_be_u32(region, 0x10)?,
            cnt_root: read_be_u32(region, 0x14)?,
            bno_level: read_be_u32(region, 0x1C)?,
            cnt_level: read_be_u32(region, 0x20)?,
            fl_first: read_be_u32(region, 0x28)?,
            fl_last: read_be_u32(region, 0x2C)?,
            fl_count: read_be_u32(region, 0x30)?,
            free_blocks: read_be_u32(region, 0x34)?,
            longest_free: read_be_u32(region, 0x38)?,
        };

        if agf.seq_no != expected_seq {
            return Err(ParseError::InvalidField {
                field: "agf_seqno",
                reason: "sequence number does not match AG index",
            });
        }
        Ok(agf)
    }
}

/// Inode header (AGI), sector 2 of each AG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agi {
    pub version: u32,
    pub seq_no: u32,
    pub length: u32,
    pub inode_count: u32,
    pub inobt_root: u32,
    pub inobt_level: u32,
    pub free_count: u32,
    pub new_ino: u32,
    pub dir_ino: u32,
}

impl Agi {
    /// Parse an AGI sector. `expected_seq` is the AG index.
    pub fn parse(region: &[u8], expected_seq: u32) -> Result<Self, ParseError> {
        let magic = read_be_u32(region, 0x00)?;
        if magic != XFS_AGI_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(XFS_AGI_MAGIC),
                actual: u64::from(magic),
            });
        }

        let agi = Self {
            version: read_be_u32(region, 0x04)?,
            seq_no: read_be_u32(region, 0x08)?,
            length: read_be_u32(region, 0x0C)?,
            inode_count: read_be_u32(region, 0x10)?,
            inobt_root: read_be_u32(region, 0x14)?,
            inobt_level: read_be_u32(region, 0x18)?,
            free_count: read_be_u32(region, 0x1C)?,
            new_ino: read_be_u32(region, 0x20)?,
            dir_ino: read_be_u32(region, 0x24)?,
        };

        if agi.seq_no != expected_seq {
            return Err(ParseError::InvalidField {
                field: "agi_seqno",
                reason: "sequence number does not match AG index",
            });
        }
        Ok(agi)
    }
}

/// Free block list (AGFL), sector 3 of each AG.
///
/// v5 sectors carry a magic/sequence/UUID header before the block array;
/// v4 is the bare array. Both decode to the list of free block numbers,
/// bounded by the AGF's `fl_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agfl {
    pub seq_no: Option<u32>,
    pub free_list: Vec<u32>,
}

impl Agfl {
    /// Parse an AGFL sector. `fl_count` bounds the list (from the AGF).
    pub fn parse(region: &[u8], fl_count: u32) -> Result<Self, ParseError> {
        let magic = read_be_u32(region, 0x00)?;
        let (seq_no, list_start) = if magic == XFS_AGFL_MAGIC {
            let seq = read_be_u32(region, 0x04)?;
            let _uuid = read_fixed::<16>(region, 0x08)?;
            (Some(seq), 0x24_usize)
        } else {
            (None, 0_usize)
        };

        let avail = region.len().saturating_sub(list_start) / 4;
        let count = (fl_count as usize).min(avail);
        let mut free_list = Vec::with_capacity(count);
        for i in 0..count {
            free_list.push(read_be_u32(region, list_start + i * 4)?);
        }

        Ok(Self { seq_no, free_list })
    }
}
