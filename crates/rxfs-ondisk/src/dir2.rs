//! Directory entry decoding: short-form (inline) and dir2 data blocks.

use rxfs_error::{Result, RxfsError};
use rxfs_types::{ensure_slice, read_be_u16, read_be_u32, read_be_u64, read_u8, ParseError};
use serde::{Deserialize, Serialize};

/// v5 data block magic: "XDD3".
pub const XFS_DIR3_DATA_MAGIC: u32 = 0x5844_4433;
/// v5 single-block directory magic: "XDB3".
pub const XFS_DIR3_BLOCK_MAGIC: u32 = 0x5844_4233;
/// v5 free-index block magic: "XDF3".
pub const XFS_DIR3_FREE_MAGIC: u32 = 0x5844_4633;
/// Pre-v5 data block magic: "XD2D".
pub const XFS_DIR2_DATA_MAGIC: u32 = 0x5844_3244;
/// Pre-v5 single-block directory magic: "XD2B".
pub const XFS_DIR2_BLOCK_MAGIC: u32 = 0x5844_3242;
/// Pre-v5 free-index block magic: "XD2F".
pub const XFS_DIR2_FREE_MAGIC: u32 = 0x5844_3246;

/// Freetag marking an unused region inside a data block.
const XFS_DIR2_DATA_FREE_TAG: u16 = 0xFFFF;

/// v5 data/block header size (blk_hdr + bestfree + pad).
const DIR3_DATA_HDR_SIZE: usize = 64;
/// Pre-v5 data/block header size (magic + bestfree).
const DIR2_DATA_HDR_SIZE: usize = 16;

/// Block-tail size for single-block directories (count + stale).
const DIR2_BLOCK_TAIL_SIZE: usize = 8;
/// Size of one trailing leaf entry (hash + address).
const DIR2_LEAF_ENTRY_SIZE: usize = 8;

// ── Short form ──────────────────────────────────────────────────────────────

/// One short-form directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SfEntry {
    pub name: Vec<u8>,
    pub inumber: u64,
    pub ftype: Option<u8>,
}

impl SfEntry {
    /// Entry name as a UTF-8 string (lossy).
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// A short-form directory stored inline in the inode's data fork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortFormDir {
    pub parent: u64,
    pub entries: Vec<SfEntry>,
}

impl ShortFormDir {
    /// Parse a short-form directory from the inode's data fork.
    ///
    /// The header's `i8count` decides inode-number width for the parent
    /// pointer and every entry; reading it wrong shifts every later field,
    /// so it is resolved once up front.
    pub fn parse(fork: &[u8], has_ftype: bool) -> std::result::Result<Self, ParseError> {
        let count = read_u8(fork, 0)?;
        let i8count = read_u8(fork, 1)?;
        let wide_inumbers = i8count != 0;

        let (parent, mut offset) = if wide_inumbers {
            (read_be_u64(fork, 2)?, 10_usize)
        } else {
            (u64::from(read_be_u32(fork, 2)?), 6_usize)
        };

        let mut entries = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let namelen = usize::from(read_u8(fork, offset)?);
            if namelen == 0 {
                return Err(ParseError::InvalidField {
                    field: "sf_namelen",
                    reason: "zero-length name",
                });
            }
            let _tag = read_be_u16(fork, offset + 1)?;
            let name = ensure_slice(fork, offset + 3, namelen)?.to_vec();
            offset += 3 + namelen;

            let ftype = if has_ftype {
                let ft = read_u8(fork, offset)?;
                offset += 1;
                Some(ft)
            } else {
                None
            };

            let inumber = if wide_inumbers {
                let ino = read_be_u64(fork, offset)?;
                offset += 8;
                ino
            } else {
                let ino = u64::from(read_be_u32(fork, offset)?);
                offset += 4;
                ino
            };

            entries.push(SfEntry {
                name,
                inumber,
                ftype,
            });
        }

        Ok(Self { parent, entries })
    }
}

// ── Data blocks ─────────────────────────────────────────────────────────────

/// One active entry from a dir2 data block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirDataEntry {
    pub name: Vec<u8>,
    pub inumber: u64,
    pub ftype: Option<u8>,
}

impl DirDataEntry {
    /// Entry name as a UTF-8 string (lossy).
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Header variants a data block can open with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirBlockVariant {
    /// Entries run to the end of the block.
    Data { hdr_size: usize },
    /// Entries stop before the trailing leaf array + tail.
    Block { hdr_size: usize },
    /// Free-index block: recognized, contributes no entries.
    Free,
}

fn classify_magic(magic: u32) -> Option<DirBlockVariant> {
    match magic {
        XFS_DIR3_DATA_MAGIC => Some(DirBlockVariant::Data {
            hdr_size: DIR3_DATA_HDR_SIZE,
        }),
        XFS_DIR3_BLOCK_MAGIC => Some(DirBlockVariant::Block {
            hdr_size: DIR3_DATA_HDR_SIZE,
        }),
        XFS_DIR2_DATA_MAGIC => Some(DirBlockVariant::Data {
            hdr_size: DIR2_DATA_HDR_SIZE,
        }),
        XFS_DIR2_BLOCK_MAGIC => Some(DirBlockVariant::Block {
            hdr_size: DIR2_DATA_HDR_SIZE,
        }),
        XFS_DIR3_FREE_MAGIC | XFS_DIR2_FREE_MAGIC => Some(DirBlockVariant::Free),
        _ => None,
    }
}

/// Parse one directory-block-sized chunk into its active entries.
///
/// Unused regions are tagged `0xFFFF` followed by their length and are
/// skipped. Single-block directories end with a leaf array and tail that
/// bound the scan. A magic outside the recognized set returns the
/// `UnsupportedDirBlockHeader` sentinel for the caller to downgrade.
pub fn parse_data_block(block: &[u8], has_ftype: bool) -> Result<Vec<DirDataEntry>> {
    let magic = read_be_u32(block, 0).map_err(RxfsError::from)?;
    let variant = classify_magic(magic).ok_or(RxfsError::UnsupportedDirBlockHeader { magic })?;

    let (hdr_size, scan_end) = match variant {
        DirBlockVariant::Free => return Ok(Vec::new()),
        DirBlockVariant::Data { hdr_size } => (hdr_size, block.len()),
        DirBlockVariant::Block { hdr_size } => {
            if block.len() < DIR2_BLOCK_TAIL_SIZE {
                return Err(corrupt("block too small for tail"));
            }
            let tail_count =
                read_be_u32(block, block.len() - DIR2_BLOCK_TAIL_SIZE).map_err(RxfsError::from)?;
            let leaf_bytes = (tail_count as usize)
                .checked_mul(DIR2_LEAF_ENTRY_SIZE)
                .and_then(|leaf| leaf.checked_add(DIR2_BLOCK_TAIL_SIZE))
                .ok_or_else(|| corrupt("leaf count overflow"))?;
            let scan_end = block
                .len()
                .checked_sub(leaf_bytes)
                .ok_or_else(|| corrupt("leaf area larger than block"))?;
            (hdr_size, scan_end)
        }
    };

    if scan_end < hdr_size {
        return Err(corrupt("entry area smaller than header"));
    }

    let mut entries = Vec::new();
    let mut offset = hdr_size;
    while offset + 2 <= scan_end {
        let freetag = read_be_u16(block, offset).map_err(RxfsError::from)?;
        if freetag == XFS_DIR2_DATA_FREE_TAG {
            let length = usize::from(read_be_u16(block, offset + 2).map_err(RxfsError::from)?);
            if length < 4 {
                return Err(corrupt("unused region shorter than its header"));
            }
            offset += length;
            continue;
        }

        // Active entry: inumber(8), namelen(1), name, [ftype], pad+tag.
        let inumber = read_be_u64(block, offset).map_err(RxfsError::from)?;
        let namelen = usize::from(read_u8(block, offset + 8).map_err(RxfsError::from)?);
        if namelen == 0 {
            return Err(corrupt("zero-length entry name"));
        }
        let name = ensure_slice(block, offset + 9, namelen)
            .map_err(RxfsError::from)?
            .to_vec();

        let mut fixed = 8 + 1 + namelen;
        let ftype = if has_ftype {
            let ft = read_u8(block, offset + fixed).map_err(RxfsError::from)?;
            fixed += 1;
            Some(ft)
        } else {
            None
        };

        // Entry size rounds 8+1+namelen[+ftype]+tag up to 8-byte alignment.
        let entry_size = (fixed + 2 + 7) & !7;
        let entry_end = offset
            .checked_add(entry_size)
            .ok_or_else(|| corrupt("entry size overflow"))?;
        if entry_end > scan_end {
            return Err(corrupt("entry extends past entry area"));
        }

        entries.push(DirDataEntry {
            name,
            inumber,
            ftype,
        });
        offset = entry_end;
    }

    Ok(entries)
}

fn corrupt(detail: &str) -> RxfsError {
    RxfsError::CorruptDirBlock {
        detail: detail.to_owned(),
    }
}

// ── Fixture assembly (used by tests across the workspace) ───────────────────

/// Append one active data-block entry to `buf` in on-disk form.
///
/// The tag written is the entry's offset within the block, as mkfs does.
pub fn append_data_entry(buf: &mut Vec<u8>, name: &[u8], inumber: u64, ftype: Option<u8>) {
    let start = buf.len();
    buf.extend_from_slice(&inumber.to_be_bytes());
    buf.push(u8::try_from(name.len()).unwrap_or(u8::MAX));
    buf.extend_from_slice(name);
    if let Some(ft) = ftype {
        buf.push(ft);
    }
    let fixed = buf.len() - start;
    let entry_size = (fixed + 2 + 7) & !7;
    buf.resize(start + entry_size - 2, 0);
    buf.extend_from_slice(&u16::try_from(start).unwrap_or(u16::MAX).to_be_bytes());
}

/// Append an unused region of `length` bytes (including its 4-byte header).
pub fn append_unused(buf: &mut Vec<u8>, length: u16) {
    let start = buf.len();
    buf.extend_from_slice(&XFS_DIR2_DATA_FREE_TAG.to_be_bytes());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.resize(start + usize::from(length), 0);
}
