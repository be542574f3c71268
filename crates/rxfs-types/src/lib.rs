#![forbid(unsafe_code)]
//! Shared types for RXFS.
//!
//! Newtype wrappers for on-disk quantities, big-endian read helpers, and
//! the `ParseError` type used by every decoder in the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Superblock magic: "XFSB".
pub const XFS_SB_MAGIC: u32 = 0x5846_5342;
/// AGF header magic: "XAGF".
pub const XFS_AGF_MAGIC: u32 = 0x5841_4746;
/// AGI header magic: "XAGI".
pub const XFS_AGI_MAGIC: u32 = 0x5841_4749;
/// AGFL header magic (v5 only): "XAFL".
pub const XFS_AGFL_MAGIC: u32 = 0x5841_464C;
/// Inode magic: "IN".
pub const XFS_DINODE_MAGIC: u16 = 0x494E;

/// Sector-sized region at byte 0 holding the superblock.
pub const XFS_SB_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgNumber(pub u32);

/// Absolute (filesystem-wide) block number, already unpacked from AG form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

/// Absolute inode number packing `(ag, ag_block, slot)` per the superblock logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u64);

/// Byte offset on a `ByteDevice` (pread semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteOffset(pub u64);

impl ByteOffset {
    pub const ZERO: Self = Self(0);

    /// Add a byte count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, bytes: u64) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }

    /// Multiply by a scalar, returning `None` on overflow.
    #[must_use]
    pub fn checked_mul(self, factor: u64) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// Narrow to `usize`, returning `ParseError::IntegerConversion` on overflow.
    pub fn to_usize(self) -> Result<usize, ParseError> {
        usize::try_from(self.0).map_err(|_| ParseError::IntegerConversion {
            field: "byte_offset",
        })
    }
}

/// Validated filesystem block size (power of two in 512..=65536).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockSize(u32);

impl BlockSize {
    /// Create a `BlockSize` if `value` is a power of two in [512, 65536].
    pub fn new(value: u32) -> Result<Self, ParseError> {
        if !value.is_power_of_two() || !(512..=65536).contains(&value) {
            return Err(ParseError::InvalidField {
                field: "block_size",
                reason: "must be power of two in 512..=65536",
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Number of bits to shift to convert between bytes and blocks.
    #[must_use]
    pub fn shift(self) -> u32 {
        self.0.trailing_zeros()
    }

    /// Convert a block number to a byte offset, `None` on overflow.
    #[must_use]
    pub fn block_to_byte(self, block: BlockNumber) -> Option<ByteOffset> {
        block.0.checked_mul(u64::from(self.0)).map(ByteOffset)
    }
}

impl fmt::Display for AgNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Inode number packing ────────────────────────────────────────────────────
//
// An absolute inode number packs (ag, ag_block, slot) using the superblock's
// base-2 logs. The geometry needed for the arithmetic travels as a small
// copyable struct so decoders below the superblock don't need the whole thing.

/// The subset of superblock geometry needed for address arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeGeometry {
    pub block_size: u32,
    pub inode_size: u32,
    pub ag_blocks: u32,
    pub ag_count: u32,
    pub ag_block_log: u8,
    pub inodes_per_block_log: u8,
}

/// An inode number split into its addressing components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeLocation {
    pub ag: AgNumber,
    pub ag_block: u64,
    pub slot: u64,
}

impl InodeGeometry {
    /// Split an absolute inode number into `(ag, ag_block, slot)`.
    #[must_use]
    pub fn split_ino(&self, ino: InodeNumber) -> InodeLocation {
        let ipb_log = u32::from(self.inodes_per_block_log);
        let agb_log = u32::from(self.ag_block_log);
        let slot = ino.0 & ((1_u64 << ipb_log) - 1);
        let ag_block = (ino.0 >> ipb_log) & ((1_u64 << agb_log) - 1);
        let ag = ino.0 >> (ipb_log + agb_log);
        InodeLocation {
            ag: AgNumber(u32::try_from(ag).unwrap_or(u32::MAX)),
            ag_block,
            slot,
        }
    }

    /// Absolute byte offset of an inode, `None` on overflow or when the
    /// inode lands outside the AG range.
    #[must_use]
    pub fn inode_abs_offset(&self, ino: InodeNumber) -> Option<ByteOffset> {
        let loc = self.split_ino(ino);
        if loc.ag.0 >= self.ag_count {
            return None;
        }
        let abs_block = u64::from(loc.ag.0)
            .checked_mul(u64::from(self.ag_blocks))?
            .checked_add(loc.ag_block)?;
        let block_bytes = abs_block.checked_mul(u64::from(self.block_size))?;
        let slot_bytes = loc.slot.checked_mul(u64::from(self.inode_size))?;
        block_bytes.checked_add(slot_bytes).map(ByteOffset)
    }

    /// Unpack a packed filesystem block number into `(ag, ag_block)`.
    ///
    /// Extent records carry block numbers with the AG index in the upper
    /// bits; the split uses `ag_block_log`, not plain division, because
    /// `ag_blocks` need not be a power of two.
    #[must_use]
    pub fn split_fsblock(&self, fsblock: u64) -> (AgNumber, u64) {
        let agb_log = u32::from(self.ag_block_log);
        let ag = fsblock >> agb_log;
        let ag_block = fsblock & ((1_u64 << agb_log) - 1);
        (AgNumber(u32::try_from(ag).unwrap_or(u32::MAX)), ag_block)
    }

    /// Translate a packed filesystem block number to an absolute block.
    #[must_use]
    pub fn fsblock_to_physical(&self, fsblock: u64) -> Option<BlockNumber> {
        let (ag, ag_block) = self.split_fsblock(fsblock);
        u64::from(ag.0)
            .checked_mul(u64::from(self.ag_blocks))?
            .checked_add(ag_block)
            .map(BlockNumber)
    }

    /// Byte offset of a packed filesystem block number.
    #[must_use]
    pub fn fsblock_to_byte(&self, fsblock: u64) -> Option<ByteOffset> {
        let phys = self.fsblock_to_physical(fsblock)?;
        phys.0.checked_mul(u64::from(self.block_size)).map(ByteOffset)
    }

    /// Byte offset of the start of an AG.
    #[must_use]
    pub fn ag_byte_offset(&self, ag: AgNumber) -> Option<ByteOffset> {
        u64::from(ag.0)
            .checked_mul(u64::from(self.ag_blocks))?
            .checked_mul(u64::from(self.block_size))
            .map(ByteOffset)
    }
}

// ── Parse errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u64, actual: u64 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

// ── Big-endian read helpers ─────────────────────────────────────────────────
//
// XFS stores every multi-byte integer big-endian on disk.

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_be_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_be_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_be_u64(data: &[u8], offset: usize) -> Result<u64, ParseError> {
    let bytes = ensure_slice(data, offset, 8)?;
    Ok(u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    Ok(ensure_slice(data, offset, 1)?[0])
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Render a NUL-padded fixed byte field as a trimmed string.
#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_owned()
}

/// Narrow a `u64` to `usize` with an explicit error path.
pub fn u64_to_usize(value: u64, field: &'static str) -> Result<usize, ParseError> {
    usize::try_from(value).map_err(|_| ParseError::IntegerConversion { field })
}

// ── POSIX file mode constants ───────────────────────────────────────────────

/// File type mask (upper 4 bits of mode).
pub const S_IFMT: u16 = 0o170_000;
/// Named pipe (FIFO).
pub const S_IFIFO: u16 = 0o010_000;
/// Character device.
pub const S_IFCHR: u16 = 0o020_000;
/// Directory.
pub const S_IFDIR: u16 = 0o040_000;
/// Block device.
pub const S_IFBLK: u16 = 0o060_000;
/// Regular file.
pub const S_IFREG: u16 = 0o100_000;
/// Symbolic link.
pub const S_IFLNK: u16 = 0o120_000;
/// Socket.
pub const S_IFSOCK: u16 = 0o140_000;
