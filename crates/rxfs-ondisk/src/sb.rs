//! Superblock decoding and geometry derivation.

use rxfs_types::{
    ensure_slice, read_be_u16, read_be_u32, read_be_u64, read_fixed, read_u8, trim_nul_padded,
    InodeGeometry, InodeNumber, ParseError, XFS_SB_MAGIC, XFS_SB_SIZE,
};
use serde::{Deserialize, Serialize};

/// v4 `sb_versionnum` bit indicating `sb_features2` is valid.
const XFS_SB_VERSION_MOREBITS: u16 = 0x8000;
/// v4 `sb_features2` bit: directory entries carry a file type byte.
const XFS_SB_VERSION2_FTYPE: u32 = 0x0000_0200;
/// v5 `sb_features_incompat` bit: directory entries carry a file type byte.
const XFS_SB_FEAT_INCOMPAT_FTYPE: u32 = 0x0000_0001;

/// Byte offset of `sb_crc` within the superblock sector.
pub const SB_CRC_OFFSET: usize = 0xE0;

/// Decoded XFS superblock.
///
/// Field names follow the on-disk `xfs_sb` with the `sb_` prefix dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    // ── Core geometry ────────────────────────────────────────────────────
    pub block_size: u32,
    pub data_blocks: u64,
    pub ag_blocks: u32,
    pub ag_count: u32,
    pub sector_size: u16,
    pub inode_size: u16,
    pub inodes_per_block: u16,
    pub root_ino: InodeNumber,

    // ── Identity ─────────────────────────────────────────────────────────
    pub magic: u32,
    pub uuid: [u8; 16],
    pub fs_name: String,
    pub version: u16,

    // ── Log2 fields for shift arithmetic ─────────────────────────────────
    pub block_log: u8,
    pub sector_log: u8,
    pub inode_log: u8,
    pub inodes_per_block_log: u8,
    pub ag_block_log: u8,
    pub dir_block_log: u8,

    // ── Usage counters ───────────────────────────────────────────────────
    pub inode_count: u64,
    pub free_inode_count: u64,
    pub free_data_blocks: u64,

    // ── Log device ───────────────────────────────────────────────────────
    pub log_start: u64,
    pub log_blocks: u32,

    // ── State & features ─────────────────────────────────────────────────
    pub in_progress: u8,
    pub features2: u32,
    pub features_compat: u32,
    pub features_ro_compat: u32,
    pub features_incompat: u32,
    pub crc: u32,
}

impl Superblock {
    /// Parse a superblock from a sector-sized region at byte 0 of an AG.
    pub fn parse(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < XFS_SB_SIZE {
            return Err(ParseError::InsufficientData {
                needed: XFS_SB_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_be_u32(region, 0x00)?;
        if magic != XFS_SB_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u64::from(XFS_SB_MAGIC),
                actual: u64::from(magic),
            });
        }

        let block_size = read_be_u32(region, 0x04)?;
        let inode_size = read_be_u16(region, 0x68)?;
        let mut inodes_per_block = read_be_u16(region, 0x6A)?;
        if inodes_per_block == 0 && inode_size != 0 {
            inodes_per_block = u16::try_from(block_size / u32::from(inode_size))
                .map_err(|_| ParseError::IntegerConversion {
                    field: "sb_inopblock",
                })?;
        }

        let ag_blocks = read_be_u32(region, 0x54)?;

        // Derive missing log fields from their linear counterparts; mkfs
        // always writes them but the decoder tolerates zeroed copies.
        let mut block_log = read_u8(region, 0x78)?;
        if block_log == 0 && block_size > 1 {
            block_log = block_size.trailing_zeros() as u8;
        }
        let mut inodes_per_block_log = read_u8(region, 0x7B)?;
        if inodes_per_block_log == 0 && inodes_per_block > 1 {
            inodes_per_block_log = inodes_per_block.trailing_zeros() as u8;
        }
        let mut ag_block_log = read_u8(region, 0x7C)?;
        if ag_block_log == 0 && ag_blocks > 1 {
            ag_block_log = ag_blocks.trailing_zeros() as u8;
        }

        let sb = Self {
            block_size,
            data_blocks: read_be_u64(region, 0x08)?,
            ag_blocks,
            ag_count: read_be_u32(region, 0x58)?,
            sector_size: read_be_u16(region, 0x66)?,
            inode_size,
            inodes_per_block,
            root_ino: InodeNumber(read_be_u64(region, 0x38)?),

            magic,
            uuid: read_fixed::<16>(region, 0x20)?,
            fs_name: trim_nul_padded(&read_fixed::<12>(region, 0x6C)?),
            version: read_be_u16(region, 0x64)?,

            block_log,
            sector_log: read_u8(region, 0x79)?,
            inode_log: read_u8(region, 0x7A)?,
            inodes_per_block_log,
            ag_block_log,
            dir_block_log: read_u8(region, 0xC0)?,

            inode_count: read_be_u64(region, 0x80)?,
            free_inode_count: read_be_u64(region, 0x88)?,
            free_data_blocks: read_be_u64(region, 0x90)?,

            log_start: read_be_u64(region, 0x30)?,
            log_blocks: read_be_u32(region, 0x60)?,

            in_progress: read_u8(region, 0x7E)?,
            features2: read_be_u32(region, 0xC8)?,
            features_compat: read_be_u32(region, 0xD0)?,
            features_ro_compat: read_be_u32(region, 0xD4)?,
            features_incompat: read_be_u32(region, 0xD8)?,
            crc: u32::from_le_bytes(
                ensure_slice(region, SB_CRC_OFFSET, 4)?
                    .try_into()
                    .unwrap_or([0; 4]),
            ),
        };

        sb.validate_geometry()?;
        Ok(sb)
    }

    /// Validate the size/log invariants the address arithmetic relies on.
    pub fn validate_geometry(&self) -> Result<(), ParseError> {
        if !self.block_size.is_power_of_two() || !(512..=65536).contains(&self.block_size) {
            return Err(ParseError::InvalidField {
                field: "sb_blocksize",
                reason: "must be a power of two in 512..=65536",
            });
        }
        if u32::from(self.block_log) >= 32 || self.block_size != 1_u32 << self.block_log {
            return Err(ParseError::InvalidField {
                field: "sb_blocklog",
                reason: "block_size != 1 << block_log",
            });
        }
        if !self.ag_blocks.is_power_of_two() {
            return Err(ParseError::InvalidField {
                field: "sb_agblocks",
                reason: "must be a power of two",
            });
        }
        if u32::from(self.ag_block_log) >= 32 || self.ag_blocks != 1_u32 << self.ag_block_log {
            return Err(ParseError::InvalidField {
                field: "sb_agblklog",
                reason: "ag_blocks != 1 << ag_block_log",
            });
        }
        if !self.inode_size.is_power_of_two() || self.inode_size < 128 {
            return Err(ParseError::InvalidField {
                field: "sb_inodesize",
                reason: "must be a power of two >= 128",
            });
        }
        if u32::from(self.inodes_per_block) != self.block_size / u32::from(self.inode_size) {
            return Err(ParseError::InvalidField {
                field: "sb_inopblock",
                reason: "inodes_per_block != block_size / inode_size",
            });
        }
        if u32::from(self.inodes_per_block_log) >= 32
            || u32::from(self.inodes_per_block) != 1_u32 << self.inodes_per_block_log
        {
            return Err(ParseError::InvalidField {
                field: "sb_inopblog",
                reason: "inodes_per_block != 1 << inodes_per_block_log",
            });
        }
        if u32::from(self.dir_block_log) >= 32
            || u64::from(self.block_size) << self.dir_block_log > u64::from(u32::MAX)
        {
            return Err(ParseError::InvalidField {
                field: "sb_dirblklog",
                reason: "directory block size overflows",
            });
        }
        if self.ag_count == 0 {
            return Err(ParseError::InvalidField {
                field: "sb_agcount",
                reason: "cannot be zero",
            });
        }
        let geo = self.geometry();
        if geo.inode_abs_offset(self.root_ino).is_none() {
            return Err(ParseError::InvalidField {
                field: "sb_rootino",
                reason: "root inode outside AG range",
            });
        }
        Ok(())
    }

    /// On-disk format version (low nibble of `sb_versionnum`).
    #[must_use]
    pub fn version_num(&self) -> u16 {
        self.version & 0x000F
    }

    /// Whether this is a v5 (CRC-bearing) filesystem.
    #[must_use]
    pub fn is_v5(&self) -> bool {
        self.version_num() == 5
    }

    /// Whether directory entries carry a file type byte.
    ///
    /// v5 advertises it through `sb_features_incompat`; v4 through
    /// `sb_features2`, which is only valid when MOREBITS is set.
    #[must_use]
    pub fn has_ftype(&self) -> bool {
        if self.is_v5() {
            (self.features_incompat & XFS_SB_FEAT_INCOMPAT_FTYPE) != 0
        } else {
            (self.version & XFS_SB_VERSION_MOREBITS) != 0
                && (self.features2 & XFS_SB_VERSION2_FTYPE) != 0
        }
    }

    /// The address-arithmetic subset of this superblock.
    #[must_use]
    pub fn geometry(&self) -> InodeGeometry {
        InodeGeometry {
            block_size: self.block_size,
            inode_size: u32::from(self.inode_size),
            ag_blocks: self.ag_blocks,
            ag_count: self.ag_count,
            ag_block_log: self.ag_block_log,
            inodes_per_block_log: self.inodes_per_block_log,
        }
    }

    /// Bytes per AG stride.
    #[must_use]
    pub fn ag_size_bytes(&self) -> u64 {
        u64::from(self.ag_blocks) * u64::from(self.block_size)
    }

    /// Directory block size: `block_size << dir_block_log`.
    #[must_use]
    pub fn dir_block_size(&self) -> u32 {
        self.block_size << self.dir_block_log
    }
}
