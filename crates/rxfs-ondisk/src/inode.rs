//! Inode decoding and data-fork dispatch.
//!
//! An inode is `inode_size` bytes: a fixed core (96 bytes for v1/v2 plus
//! the 4-byte `next_unlinked` pointer, 176 bytes for v3) followed by the
//! data fork and, when `forkoff` is set, the attribute fork. Only the data
//! fork is decoded; the attribute fork is identified and skipped.

use crate::dir2::ShortFormDir;
use crate::extent::{parse_bmbt_records, BmbtRec};
use rxfs_error::{Result, RxfsError};
use rxfs_types::{
    ensure_slice, read_be_u16, read_be_u32, read_be_u64, read_u8, u64_to_usize, InodeNumber,
    ParseError, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG, XFS_DINODE_MAGIC,
};
use serde::{Deserialize, Serialize};

/// Data fork starts here for v1/v2 inodes (core + `next_unlinked`).
const DINODE_V2_SIZE: usize = 0x64;
/// Data fork starts here for v3 inodes.
const DINODE_V3_SIZE: usize = 0xB0;

/// Byte offset of the little-endian `di_crc` in a v3 inode.
pub const DINODE_CRC_OFFSET: usize = 0x64;

/// Data fork format discriminant (`di_format`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DinodeFormat {
    Dev = 0,
    Local = 1,
    Extents = 2,
    Btree = 3,
    Uuid = 4,
}

impl DinodeFormat {
    /// Decode `di_format`; unknown values are format violations.
    pub fn from_raw(raw: u8) -> std::result::Result<Self, ParseError> {
        match raw {
            0 => Ok(Self::Dev),
            1 => Ok(Self::Local),
            2 => Ok(Self::Extents),
            3 => Ok(Self::Btree),
            4 => Ok(Self::Uuid),
            _ => Err(ParseError::InvalidField {
                field: "di_format",
                reason: "unknown data fork format",
            }),
        }
    }
}

/// The fixed inode header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeCore {
    pub mode: u16,
    pub version: u8,
    pub format: DinodeFormat,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub atime: (u32, u32),
    pub mtime: (u32, u32),
    pub ctime: (u32, u32),
    pub size: u64,
    pub nblocks: u64,
    pub nextents: u32,
    pub anextents: u16,
    pub fork_offset: u8,
    pub flags: u16,
    pub gen: u32,
    /// v3 only: creation time.
    pub crtime: Option<(u32, u32)>,
    /// v3 only: the inode's self-identifying number.
    pub ino: Option<u64>,
}

impl InodeCore {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Modification time as UNIX seconds.
    #[must_use]
    pub fn mtime_secs(&self) -> i64 {
        i64::from(self.mtime.0)
    }
}

/// Decoded data fork, keyed off `(file type, format)`.
///
/// Exactly one payload shape exists per readable inode; unsupported
/// combinations are carried as a variant and only become an error when a
/// caller demands the missing decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFork {
    /// Short-form directory stored inline.
    Directory(ShortFormDir),
    /// Directory whose blocks are reached through extent records.
    DirectoryExtents(Vec<BmbtRec>),
    /// Regular file mapped by extent records.
    RegularExtents(Vec<BmbtRec>),
    /// Symlink target stored inline.
    SymlinkLocal(Vec<u8>),
    /// Anything this core does not decode (B+tree forks, inline regular
    /// files, device nodes).
    Unsupported { detail: String },
}

/// A fully decoded inode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub ino: InodeNumber,
    pub core: InodeCore,
    pub data_fork: DataFork,
}

impl Inode {
    /// Decode an inode from its raw `inode_size` bytes.
    ///
    /// `has_ftype` is the superblock's directory-ftype feature bit; it
    /// changes short-form entry layout. v3 inodes carry their own number,
    /// which is checked against `ino`.
    pub fn parse(raw: &[u8], ino: InodeNumber, has_ftype: bool) -> Result<Self> {
        let core = parse_core(raw, ino)?;
        let fork_region = data_fork_region(raw, &core, ino)?;
        let data_fork = dispatch_fork(&core, fork_region, ino, has_ftype)?;
        Ok(Self {
            ino,
            core,
            data_fork,
        })
    }

    /// The directory extent records, or `UnsupportedInodeFormat`.
    pub fn directory_extents(&self) -> Result<&[BmbtRec]> {
        match &self.data_fork {
            DataFork::DirectoryExtents(recs) => Ok(recs),
            _ => Err(self.unsupported("directory extent list")),
        }
    }

    /// The regular-file extent records, or `UnsupportedInodeFormat`.
    pub fn regular_extents(&self) -> Result<&[BmbtRec]> {
        match &self.data_fork {
            DataFork::RegularExtents(recs) => Ok(recs),
            _ => Err(self.unsupported("regular file extent list")),
        }
    }

    fn unsupported(&self, wanted: &str) -> RxfsError {
        let detail = match &self.data_fork {
            DataFork::Unsupported { detail } => detail.clone(),
            other => format!("{wanted} requested but fork is {}", fork_name(other)),
        };
        RxfsError::UnsupportedInodeFormat {
            ino: self.ino.0,
            detail,
        }
    }
}

fn fork_name(fork: &DataFork) -> &'static str {
    match fork {
        DataFork::Directory(_) => "short-form directory",
        DataFork::DirectoryExtents(_) => "directory extents",
        DataFork::RegularExtents(_) => "regular extents",
        DataFork::SymlinkLocal(_) => "local symlink",
        DataFork::Unsupported { .. } => "unsupported",
    }
}

fn corrupt(ino: InodeNumber, detail: impl Into<String>) -> RxfsError {
    RxfsError::CorruptInode {
        ino: ino.0,
        detail: detail.into(),
    }
}

fn parse_core(raw: &[u8], ino: InodeNumber) -> Result<InodeCore> {
    let magic = read_be_u16(raw, 0x00).map_err(RxfsError::from)?;
    if magic != XFS_DINODE_MAGIC {
        return Err(corrupt(ino, format!("bad inode magic {magic:#06x}")));
    }

    let version = read_u8(raw, 0x04).map_err(RxfsError::from)?;
    if !(1..=3).contains(&version) {
        return Err(corrupt(ino, format!("unknown inode version {version}")));
    }

    let format = DinodeFormat::from_raw(read_u8(raw, 0x05).map_err(RxfsError::from)?)
        .map_err(RxfsError::from)?;

    // v1 counts links in the 16-bit `onlink`; v2+ in the 32-bit `nlink`.
    let nlink = if version == 1 {
        u32::from(read_be_u16(raw, 0x06).map_err(RxfsError::from)?)
    } else {
        read_be_u32(raw, 0x10).map_err(RxfsError::from)?
    };

    let timestamp = |off: usize| -> Result<(u32, u32)> {
        Ok((
            read_be_u32(raw, off).map_err(RxfsError::from)?,
            read_be_u32(raw, off + 4).map_err(RxfsError::from)?,
        ))
    };

    let (crtime, self_ino) = if version == 3 {
        if raw.len() < DINODE_V3_SIZE {
            return Err(corrupt(ino, "v3 inode shorter than its core"));
        }
        (
            Some(timestamp(0x90)?),
            Some(read_be_u64(raw, 0x98).map_err(RxfsError::from)?),
        )
    } else {
        (None, None)
    };

    if let Some(self_ino) = self_ino {
        if self_ino != ino.0 {
            return Err(corrupt(
                ino,
                format!("v3 self-check mismatch: inode records {self_ino}"),
            ));
        }
    }

    Ok(InodeCore {
        mode: read_be_u16(raw, 0x02).map_err(RxfsError::from)?,
        version,
        format,
        uid: read_be_u32(raw, 0x08).map_err(RxfsError::from)?,
        gid: read_be_u32(raw, 0x0C).map_err(RxfsError::from)?,
        nlink,
        atime: timestamp(0x20)?,
        mtime: timestamp(0x28)?,
        ctime: timestamp(0x30)?,
        size: read_be_u64(raw, 0x38).map_err(RxfsError::from)?,
        nblocks: read_be_u64(raw, 0x40).map_err(RxfsError::from)?,
        nextents: read_be_u32(raw, 0x4C).map_err(RxfsError::from)?,
        anextents: read_be_u16(raw, 0x50).map_err(RxfsError::from)?,
        fork_offset: read_u8(raw, 0x52).map_err(RxfsError::from)?,
        flags: read_be_u16(raw, 0x5A).map_err(RxfsError::from)?,
        gen: read_be_u32(raw, 0x5C).map_err(RxfsError::from)?,
        crtime,
        ino: self_ino,
    })
}

/// Slice the data fork out of the raw inode.
///
/// `fork_offset` counts 8-byte units from the start of the data fork to
/// the attribute fork; zero means the data fork runs to the inode's end.
fn data_fork_region<'a>(raw: &'a [u8], core: &InodeCore, ino: InodeNumber) -> Result<&'a [u8]> {
    let start = if core.version == 3 {
        DINODE_V3_SIZE
    } else {
        DINODE_V2_SIZE
    };
    let end = if core.fork_offset == 0 {
        raw.len()
    } else {
        start + usize::from(core.fork_offset) * 8
    };
    if end > raw.len() || start > end {
        return Err(corrupt(ino, "data fork extends beyond inode"));
    }
    ensure_slice(raw, start, end - start).map_err(RxfsError::from)
}

fn dispatch_fork(
    core: &InodeCore,
    fork: &[u8],
    ino: InodeNumber,
    has_ftype: bool,
) -> Result<DataFork> {
    let fork_kind = (core.mode & S_IFMT, core.format);
    Ok(match fork_kind {
        (S_IFDIR, DinodeFormat::Local) => {
            let dir = ShortFormDir::parse(fork, has_ftype)
                .map_err(|e| corrupt(ino, format!("short-form directory: {e}")))?;
            DataFork::Directory(dir)
        }
        (S_IFDIR, DinodeFormat::Extents) => {
            DataFork::DirectoryExtents(parse_bmbt_records(fork, core.nextents)?)
        }
        (S_IFREG, DinodeFormat::Extents) => {
            DataFork::RegularExtents(parse_bmbt_records(fork, core.nextents)?)
        }
        (S_IFLNK, DinodeFormat::Local) => {
            let len = u64_to_usize(core.size, "di_size").map_err(RxfsError::from)?;
            if len > fork.len() {
                return Err(corrupt(ino, "symlink target longer than data fork"));
            }
            DataFork::SymlinkLocal(fork[..len].to_vec())
        }
        (S_IFREG, DinodeFormat::Local) => DataFork::Unsupported {
            detail: "inline regular file data".to_owned(),
        },
        (_, DinodeFormat::Btree) => DataFork::Unsupported {
            detail: "B+tree data fork".to_owned(),
        },
        _ => DataFork::Unsupported {
            detail: format!(
                "file type {:#o} with format {:?}",
                core.mode & S_IFMT,
                core.format
            ),
        },
    })
}

// ── Fixture assembly (used by tests across the workspace) ───────────────────

/// Serialize a v3 inode for fixtures: core fields plus a raw data fork.
#[must_use]
pub fn build_v3_inode(
    ino: InodeNumber,
    mode: u16,
    format: DinodeFormat,
    size: u64,
    nextents: u32,
    mtime: u32,
    data_fork: &[u8],
    inode_size: usize,
) -> Vec<u8> {
    let mut raw = vec![0_u8; inode_size];
    raw[0x00..0x02].copy_from_slice(&XFS_DINODE_MAGIC.to_be_bytes());
    raw[0x02..0x04].copy_from_slice(&mode.to_be_bytes());
    raw[0x04] = 3; // version
    raw[0x05] = format as u8;
    raw[0x10..0x14].copy_from_slice(&1_u32.to_be_bytes()); // nlink
    raw[0x28..0x2C].copy_from_slice(&mtime.to_be_bytes());
    raw[0x38..0x40].copy_from_slice(&size.to_be_bytes());
    raw[0x4C..0x50].copy_from_slice(&nextents.to_be_bytes());
    raw[0x98..0xA0].copy_from_slice(&ino.0.to_be_bytes());
    let fork_end = DINODE_V3_SIZE + data_fork.len();
    raw[DINODE_V3_SIZE..fork_end].copy_from_slice(data_fork);
    raw
}
