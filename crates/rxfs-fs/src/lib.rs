#![forbid(unsafe_code)]
//! Read-only XFS filesystem facade.
//!
//! Composes the block layer and on-disk decoders into path lookup,
//! directory listing, file open, and buffered read. Every operation
//! re-walks from the root inode; nothing is cached between calls, which
//! keeps the facade trivially correct against an unchanging image.

use rxfs_block::{ByteDevice, FileByteDevice};
use rxfs_error::{Result, RxfsError};
use rxfs_ondisk::ag::{AGF_CRC_OFFSET, AGI_CRC_OFFSET};
use rxfs_ondisk::sb::SB_CRC_OFFSET;
use rxfs_ondisk::{
    parse_data_block, verify_region_crc, Agf, Agfl, Agi, DataFork, Inode, Superblock,
};
use rxfs_types::{AgNumber, ByteOffset, InodeGeometry, InodeNumber};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Decoded header cluster at the start of one allocation group.
#[derive(Debug, Clone)]
pub struct AllocationGroup {
    pub index: AgNumber,
    pub superblock: Superblock,
    pub agf: Agf,
    pub agi: Agi,
    pub agfl: Agfl,
}

/// Metadata for one directory entry or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub ino: u64,
    pub size: u64,
    pub mtime: i64,
    pub mode: u16,
    pub is_dir: bool,
}

/// One entry from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub info: FileInfo,
}

impl DirEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.info.is_dir
    }
}

/// An open file: metadata plus a fully materialised content buffer.
///
/// The buffer never re-enters the byte device, so any number of open files
/// can be read in any order. Dropping the file releases the buffer.
#[derive(Debug)]
pub struct File {
    info: FileInfo,
    buffer: Vec<u8>,
    pos: usize,
}

impl File {
    #[must_use]
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.info.size
    }

    #[must_use]
    pub fn mtime(&self) -> i64 {
        self.info.mtime
    }

    #[must_use]
    pub fn mode(&self) -> u16 {
        self.info.mode
    }

    /// Drain up to `buf.len()` bytes into `buf`; returns 0 at EOF.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.buffer.len() - self.pos;
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    /// The file's full contents, consuming the handle.
    #[must_use]
    pub fn into_contents(self) -> Vec<u8> {
        self.buffer
    }
}

/// Read-only view over one XFS image.
pub struct XfsFilesystem {
    dev: Box<dyn ByteDevice>,
    sb: Superblock,
    geo: InodeGeometry,
    has_ftype: bool,
    ags: Vec<AllocationGroup>,
}

impl std::fmt::Debug for XfsFilesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XfsFilesystem")
            .field("sb", &self.sb)
            .field("geo", &self.geo)
            .field("has_ftype", &self.has_ftype)
            .field("ags", &self.ags)
            .finish()
    }
}

impl XfsFilesystem {
    /// Open an image from any byte device.
    ///
    /// Decodes the primary superblock, then every AG header cluster at its
    /// strided offset. v5 CRC mismatches are logged, not fatal.
    pub fn open(dev: impl ByteDevice + 'static) -> Result<Self> {
        let dev: Box<dyn ByteDevice> = Box::new(dev);

        let region = dev.read_at_vec(ByteOffset::ZERO, rxfs_types::XFS_SB_SIZE)?;
        let sb = Superblock::parse(&region).map_err(|e| RxfsError::CorruptSuperblock {
            detail: e.to_string(),
        })?;
        if sb.is_v5() && !verify_region_crc(&region, SB_CRC_OFFSET) {
            warn!(target: "rxfs::fs", "superblock CRC mismatch, continuing read-only");
        }

        let geo = sb.geometry();
        let has_ftype = sb.has_ftype();

        let mut ags = Vec::with_capacity(sb.ag_count as usize);
        for index in 0..sb.ag_count {
            ags.push(parse_ag(dev.as_ref(), &sb, AgNumber(index))?);
        }
        debug!(
            target: "rxfs::fs",
            ag_count = sb.ag_count,
            block_size = sb.block_size,
            root_ino = sb.root_ino.0,
            "opened filesystem"
        );

        Ok(Self {
            dev,
            sb,
            geo,
            has_ftype,
            ags,
        })
    }

    /// Open an image file from a path.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(FileByteDevice::open(path)?)
    }

    #[must_use]
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    #[must_use]
    pub fn allocation_groups(&self) -> &[AllocationGroup] {
        &self.ags
    }

    // ── Public operations ───────────────────────────────────────────────

    /// Metadata for the entry at `path`.
    pub fn stat(&self, path: &str) -> Result<FileInfo> {
        self.stat_inner(path).map_err(|e| e.with_op("stat", path))
    }

    /// List the directory at `path`, excluding `.` and `..`.
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.read_dir_inner(path)
            .map_err(|e| e.with_op("read directory", path))
    }

    /// Open the regular file at `path`, materialising its contents.
    pub fn open_file(&self, path: &str) -> Result<File> {
        self.open_inner(path).map_err(|e| e.with_op("open", path))
    }

    /// Resolve the target of a local-format symlink at `path`.
    pub fn read_link(&self, path: &str) -> Result<String> {
        self.read_link_inner(path)
            .map_err(|e| e.with_op("read link", path))
    }

    // ── Operation bodies ────────────────────────────────────────────────

    fn stat_inner(&self, path: &str) -> Result<FileInfo> {
        let components = validate_path(path)?;
        if components.is_empty() {
            let root = self.read_inode(self.sb.root_ino)?;
            return Ok(self.file_info(".", &root));
        }

        match self.open_inner(path) {
            Ok(file) => Ok(file.info),
            Err(err) if matches!(err.kind(), RxfsError::Invalid(_)) => Err(err),
            Err(_) => {
                // Not openable as a regular file: resolve through the
                // parent listing instead (directories, symlinks).
                let (dir_components, base) = components.split_at(components.len() - 1);
                let dir_ino = self.walk(dir_components)?;
                let infos = self.list_file_info(dir_ino)?;
                infos
                    .into_iter()
                    .find(|info| info.name == base[0])
                    .ok_or_else(|| RxfsError::NotFound(path.to_owned()))
            }
        }
    }

    fn read_dir_inner(&self, path: &str) -> Result<Vec<DirEntry>> {
        let components = validate_path(path)?;
        let ino = self.walk(&components)?;
        let infos = self.list_file_info(ino)?;
        Ok(infos
            .into_iter()
            .filter(|info| info.name != "." && info.name != "..")
            .map(|info| DirEntry { info })
            .collect())
    }

    fn open_inner(&self, path: &str) -> Result<File> {
        let components = validate_path(path)?;
        let Some((base, dir_components)) = components.split_last() else {
            return Err(RxfsError::IsDirectory(path.to_owned()));
        };

        let dir_ino = self.walk(dir_components)?;
        let infos = self.list_file_info(dir_ino)?;
        let info = infos
            .into_iter()
            .find(|info| info.name == *base)
            .ok_or_else(|| RxfsError::NotFound(path.to_owned()))?;
        if info.is_dir {
            return Err(RxfsError::IsDirectory(path.to_owned()));
        }

        let inode = self.read_inode(InodeNumber(info.ino))?;
        let buffer = self.materialize(&inode)?;
        Ok(File {
            info,
            buffer,
            pos: 0,
        })
    }

    fn read_link_inner(&self, path: &str) -> Result<String> {
        let components = validate_path(path)?;
        let Some((base, dir_components)) = components.split_last() else {
            return Err(RxfsError::Invalid(path.to_owned()));
        };

        let dir_ino = self.walk(dir_components)?;
        let entries = self.list_entries(dir_ino)?;
        let (_, ino) = entries
            .into_iter()
            .find(|(name, _)| name == base)
            .ok_or_else(|| RxfsError::NotFound(path.to_owned()))?;

        let inode = self.read_inode(ino)?;
        match &inode.data_fork {
            DataFork::SymlinkLocal(target) => {
                Ok(String::from_utf8_lossy(target).into_owned())
            }
            _ => Err(RxfsError::UnsupportedInodeFormat {
                ino: ino.0,
                detail: "not a local-format symlink".to_owned(),
            }),
        }
    }

    // ── Walk & listing internals ────────────────────────────────────────

    /// Walk path components from the root, returning the final inode
    /// number. Every traversed component must exist and be a directory.
    fn walk(&self, components: &[&str]) -> Result<InodeNumber> {
        let mut current = self.sb.root_ino;
        for component in components {
            let entries = self.list_entries(current)?;
            let Some((_, child)) = entries
                .iter()
                .find(|(name, _)| name == component)
            else {
                return Err(RxfsError::NotFound((*component).to_owned()));
            };

            let child_inode = self.read_inode(*child)?;
            if !child_inode.core.is_dir() {
                return Err(RxfsError::NotADirectory((*component).to_owned()));
            }
            current = *child;
        }
        Ok(current)
    }

    /// List `(name, ino)` pairs of a directory inode, in on-disk order.
    ///
    /// Short-form listings synthesize `.` and `..`; data blocks carry them
    /// on disk. An unrecognized block header magic stops block iteration
    /// with a warning, keeping whatever was decoded so far.
    fn list_entries(&self, ino: InodeNumber) -> Result<Vec<(String, InodeNumber)>> {
        let inode = self.read_inode(ino)?;
        if !inode.core.is_dir() {
            return Err(RxfsError::NotADirectory(format!("inode {ino}")));
        }

        match &inode.data_fork {
            DataFork::Directory(sf) => {
                let mut entries = Vec::with_capacity(sf.entries.len() + 2);
                entries.push((".".to_owned(), ino));
                entries.push(("..".to_owned(), InodeNumber(sf.parent)));
                for entry in &sf.entries {
                    entries.push((entry.name_str(), InodeNumber(entry.inumber)));
                }
                Ok(entries)
            }
            DataFork::DirectoryExtents(recs) => {
                let mut entries = Vec::new();
                'records: for rec in recs {
                    let extent = rec.unpack();
                    if extent.unwritten {
                        continue;
                    }
                    for block in self.read_dir_blocks(ino, &extent)? {
                        match parse_data_block(&block, self.has_ftype) {
                            Ok(block_entries) => {
                                entries.extend(block_entries.into_iter().map(|e| {
                                    (e.name_str(), InodeNumber(e.inumber))
                                }));
                            }
                            Err(err) if err.is_unsupported_dir_block() => {
                                warn!(
                                    target: "rxfs::fs",
                                    ino = ino.0,
                                    %err,
                                    "stopping directory block iteration"
                                );
                                break 'records;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                }
                Ok(entries)
            }
            _ => Err(RxfsError::UnsupportedInodeFormat {
                ino: ino.0,
                detail: "directory has no decodable entry list".to_owned(),
            }),
        }
    }

    /// Read one extent of a directory and split it into directory blocks.
    fn read_dir_blocks(
        &self,
        ino: InodeNumber,
        extent: &rxfs_ondisk::Extent,
    ) -> Result<Vec<Vec<u8>>> {
        let offset = self
            .geo
            .fsblock_to_byte(extent.start_block)
            .ok_or_else(|| RxfsError::CorruptInode {
                ino: ino.0,
                detail: format!("extent start block {} overflows", extent.start_block),
            })?;
        let len = extent
            .block_count
            .checked_mul(u64::from(self.sb.block_size))
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| RxfsError::CorruptInode {
                ino: ino.0,
                detail: "extent length overflows".to_owned(),
            })?;

        let data = self.dev.read_at_vec(offset, len)?;
        let dir_block_size = self.sb.dir_block_size() as usize;
        Ok(data
            .chunks(dir_block_size)
            .map(<[u8]>::to_vec)
            .collect())
    }

    /// Listing with full metadata: parse each entry's inode.
    fn list_file_info(&self, ino: InodeNumber) -> Result<Vec<FileInfo>> {
        let entries = self.list_entries(ino)?;
        let mut infos = Vec::with_capacity(entries.len());
        for (name, child) in entries {
            let inode = self.read_inode(child)?;
            infos.push(self.file_info(&name, &inode));
        }
        Ok(infos)
    }

    fn file_info(&self, name: &str, inode: &Inode) -> FileInfo {
        FileInfo {
            name: name.to_owned(),
            ino: inode.ino.0,
            size: inode.core.size,
            mtime: inode.core.mtime_secs(),
            mode: inode.core.mode,
            is_dir: inode.core.is_dir(),
        }
    }

    /// Read and decode one inode by absolute number.
    fn read_inode(&self, ino: InodeNumber) -> Result<Inode> {
        let offset = self
            .geo
            .inode_abs_offset(ino)
            .ok_or_else(|| RxfsError::CorruptInode {
                ino: ino.0,
                detail: "inode number outside AG range".to_owned(),
            })?;
        let raw = self
            .dev
            .read_at_vec(offset, usize::from(self.sb.inode_size))?;
        Inode::parse(&raw, ino, self.has_ftype)
    }

    /// Materialise a regular file: place each extent at its logical byte
    /// position, leave holes and unwritten extents zeroed, truncate to
    /// the inode's recorded size.
    fn materialize(&self, inode: &Inode) -> Result<Vec<u8>> {
        let recs = inode.regular_extents()?;
        let size = rxfs_types::u64_to_usize(inode.core.size, "di_size")
            .map_err(RxfsError::from)?;
        let mut buffer = vec![0_u8; size];
        let block_size = u64::from(self.sb.block_size);

        for rec in recs {
            let extent = rec.unpack();
            if extent.unwritten {
                continue;
            }

            let logical_start = extent
                .logical_offset
                .checked_mul(block_size)
                .ok_or_else(|| self.corrupt_extent(inode, "logical offset overflows"))?;
            if logical_start >= inode.core.size {
                continue;
            }

            let physical = self
                .geo
                .fsblock_to_byte(extent.start_block)
                .ok_or_else(|| self.corrupt_extent(inode, "start block overflows"))?;
            let run_len = extent
                .block_count
                .checked_mul(block_size)
                .ok_or_else(|| self.corrupt_extent(inode, "block count overflows"))?;
            let copy_len = run_len.min(inode.core.size - logical_start);
            let copy_len = rxfs_types::u64_to_usize(copy_len, "extent_len")
                .map_err(RxfsError::from)?;

            let dest = rxfs_types::u64_to_usize(logical_start, "logical_start")
                .map_err(RxfsError::from)?;
            self.dev.read_exact_at(
                physical,
                &mut buffer[dest..dest + copy_len],
            )?;
        }

        Ok(buffer)
    }

    fn corrupt_extent(&self, inode: &Inode, detail: &str) -> RxfsError {
        RxfsError::CorruptInode {
            ino: inode.ino.0,
            detail: detail.to_owned(),
        }
    }
}

/// Parse the header cluster of one AG: superblock copy at sector 0, then
/// AGF, AGI, AGFL at the following sectors.
fn parse_ag(dev: &dyn ByteDevice, sb: &Superblock, index: AgNumber) -> Result<AllocationGroup> {
    let geo = sb.geometry();
    let base = geo
        .ag_byte_offset(index)
        .ok_or_else(|| RxfsError::CorruptAg {
            ag: index.0,
            detail: "AG offset overflows".to_owned(),
        })?;
    let sector = u64::from(sb.sector_size);
    let corrupt = |detail: String| RxfsError::CorruptAg {
        ag: index.0,
        detail,
    };

    let sector_at = |n: u64| -> Result<Vec<u8>> {
        let offset = base
            .checked_add(n * sector)
            .ok_or_else(|| corrupt("AG sector offset overflows".to_owned()))?;
        dev.read_at_vec(offset, usize::from(sb.sector_size))
    };

    let sb_region = sector_at(0)?;
    let superblock =
        Superblock::parse(&sb_region).map_err(|e| corrupt(format!("superblock copy: {e}")))?;

    let agf_region = sector_at(1)?;
    let agf = Agf::parse(&agf_region, index.0).map_err(|e| corrupt(format!("AGF: {e}")))?;

    let agi_region = sector_at(2)?;
    let agi = Agi::parse(&agi_region, index.0).map_err(|e| corrupt(format!("AGI: {e}")))?;

    let agfl_region = sector_at(3)?;
    let agfl =
        Agfl::parse(&agfl_region, agf.fl_count).map_err(|e| corrupt(format!("AGFL: {e}")))?;

    if sb.is_v5() {
        if !verify_region_crc(&agf_region, AGF_CRC_OFFSET) {
            warn!(target: "rxfs::fs", ag = index.0, "AGF CRC mismatch, continuing read-only");
        }
        if !verify_region_crc(&agi_region, AGI_CRC_OFFSET) {
            warn!(target: "rxfs::fs", ag = index.0, "AGI CRC mismatch, continuing read-only");
        }
    }

    Ok(AllocationGroup {
        index,
        superblock,
        agf,
        agi,
        agfl,
    })
}

/// Validate a path and split it into components.
///
/// `.` names the root and yields no components. Everything else must be
/// relative: no leading `/`, no empty components, no `.` or `..` inside.
fn validate_path(path: &str) -> Result<Vec<&str>> {
    if path == "." {
        return Ok(Vec::new());
    }
    if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
        return Err(RxfsError::Invalid(path.to_owned()));
    }
    let components: Vec<&str> = path.split('/').collect();
    if components
        .iter()
        .any(|c| c.is_empty() || *c == "." || *c == "..")
    {
        return Err(RxfsError::Invalid(path.to_owned()));
    }
    Ok(components)
}
