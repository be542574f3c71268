#![forbid(unsafe_code)]
//! Byte-source layer for RXFS.
//!
//! Provides the `ByteDevice` trait for positional reads over an XFS image,
//! plus file-backed and in-memory implementations. Positional reads keep the
//! device free of shared seek state, so open files never disturb a
//! directory walk in progress.

use rxfs_error::{Result, RxfsError};
use rxfs_types::{ByteOffset, XFS_SB_SIZE};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Byte-addressed read-only device (pread semantics).
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()>;

    /// Read `len` bytes from `offset` into a fresh buffer.
    fn read_at_vec(&self, offset: ByteOffset, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0_u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }
}

/// File-backed byte device using `pread`-style I/O.
///
/// Uses `std::os::unix::fs::FileExt`, which does not touch the file's seek
/// position, so a single device can serve interleaved reads.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
}

impl FileByteDevice {
    /// Open an image file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        trace!(target: "rxfs::block", len, "opened image");
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        check_read_range(offset, buf.len(), self.len)?;
        self.file.read_exact_at(buf, offset.0)?;
        Ok(())
    }
}

/// In-memory byte device for tests and fixtures.
#[derive(Debug, Clone)]
pub struct MemByteDevice {
    data: Arc<Vec<u8>>,
}

impl MemByteDevice {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }
}

impl ByteDevice for MemByteDevice {
    fn len_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_exact_at(&self, offset: ByteOffset, buf: &mut [u8]) -> Result<()> {
        check_read_range(offset, buf.len(), self.len_bytes())?;
        let start = offset.to_usize()?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

fn check_read_range(offset: ByteOffset, len: usize, device_len: u64) -> Result<()> {
    let len_u64 = u64::try_from(len).map_err(|_| RxfsError::ShortRead {
        offset: offset.0,
        wanted: len,
        got: 0,
    })?;
    let end = offset.0.checked_add(len_u64).ok_or(RxfsError::ShortRead {
        offset: offset.0,
        wanted: len,
        got: 0,
    })?;
    if end > device_len {
        let got = usize::try_from(device_len.saturating_sub(offset.0)).unwrap_or(0);
        return Err(RxfsError::ShortRead {
            offset: offset.0,
            wanted: len,
            got,
        });
    }
    Ok(())
}

/// Read the sector-sized superblock region at byte 0.
pub fn read_superblock_region(dev: &dyn ByteDevice) -> Result<Vec<u8>> {
    dev.read_at_vec(ByteOffset::ZERO, XFS_SB_SIZE)
}
