#![forbid(unsafe_code)]
//! On-disk XFS format decoding.
//!
//! Pure byte-level parsers for the structures a read-only traversal needs:
//! the superblock, per-AG headers (AGF/AGI/AGFL), inodes with data-fork
//! dispatch, packed `bmbt` extent records, and both directory encodings
//! (short-form and dir2 data blocks). All multi-byte integers are
//! big-endian on disk except CRC fields, which XFS stores little-endian.

pub mod ag;
pub mod crc;
pub mod dir2;
pub mod extent;
pub mod inode;
pub mod sb;

pub use ag::{Agf, Agfl, Agi};
pub use crc::verify_region_crc;
pub use dir2::{parse_data_block, DirDataEntry, SfEntry, ShortFormDir};
pub use extent::{parse_bmbt_records, BmbtRec, Extent};
pub use inode::{DataFork, DinodeFormat, Inode, InodeCore};
pub use sb::Superblock;
