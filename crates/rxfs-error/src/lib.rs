#![forbid(unsafe_code)]
//! Error types for RXFS.
//!
//! Defines `RxfsError` and a `Result<T>` alias used throughout the
//! workspace. Facade operations wrap failures with the operation name and
//! path; `kind()` recovers the underlying error for callers that match.

use rxfs_types::ParseError;
use thiserror::Error;

/// Unified error type for all RXFS operations.
#[derive(Debug, Error)]
pub enum RxfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("corrupt superblock: {detail}")]
    CorruptSuperblock { detail: String },

    #[error("corrupt allocation group {ag}: {detail}")]
    CorruptAg { ag: u32, detail: String },

    #[error("corrupt inode {ino}: {detail}")]
    CorruptInode { ino: u64, detail: String },

    #[error("corrupt directory block: {detail}")]
    CorruptDirBlock { detail: String },

    #[error("unsupported inode format for inode {ino}: {detail}")]
    UnsupportedInodeFormat { ino: u64, detail: String },

    /// Distinguished sentinel: a directory data block whose magic is not in
    /// the recognized set. Directory listing downgrades this to a warning
    /// and stops iterating that directory's blocks.
    #[error("unsupported dir2 block header magic {magic:#010x}")]
    UnsupportedDirBlockHeader { magic: u32 },

    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        offset: u64,
        wanted: usize,
        got: usize,
    },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{op} {path}: {source}")]
    Op {
        op: &'static str,
        path: String,
        #[source]
        source: Box<RxfsError>,
    },
}

impl RxfsError {
    /// Wrap this error with the operation name and path it failed under.
    ///
    /// Already-wrapped errors are returned unchanged so nested facade calls
    /// keep the innermost operation context.
    #[must_use]
    pub fn with_op(self, op: &'static str, path: &str) -> Self {
        match self {
            Self::Op { .. } => self,
            other => Self::Op {
                op,
                path: path.to_owned(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, unwrapping any operation context.
    #[must_use]
    pub fn kind(&self) -> &Self {
        match self {
            Self::Op { source, .. } => source.kind(),
            other => other,
        }
    }

    /// Whether this error (or its wrapped source) is the dir2-block sentinel.
    #[must_use]
    pub fn is_unsupported_dir_block(&self) -> bool {
        matches!(self.kind(), Self::UnsupportedDirBlockHeader { .. })
    }

    /// Whether this error (or its wrapped source) is `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), Self::NotFound(_))
    }
}

/// Result alias using `RxfsError`.
pub type Result<T> = std::result::Result<T, RxfsError>;
