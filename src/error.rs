use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;
use crate::container::ContainerError;
use crate::entry::LineError;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Corrupt index at line {line}: {source}")]
    CorruptIndex { line: u64, #[source] source: LineError },

    #[error("Corrupt log at line {line}: {source}")]
    CorruptLog { line: u64, #[source] source: LineError },

    /// The data file could not be brought back to the restore point.
    /// Continuing to write would corrupt the archive.
    #[error("Failed to restore data file to offset {expected}: length is {actual}")]
    TruncationFailed { expected: u64, actual: u64 },

    #[error("File too large: {path:?} ({size} bytes, limit {limit})")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Path cannot be stored in the index: {0:?}")]
    InvalidPath(String),

    #[error("No entry signature at offset {offset}")]
    MissingSignature { offset: u64 },

    #[error("Offset {0} exceeds the fixed-width index field")]
    OffsetOverflow(u64),

    #[error("Cannot read {path:?}: {source}")]
    SourceFile { path: PathBuf, #[source] source: io::Error },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] ignore::Error),
}

impl ArchiveError {
    /// Conditions after which the archive must not be written again until
    /// an operator has looked at it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArchiveError::TruncationFailed { .. })
    }

    /// Problems with one input file rather than with the archive; a folder
    /// append may skip these.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            ArchiveError::TooLarge { .. }
                | ArchiveError::InvalidPath(_)
                | ArchiveError::SourceFile { .. }
                | ArchiveError::Walk(_)
                | ArchiveError::Codec(_)
                | ArchiveError::Container(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
