//! Text and binary layout of one stored entry, one index line and one log line.
//!
//! Pure functions only: nothing here touches the filesystem.
//!
//! # Index line
//! ```text
//! 000000000000000 aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d /a.txt
//! └── offset ───┘ └──────────── SHA-1 (40 hex) ──────────┘ └path┘
//! ```
//! The offset field is always 15 zero-padded digits followed by exactly one
//! space, the hash field exactly 40 hex characters followed by one space;
//! the path runs to the end of the line.
//!
//! # Log line
//! ```text
//! start: 000000000000000 2014-07-07T13:49:34Z->folder
//! ended: 000000000001234 2014-07-07T13:49:35Z
//! ```

use chrono::{Datelike, Utc};
use std::fmt;
use thiserror::Error;

use crate::hash::{ContentHash, HASH_HEX_LEN};

/// Prefixed to every stored payload in the data file.
pub const SIGNATURE:     &[u8; 7] = b"BIG81nb";
pub const SIGNATURE_LEN: u64      = SIGNATURE.len() as u64;
/// Tag used in the index/log header lines.
pub const MAGIC_TAG:     &str     = "BIG81nb";

pub const OFFSET_WIDTH:  usize    = 15;
/// Largest offset that fits the fixed-width field (~999 TB).
pub const MAX_OFFSET:    u64      = 999_999_999_999_999;

pub const TAG_START:     &str     = "start: ";
pub const TAG_ENDED:     &str     = "ended: ";
const DESCRIPTION_SEP:   &str     = "->";

const HASH_START: usize = OFFSET_WIDTH + 1;
const PATH_START: usize = HASH_START + HASH_HEX_LEN + 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("line is empty")]
    Empty,
    #[error("line too short: {0} bytes")]
    TooShort(usize),
    #[error("offset field is not a 15-digit number")]
    BadOffset,
    #[error("hash field is not 40 hex characters")]
    BadHash,
    #[error("missing field separator at column {0}")]
    MissingSeparator(usize),
    #[error("unknown log tag")]
    UnknownTag,
    #[error("offset {0} exceeds the fixed-width field")]
    OffsetOverflow(u64),
    #[error("offset {offset} does not follow previous offset {previous}")]
    OutOfOrder { previous: u64, offset: u64 },
}

/// Render an offset as 15 zero-padded digits.
pub fn format_offset(offset: u64) -> Result<String, LineError> {
    if offset > MAX_OFFSET {
        return Err(LineError::OffsetOverflow(offset));
    }
    Ok(format!("{:0width$}", offset, width = OFFSET_WIDTH))
}

pub fn parse_offset(field: &str) -> Result<u64, LineError> {
    if field.len() != OFFSET_WIDTH || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LineError::BadOffset);
    }
    field.parse().map_err(|_| LineError::BadOffset)
}

/// Current UTC time in the ISO-8601 form used by headers and log lines.
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// First line of the index and log files, e.g.
/// `BIG81nb-index | 2014-07-07T13:49:34Z | Copyright (C) 2014 owner`.
pub fn header(designation: &str, owner: &str) -> String {
    format!(
        "{}-{} | {} | Copyright (C) {} {}",
        MAGIC_TAG,
        designation,
        timestamp(),
        Utc::now().year(),
        owner,
    )
}

pub fn is_header(line: &str) -> bool {
    line.starts_with(MAGIC_TAG)
}

// ── Entry ────────────────────────────────────────────────────────────────────

/// One stored file as the index sees it.  Its bytes in the data file are
/// `[offset, offset + SIGNATURE_LEN + compressed_length)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub offset:            u64,
    pub hash:              ContentHash,
    pub path:              String,
    pub compressed_length: u64,
}

impl Entry {
    pub fn end(&self) -> u64 {
        self.offset + SIGNATURE_LEN + self.compressed_length
    }
}

/// Paths are stored on one index line.
pub fn is_storable_path(path: &str) -> bool {
    !path.is_empty() && !path.contains(['\n', '\r'])
}

// ── Index line ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLine {
    pub offset: u64,
    pub hash:   ContentHash,
    pub path:   String,
}

impl IndexLine {
    pub fn parse(line: &str) -> Result<Self, LineError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return Err(LineError::Empty);
        }
        // Bytes, not chars: a multi-byte path must not shift the fixed fields.
        if line.len() < PATH_START || !line.is_char_boundary(PATH_START) {
            return Err(LineError::TooShort(line.len()));
        }
        let bytes = line.as_bytes();
        if bytes[OFFSET_WIDTH] != b' ' {
            return Err(LineError::MissingSeparator(OFFSET_WIDTH));
        }
        if bytes[PATH_START - 1] != b' ' {
            return Err(LineError::MissingSeparator(PATH_START - 1));
        }
        let offset = parse_offset(line.get(..OFFSET_WIDTH).ok_or(LineError::BadOffset)?)?;
        let hash = hash_field(line)?;
        Ok(Self { offset, hash, path: line[PATH_START..].to_owned() })
    }

    /// Render without the trailing newline.
    pub fn render(&self) -> Result<String, LineError> {
        Ok(format!("{} {} {}", format_offset(self.offset)?, self.hash, self.path))
    }
}

impl fmt::Display for IndexLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:015} {} {}", self.offset, self.hash, self.path)
    }
}

/// Read only the hash column of an index line, for hash scans that do not
/// need the rest of the line.
pub fn hash_field(line: &str) -> Result<ContentHash, LineError> {
    let field = line.get(HASH_START..HASH_START + HASH_HEX_LEN).ok_or(LineError::BadHash)?;
    field.parse().map_err(|_| LineError::BadHash)
}

/// True when `query` names the stored path, either exactly or as a suffix
/// that begins at a `/` boundary (`"a.txt"` matches `"/dir/a.txt"`).
pub fn path_matches(stored: &str, query: &str) -> bool {
    if query.is_empty() {
        return false;
    }
    if stored == query {
        return true;
    }
    match stored.strip_suffix(query) {
        Some(prefix) => query.starts_with('/') || prefix.ends_with('/'),
        None         => false,
    }
}

// ── Log line ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Start { offset: u64, timestamp: String, description: String },
    Ended { offset: u64, timestamp: String },
}

impl LogLine {
    pub fn start(offset: u64, description: &str) -> Self {
        LogLine::Start {
            offset,
            timestamp:   timestamp(),
            description: sanitize_description(description),
        }
    }

    pub fn ended(offset: u64) -> Self {
        LogLine::Ended { offset, timestamp: timestamp() }
    }

    pub fn offset(&self) -> u64 {
        match self {
            LogLine::Start { offset, .. } | LogLine::Ended { offset, .. } => *offset,
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self, LogLine::Start { .. })
    }

    pub fn parse(line: &str) -> Result<Self, LineError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return Err(LineError::Empty);
        }
        let (is_start, rest) = if let Some(rest) = line.strip_prefix(TAG_START) {
            (true, rest)
        } else if let Some(rest) = line.strip_prefix(TAG_ENDED) {
            (false, rest)
        } else {
            return Err(LineError::UnknownTag);
        };

        let offset_field = rest.get(..OFFSET_WIDTH).ok_or(LineError::TooShort(line.len()))?;
        let offset = parse_offset(offset_field)?;
        let tail = rest[OFFSET_WIDTH..]
            .strip_prefix(' ')
            .ok_or(LineError::MissingSeparator(TAG_START.len() + OFFSET_WIDTH))?;

        if is_start {
            let (timestamp, description) = tail
                .split_once(DESCRIPTION_SEP)
                .ok_or(LineError::TooShort(line.len()))?;
            Ok(LogLine::Start {
                offset,
                timestamp:   timestamp.to_owned(),
                description: description.to_owned(),
            })
        } else {
            if tail.is_empty() {
                return Err(LineError::TooShort(line.len()));
            }
            Ok(LogLine::Ended { offset, timestamp: tail.to_owned() })
        }
    }

    /// Render without the trailing newline.
    pub fn render(&self) -> Result<String, LineError> {
        Ok(match self {
            LogLine::Start { offset, timestamp, description } => format!(
                "{}{} {}{}{}",
                TAG_START, format_offset(*offset)?, timestamp, DESCRIPTION_SEP, description
            ),
            LogLine::Ended { offset, timestamp } => {
                format!("{}{} {}", TAG_ENDED, format_offset(*offset)?, timestamp)
            }
        })
    }
}

/// Log descriptions live on one line.
fn sanitize_description(description: &str) -> String {
    description.replace(['\n', '\r'], " ")
}
