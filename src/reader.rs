//! Random-access extraction of single entries.
//!
//! Two ways to find an entry's span in the data file:
//!
//! - **Indexed**: look the path up in the index; the entry ends where the
//!   next index line begins, or at the end of the data file.
//! - **Raw offset**: start from a bare data offset with no index.  The end
//!   comes from the container header, or from a signature byte scan when the
//!   header is unreadable (see [`crate::recovery::scanner`]).
//!
//! Nothing here writes to the archive.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Component, Path, PathBuf};

use log::debug;

use crate::container;
use crate::entry::{self, IndexLine, LineError, SIGNATURE_LEN};
use crate::error::{ArchiveError, Result};
use crate::hash::ContentHash;
use crate::iter::IndexReader;
use crate::layout::ArchivePaths;
use crate::recovery::scanner::{self, Boundary};

/// One decoded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub offset:   u64,
    /// Relative path from the index; `None` for raw-offset reads.
    pub path:     Option<String>,
    pub hash:     Option<ContentHash>,
    /// File name kept in the container header.
    pub name:     String,
    pub modified: i64,
    pub data:     Vec<u8>,
}

impl Extracted {
    pub(crate) fn with_index(mut self, line: IndexLine) -> Self {
        self.hash = Some(line.hash);
        self.path = Some(line.path);
        self
    }

    /// Contents decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Write the contents to `target`, replacing any existing file.
    pub fn write_to(&self, target: &Path) -> io::Result<()> {
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(target, &self.data)
    }

    /// Write the contents below `dir`, recreating the stored relative path.
    /// Falls back to the container's file name for raw-offset reads.
    /// Returns the file written.
    pub fn write_into(&self, dir: &Path) -> io::Result<PathBuf> {
        let relative = self.path.as_deref().unwrap_or(&self.name);
        let mut target = dir.to_path_buf();
        let mut pushed = false;
        // `..` and absolute components must not escape `dir`.
        for component in Path::new(relative).components() {
            if let Component::Normal(part) = component {
                target.push(part);
                pushed = true;
            }
        }
        if !pushed {
            target.push(format!("entry-{:015}", self.offset));
        }
        self.write_to(&target)?;
        Ok(target)
    }
}

/// An index hit: the matching line and the span it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub line:  IndexLine,
    /// First byte of the signature.
    pub start: u64,
    /// One past the last byte of the entry.
    pub end:   u64,
}

impl Located {
    pub fn compressed_length(&self) -> u64 {
        self.end.saturating_sub(self.start + SIGNATURE_LEN)
    }
}

/// Find the first index line whose path matches `query` (see
/// [`entry::path_matches`]).
pub fn locate(paths: &ArchivePaths, query: &str) -> Result<Option<Located>> {
    let mut index = IndexReader::open(paths)?;
    while let Some(line) = index.next_line()? {
        if !entry::path_matches(&line.path, query) {
            continue;
        }
        let end = match index.next_line()? {
            Some(next) if next.offset <= line.offset => {
                return Err(index.corrupt(LineError::OutOfOrder {
                    previous: line.offset,
                    offset:   next.offset,
                }));
            }
            Some(next) => next.offset,
            None => paths.data_len()?,
        };
        return Ok(Some(Located { start: line.offset, end, line }));
    }
    Ok(None)
}

/// Extract the entry stored under `query`.
pub fn extract(paths: &ArchivePaths, query: &str) -> Result<Option<Extracted>> {
    let located = match locate(paths, query)? {
        Some(l) => l,
        None => return Ok(None),
    };
    debug!(
        "{}: extracting {} from [{}, {})",
        paths.name(),
        located.line.path,
        located.start,
        located.end
    );
    let extracted = extract_span(paths, located.start, located.end)?;
    Ok(Some(extracted.with_index(located.line)))
}

/// Extract the entry occupying `[start, end)` of the data file, signature
/// included.
pub fn extract_span(paths: &ArchivePaths, start: u64, end: u64) -> Result<Extracted> {
    let data_len = paths.data_len()?;
    let mut data = BufReader::new(File::open(&paths.data)?);
    read_span(&mut data, start, end, data_len)
}

/// Extract the entry whose signature sits at `offset`, without the index.
pub fn extract_at(paths: &ArchivePaths, offset: u64) -> Result<Extracted> {
    let data_len = paths.data_len()?;
    let mut data = BufReader::new(File::open(&paths.data)?);
    let span = scanner::entry_span_at(&mut data, offset, data_len)?
        .ok_or(ArchiveError::MissingSignature { offset })?;
    if span.boundary == Boundary::Scanned {
        debug!(
            "{}: entry at {} has no readable header, end found by signature scan at {}",
            paths.name(),
            offset,
            span.end
        );
    }
    read_span(&mut data, span.start, span.end, data_len)
}

/// Read `[start, end)` (signature included), verify the signature and
/// decode the container.
pub fn read_span<R: Read + Seek>(
    data:     &mut R,
    start:    u64,
    end:      u64,
    data_len: u64,
) -> Result<Extracted> {
    let end = end.min(data_len);
    if end < start + SIGNATURE_LEN || !scanner::signature_at(data, start)? {
        return Err(ArchiveError::MissingSignature { offset: start });
    }
    // `signature_at` leaves the reader at the payload start.
    let len = end - start - SIGNATURE_LEN;
    let mut payload = Vec::with_capacity(len as usize);
    (&mut *data).take(len).read_to_end(&mut payload)?;
    let unsealed = container::unseal(&payload)?;
    Ok(Extracted {
        offset:   start,
        path:     None,
        hash:     None,
        name:     unsealed.name,
        modified: unsealed.modified,
        data:     unsealed.data,
    })
}
