//! Sequential access: a line reader over the index file, and the [`Entries`]
//! iterator that walks the archive in append order.
//!
//! The byte span of an entry is only known once the *following* index line
//! has been read, so [`Entries`] keeps one line of lookahead: the path of a
//! yielded entry comes from the line consumed before the offset that ends it.
//! The last entry ends at the data-file length captured on open.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};

use log::debug;

use crate::entry::{self, IndexLine, LineError};
use crate::error::{ArchiveError, Result};
use crate::layout::ArchivePaths;
use crate::reader::{self, Extracted};

// ── IndexReader ───────────────────────────────────────────────────────────────

/// Forward reader over index lines, header skipped.  Tracks the byte offset
/// of every line so a scan can be resumed later.
pub struct IndexReader {
    reader:     BufReader<File>,
    /// Byte offset of the next unread line.
    offset:     u64,
    /// Byte offset where the line returned last began.
    line_start: u64,
    /// 1-based number of the line returned last.
    line_no:    u64,
    buf:        Vec<u8>,
}

impl IndexReader {
    pub fn open(paths: &ArchivePaths) -> Result<Self> {
        let mut this = Self::at(paths, 0, 0)?;
        if let Some(first) = this.read_raw()? {
            if !entry::is_header(&first) {
                this.reader.seek(SeekFrom::Start(0))?;
                this.offset = 0;
                this.line_no = 0;
            }
        }
        Ok(this)
    }

    /// Position the reader at `offset`, which must be the start of a line.
    /// `lines_before` is only used for diagnostics.
    pub fn at(paths: &ArchivePaths, offset: u64, lines_before: u64) -> Result<Self> {
        let mut file = File::open(&paths.index)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            reader: BufReader::new(file),
            offset,
            line_start: offset,
            line_no: lines_before,
            buf: Vec::new(),
        })
    }

    /// Next line with its terminator stripped, blank lines included.
    fn read_raw(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.line_start = self.offset;
        self.offset += n as u64;
        self.line_no += 1;
        let text = String::from_utf8_lossy(&self.buf);
        Ok(Some(text.trim_end_matches(['\n', '\r']).to_owned()))
    }

    /// Next non-blank line, unparsed.
    pub fn next_text(&mut self) -> Result<Option<String>> {
        while let Some(line) = self.read_raw()? {
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    pub fn next_line(&mut self) -> Result<Option<IndexLine>> {
        match self.next_text()? {
            None => Ok(None),
            Some(text) => IndexLine::parse(&text).map(Some).map_err(|e| self.corrupt(e)),
        }
    }

    pub fn corrupt(&self, source: LineError) -> ArchiveError {
        ArchiveError::CorruptIndex { line: self.line_no, source }
    }

    /// Byte offset of the next unread line.
    pub fn offset(&self) -> u64 { self.offset }

    /// Byte offset of the line returned last.
    pub fn line_start(&self) -> u64 { self.line_start }

    pub fn line_no(&self) -> u64 { self.line_no }
}

// ── Entries ───────────────────────────────────────────────────────────────────

/// Where a sequential walk can pick up again: the index byte offset of the
/// next unread entry line and how many entries were read before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumePoint {
    pub index_offset: u64,
    pub files_read:   u64,
}

pub struct Entries {
    index:      IndexReader,
    data:       BufReader<File>,
    data_len:   u64,
    pending:    Option<IndexLine>,
    pending_at: u64,
    files_read: u64,
    last_line:  Option<String>,
    position:   u64,
    failed:     bool,
}

impl Entries {
    /// Walk from the first entry.
    pub fn open(paths: &ArchivePaths) -> Result<Self> {
        let index = IndexReader::open(paths)?;
        Self::start(paths, index, 0)
    }

    /// Walk from a point saved by [`Entries::resume_point`].
    pub fn resume(paths: &ArchivePaths, point: ResumePoint) -> Result<Self> {
        // Header line plus one line per entry already read.
        let index = IndexReader::at(paths, point.index_offset, point.files_read + 1)?;
        Self::start(paths, index, point.files_read)
    }

    fn start(paths: &ArchivePaths, mut index: IndexReader, files_read: u64) -> Result<Self> {
        let data = BufReader::new(File::open(&paths.data)?);
        let data_len = paths.data_len()?;
        let pending = index.next_line()?;
        let pending_at = if pending.is_some() { index.line_start() } else { index.offset() };
        let position = pending.as_ref().map_or(data_len, |l| l.offset);
        debug!("{}: iterating from entry {} at offset {}", paths.name(), files_read, position);
        Ok(Self {
            index,
            data,
            data_len,
            pending,
            pending_at,
            files_read,
            last_line: None,
            position,
            failed: false,
        })
    }

    /// Consume the pending line and read the one after it.  Returns the
    /// consumed line with the offset that ends its entry.
    fn advance(&mut self) -> Result<Option<(IndexLine, u64)>> {
        let current = match self.pending.take() {
            Some(line) => line,
            None => return Ok(None),
        };
        let following = self.index.next_line()?;
        let end = match &following {
            Some(next) if next.offset <= current.offset => {
                return Err(self.index.corrupt(LineError::OutOfOrder {
                    previous: current.offset,
                    offset:   next.offset,
                }));
            }
            Some(next) => next.offset,
            None => self.data_len,
        };
        self.pending_at = if following.is_some() { self.index.line_start() } else { self.index.offset() };
        self.pending = following;
        self.files_read += 1;
        self.last_line = Some(current.to_string());
        self.position = end;
        Ok(Some((current, end)))
    }

    /// Step over up to `n` entries without decompressing them.  Returns how
    /// many were skipped.
    pub fn skip_entries(&mut self, n: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < n {
            if self.advance()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    pub fn resume_point(&self) -> ResumePoint {
        ResumePoint { index_offset: self.pending_at, files_read: self.files_read }
    }

    /// Entries consumed so far, counting those before a resume point.
    pub fn files_read(&self) -> u64 { self.files_read }

    /// The index line of the entry yielded last.
    pub fn last_line(&self) -> Option<&str> { self.last_line.as_deref() }

    /// Data offset where the next entry starts.
    pub fn position(&self) -> u64 { self.position }
}

impl Iterator for Entries {
    type Item = Result<Extracted>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (line, end) = match self.advance() {
            Ok(Some(step)) => step,
            Ok(None) => return None,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        let result = reader::read_span(&mut self.data, line.offset, end, self.data_len)
            .map(|extracted| extracted.with_index(line));
        Some(result)
    }
}
