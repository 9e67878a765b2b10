//! One bracketed write session: `start:` tag, N entries, `ended:` tag.
//!
//! A [`Session`] owns every write handle on the archive for its lifetime and
//! the `current_position` cursor.  Dropping it without [`Session::commit`]
//! leaves the `start:` tag dangling, so the next session rolls the partial
//! tail back.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use log::{debug, warn};

use crate::entry::{Entry, IndexLine, LogLine, MAX_OFFSET, SIGNATURE, SIGNATURE_LEN};
use crate::error::{ArchiveError, Result};
use crate::hash::ContentHash;
use crate::layout::{self, ArchivePaths};
use crate::recovery::{self, RecoveryOutcome};

pub struct Session {
    paths:     ArchivePaths,
    data:      BufWriter<File>,
    index:     BufWriter<File>,
    log:       File,
    start:     u64,
    position:  u64,
    written:   u64,
    sync:      bool,
    recovery:  RecoveryOutcome,
    committed: bool,
}

impl Session {
    /// Recover any interrupted session, then open a new one at the
    /// restored write cursor.
    pub fn begin(paths: &ArchivePaths, description: &str, sync: bool) -> Result<Self> {
        let recovery = recovery::restore(paths)?;
        let position = recovery.position();

        let mut log = open_append(&paths.log)?;
        let line = LogLine::start(position, description)
            .render()
            .map_err(|_| ArchiveError::OffsetOverflow(position))?;
        writeln!(log, "{line}")?;
        log.flush()?;
        // The restore point must be durable before the first data byte.
        if sync {
            log.sync_data()?;
        }

        let data = BufWriter::new(OpenOptions::new().append(true).open(&paths.data)?);
        let index = BufWriter::new(open_append(&paths.index)?);
        debug!("{}: session opened at offset {} ({description})", paths.name(), position);

        Ok(Self {
            paths: paths.clone(),
            data,
            index,
            log,
            start: position,
            position,
            written: 0,
            sync,
            recovery,
            committed: false,
        })
    }

    /// Append one entry: signature, container bytes, index line.
    pub fn write(&mut self, container: &[u8], hash: ContentHash, path: &str) -> Result<Entry> {
        if !crate::entry::is_storable_path(path) {
            return Err(ArchiveError::InvalidPath(path.to_owned()));
        }
        let offset = self.position;
        let end = offset + SIGNATURE_LEN + container.len() as u64;
        if end > MAX_OFFSET {
            return Err(ArchiveError::OffsetOverflow(end));
        }
        let line = IndexLine { offset, hash, path: path.to_owned() }
            .render()
            .map_err(|_| ArchiveError::OffsetOverflow(offset))?;

        self.data.write_all(SIGNATURE)?;
        self.data.write_all(container)?;
        writeln!(self.index, "{line}")?;

        self.position = end;
        self.written += 1;
        Ok(Entry {
            offset,
            hash,
            path: path.to_owned(),
            compressed_length: container.len() as u64,
        })
    }

    /// Flush data, then index, then write the `ended:` tag.
    pub fn commit(mut self) -> Result<u64> {
        self.data.flush()?;
        if self.sync {
            self.data.get_ref().sync_data()?;
        }
        self.index.flush()?;
        if self.sync {
            self.index.get_ref().sync_data()?;
        }

        let line = LogLine::ended(self.position)
            .render()
            .map_err(|_| ArchiveError::OffsetOverflow(self.position))?;
        writeln!(self.log, "{line}")?;
        self.log.flush()?;
        if self.sync {
            self.log.sync_data()?;
        }

        self.committed = true;
        debug!(
            "{}: session committed, {} entries, offset {} -> {}",
            self.paths.name(),
            self.written,
            self.start,
            self.position
        );
        Ok(self.position)
    }

    /// Write cursor: offset the next entry will start at.
    pub fn position(&self) -> u64 { self.position }

    /// Offset recorded in this session's `start:` tag.
    pub fn start(&self) -> u64 { self.start }

    pub fn entries_written(&self) -> u64 { self.written }

    /// What recovery did before this session opened.
    pub fn recovery(&self) -> &RecoveryOutcome { &self.recovery }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.committed {
            warn!(
                "{}: session started at offset {} closed without commit; it will be rolled back",
                self.paths.name(),
                self.start
            );
        }
    }
}

/// Open a text file for appending, first terminating a last line that was
/// written without its newline.
fn open_append(path: &std::path::Path) -> Result<File> {
    let needs_newline = !layout::ends_with_newline(path)?;
    let mut file = OpenOptions::new().append(true).open(path)?;
    if needs_newline {
        file.write_all(b"\n")?;
    }
    Ok(file)
}
