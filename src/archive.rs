//! High-level [`Archive`] API: the primary embedding surface.
//!
//! ```no_run
//! use bigzip::archive::Archive;
//!
//! let mut ar = Archive::open("photos.big")?;
//! ar.append_folder("/home/me/photos")?;
//! ar.append_bytes(b"hello", "/notes/a.txt")?;
//!
//! let text = ar.extract_text("/notes/a.txt")?;
//! assert_eq!(text.as_deref(), Some("hello"));
//! ar.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::append::{AppendReport, Appender};
use crate::config::ArchiveConfig;
use crate::entry::{Entry, IndexLine};
use crate::error::{ArchiveError, Result};
use crate::hash::ContentHash;
use crate::iter::{Entries, ResumePoint};
use crate::layout::ArchivePaths;
use crate::reader::{self, Extracted, Located};
use crate::recovery::{self, scanner, RecoveryOutcome};
use crate::search;
use crate::session::Session;

// ── Archive ───────────────────────────────────────────────────────────────────

/// Handle on one archive triple.  Holds no open files between calls: write
/// sessions and read passes acquire their handles and release them when
/// they end.
#[derive(Debug, Clone)]
pub struct Archive {
    paths:     ArchivePaths,
    config:    ArchiveConfig,
    base_path: Option<PathBuf>,
    opened:    RecoveryOutcome,
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ArchiveConfig::default())
    }

    /// Open `path`, creating any missing file of the triple, and roll back
    /// a session left unfinished by a previous run before anything is read.
    pub fn open_with<P: AsRef<Path>>(path: P, config: ArchiveConfig) -> Result<Self> {
        let paths = ArchivePaths::new(path);
        paths.touch(&config.owner)?;

        let opened = recovery::restore(&paths)?;
        info!(
            "Archive is ready to be used: {} ({:.2} MiB)",
            paths.name(),
            opened.position() as f64 / 1024.0 / 1024.0
        );
        Ok(Self { paths, config, base_path: None, opened })
    }

    /// What recovery did while the archive was being opened.
    pub fn open_recovery(&self) -> &RecoveryOutcome {
        &self.opened
    }

    // ── Sessions ─────────────────────────────────────────────────────────────

    /// Roll back a session left unfinished since the archive was opened.
    pub fn recover(&self) -> Result<RecoveryOutcome> {
        recovery::restore(&self.paths)
    }

    /// Open a raw write session.  The append methods manage their own.
    pub fn begin_session(&self, description: &str) -> Result<Session> {
        Session::begin(&self.paths, description, self.config.sync)
    }

    // ── Write ─────────────────────────────────────────────────────────────────

    /// Prefix stripped from absolute paths before they are stored.
    pub fn set_base_path<P: AsRef<Path>>(&mut self, base: P) {
        let base = base.as_ref();
        self.base_path = Some(fs::canonicalize(base).unwrap_or_else(|_| base.to_path_buf()));
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Store every file under `root`.  The first folder appended becomes the
    /// base path when none is set.
    pub fn append_folder<P: AsRef<Path>>(&mut self, root: P) -> Result<AppendReport> {
        let root = canonical_source(root.as_ref())?;
        if !root.is_dir() {
            return Err(ArchiveError::SourceFile {
                path:   root,
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            });
        }
        let base = self.base_path.get_or_insert_with(|| root.clone()).clone();
        Appender::new(&self.paths, &self.config).append_folder(&root, &base)
    }

    /// Store one file in its own session.  The stored path is relative to
    /// `base_hint`, else to the base path, else to the file's directory.
    pub fn append_file<P: AsRef<Path>>(&self, file: P, base_hint: Option<&Path>) -> Result<Entry> {
        let file = canonical_source(file.as_ref())?;
        let base = match (base_hint, &self.base_path) {
            (Some(hint), _) => fs::canonicalize(hint).unwrap_or_else(|_| hint.to_path_buf()),
            (None, Some(base)) => base.clone(),
            (None, None) => file.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        Appender::new(&self.paths, &self.config).append_file(&file, &base)
    }

    /// Store an in-memory buffer under `relative_path`.
    pub fn append_bytes(&self, data: &[u8], relative_path: &str) -> Result<Entry> {
        Appender::new(&self.paths, &self.config).append_bytes(data, relative_path)
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    pub fn locate(&self, query: &str) -> Result<Option<Located>> {
        reader::locate(&self.paths, query)
    }

    pub fn extract(&self, query: &str) -> Result<Option<Extracted>> {
        reader::extract(&self.paths, query)
    }

    pub fn extract_bytes(&self, query: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.extract(query)?.map(|e| e.data))
    }

    pub fn extract_text(&self, query: &str) -> Result<Option<String>> {
        Ok(self.extract(query)?.map(|e| e.text().into_owned()))
    }

    /// Write the entry to `target`.  Returns `false` when no entry matches.
    pub fn extract_to_file<P: AsRef<Path>>(&self, query: &str, target: P) -> Result<bool> {
        match self.extract(query)? {
            Some(extracted) => {
                extracted.write_to(target.as_ref())?;
                debug!("{}: wrote {} to {}", self.paths.name(), query, target.as_ref().display());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Extract the entry stored in `[start, end)` of the data file, e.g. a
    /// span returned by [`Archive::locate`].
    pub fn extract_span(&self, start: u64, end: u64) -> Result<Extracted> {
        reader::extract_span(&self.paths, start, end)
    }

    /// Extract the entry starting at a raw data offset, without the index.
    pub fn extract_at(&self, offset: u64) -> Result<Extracted> {
        reader::extract_at(&self.paths, offset)
    }

    pub fn entries(&self) -> Result<Entries> {
        Entries::open(&self.paths)
    }

    pub fn entries_from(&self, point: ResumePoint) -> Result<Entries> {
        Entries::resume(&self.paths, point)
    }

    /// Write every entry below `dest`.  Returns how many files were written.
    pub fn unpack<P: AsRef<Path>>(&self, dest: P) -> Result<u64> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;
        let mut written = 0;
        for extracted in self.entries()? {
            extracted?.write_into(dest)?;
            written += 1;
        }
        Ok(written)
    }

    // ── Search ────────────────────────────────────────────────────────────────

    pub fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<String>> {
        search::find_by_hash(&self.paths, hash)
    }

    pub fn find_all_by_hash(&self, hash: &ContentHash) -> Result<Vec<String>> {
        search::find_all_by_hash(&self.paths, hash)
    }

    pub fn list(&self) -> Result<Vec<IndexLine>> {
        search::list(&self.paths)
    }

    /// Walk the data file by signatures, ignoring the index.
    pub fn scan(&self) -> Result<scanner::ScanReport> {
        Ok(scanner::scan_file(&self.paths.data)?)
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn paths(&self) -> &ArchivePaths { &self.paths }

    pub fn config(&self) -> &ArchiveConfig { &self.config }

    pub fn size(&self) -> Result<u64> {
        Ok(self.paths.data_len()?)
    }

    /// Release the handle.  Reports a session left open by a crash.
    pub fn close(self) -> Result<()> {
        if let Some(offset) = recovery::pending(&self.paths)? {
            warn!("{}: closing with an unfinished session at offset {}", self.paths.name(), offset);
        }
        debug!("{}: closed", self.paths.name());
        Ok(())
    }
}

fn canonical_source(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|source| ArchiveError::SourceFile { path: path.to_path_buf(), source })
}
