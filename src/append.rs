//! Append engine: store files, folders and in-memory buffers.
//!
//! Every input goes through two steps:
//!
//! 1. **prepare**: read the source, enforce the size limit, compute the
//!    SHA-1 over the original bytes and seal them into a container.  Nothing
//!    touches the archive yet, so a failure here only concerns that input and
//!    the [`ErrorPolicy`] decides whether to skip it.
//! 2. **write**: push the prepared bytes through a [`Session`].  A failure
//!    here is an archive failure and always ends the operation.
//!
//! [`Granularity`] decides how many prepared entries share one session.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ignore::WalkBuilder;
use log::{debug, info, warn};

use crate::config::{ArchiveConfig, ErrorPolicy, Granularity};
use crate::container;
use crate::entry::{self, Entry};
use crate::error::{ArchiveError, Result};
use crate::hash::{self, ContentHash};
use crate::layout::ArchivePaths;
use crate::recovery;
use crate::session::Session;

/// An input ready to be written: sealed container plus index fields.
#[derive(Debug, Clone)]
pub struct PreparedEntry {
    pub path:          String,
    pub hash:          ContentHash,
    pub container:     Vec<u8>,
    pub original_size: u64,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path:   PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct AppendReport {
    pub stored:   Vec<Entry>,
    pub skipped:  Vec<SkippedFile>,
    /// Sessions committed by this append.
    pub sessions: usize,
    /// Write cursor after the append.
    pub position: u64,
}

impl AppendReport {
    /// Data-file bytes added, signatures included.
    pub fn stored_bytes(&self) -> u64 {
        self.stored.iter().map(|e| e.end() - e.offset).sum()
    }
}

pub struct Appender<'a> {
    paths:  &'a ArchivePaths,
    config: &'a ArchiveConfig,
}

impl<'a> Appender<'a> {
    pub fn new(paths: &'a ArchivePaths, config: &'a ArchiveConfig) -> Self {
        Self { paths, config }
    }

    // ── Prepare ──────────────────────────────────────────────────────────────

    pub fn prepare_file(&self, file: &Path, relative: String) -> Result<PreparedEntry> {
        if !entry::is_storable_path(&relative) {
            return Err(ArchiveError::InvalidPath(relative));
        }
        let source = |e| ArchiveError::SourceFile { path: file.to_path_buf(), source: e };
        let meta = fs::metadata(file).map_err(source)?;
        if meta.len() > self.config.max_file_size {
            return Err(ArchiveError::TooLarge {
                path:  file.to_path_buf(),
                size:  meta.len(),
                limit: self.config.max_file_size,
            });
        }
        let data = fs::read(file).map_err(source)?;
        let modified = meta.modified().map(unix_seconds).unwrap_or(0);
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.prepare_bytes(&data, relative, &name, modified)
    }

    pub fn prepare_bytes(
        &self,
        data:     &[u8],
        relative: String,
        name:     &str,
        modified: i64,
    ) -> Result<PreparedEntry> {
        if !entry::is_storable_path(&relative) {
            return Err(ArchiveError::InvalidPath(relative));
        }
        if data.len() as u64 > self.config.max_file_size {
            return Err(ArchiveError::TooLarge {
                path:  PathBuf::from(&relative),
                size:  data.len() as u64,
                limit: self.config.max_file_size,
            });
        }
        let container = container::seal(name, modified, data, self.config.codec, self.config.level)?;
        Ok(PreparedEntry {
            path: relative,
            hash: hash::digest(data),
            container,
            original_size: data.len() as u64,
        })
    }

    // ── Write ────────────────────────────────────────────────────────────────

    /// Store one prepared entry in a session of its own.
    pub fn commit_one(&self, prepared: &PreparedEntry) -> Result<Entry> {
        let mut session = Session::begin(self.paths, &prepared.path, self.config.sync)?;
        let entry = session.write(&prepared.container, prepared.hash, &prepared.path)?;
        session.commit()?;
        Ok(entry)
    }

    pub fn append_file(&self, file: &Path, base: &Path) -> Result<Entry> {
        let prepared = self.prepare_file(file, relative_path(base, file))?;
        let entry = self.commit_one(&prepared)?;
        info!("stored {} ({} bytes)", entry.path, prepared.original_size);
        Ok(entry)
    }

    pub fn append_bytes(&self, data: &[u8], relative: &str) -> Result<Entry> {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        let modified = unix_seconds(SystemTime::now());
        let prepared = self.prepare_bytes(data, relative.to_owned(), name, modified)?;
        self.commit_one(&prepared)
    }

    /// Walk `root` depth-first (bounded by `max_depth`) and store every
    /// regular file, with paths relative to `base`.
    pub fn append_folder(&self, root: &Path, base: &Path) -> Result<AppendReport> {
        let description = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        let walker = WalkBuilder::new(root)
            .max_depth(Some(self.config.max_depth))
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        // The archive triple may sit inside the folder being appended.
        let own_files: Vec<PathBuf> = [&self.paths.data, &self.paths.index, &self.paths.log]
            .into_iter()
            .filter_map(|p| fs::canonicalize(p).ok())
            .collect();

        let mut report = AppendReport::default();
        let mut session = match self.config.granularity {
            Granularity::Subtree => Some(Session::begin(self.paths, &description, self.config.sync)?),
            Granularity::PerFile => None,
        };

        for result in walker {
            let dir_entry = match result {
                Ok(e) => e,
                Err(e) => {
                    self.on_source_error(&mut report, &mut session, root.to_path_buf(), e.into())?;
                    continue;
                }
            };
            if !dir_entry.file_type().map_or(false, |t| t.is_file()) {
                continue;
            }
            let file = dir_entry.path();
            if own_files.iter().any(|own| own.as_path() == file) {
                debug!("not storing archive file {}", file.display());
                continue;
            }

            let prepared = match self.prepare_file(file, relative_path(base, file)) {
                Ok(p) => p,
                Err(e) => {
                    self.on_source_error(&mut report, &mut session, file.to_path_buf(), e)?;
                    continue;
                }
            };

            let entry = match session.as_mut() {
                Some(s) => s.write(&prepared.container, prepared.hash, &prepared.path)?,
                None => {
                    let entry = self.commit_one(&prepared)?;
                    report.sessions += 1;
                    entry
                }
            };
            debug!("stored {} at offset {}", entry.path, entry.offset);
            report.stored.push(entry);
        }

        report.position = match session {
            Some(s) => {
                report.sessions += 1;
                s.commit()?
            }
            None => self.paths.data_len()?,
        };
        info!(
            "{}: appended {} file(s) from {}, skipped {}",
            self.paths.name(),
            report.stored.len(),
            root.display(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn on_source_error(
        &self,
        report:  &mut AppendReport,
        session: &mut Option<Session>,
        path:    PathBuf,
        error:   ArchiveError,
    ) -> Result<()> {
        match self.config.on_error {
            ErrorPolicy::Skip => {
                warn!("skipping {}: {}", path.display(), error);
                report.skipped.push(SkippedFile { path, reason: error.to_string() });
                Ok(())
            }
            ErrorPolicy::Abort => {
                warn!("aborting append at {}: {}", path.display(), error);
                // Discard the uncommitted part right away.
                if let Some(open) = session.take() {
                    drop(open);
                    recovery::restore(self.paths)?;
                }
                Err(error)
            }
        }
    }
}

/// Strip `base` from `file` and render the rest with `/` separators and a
/// leading `/`.  Files outside `base` keep their full path.
pub fn relative_path(base: &Path, file: &Path) -> String {
    let rest = file.strip_prefix(base).unwrap_or(file);
    let mut out = String::new();
    for component in rest.components() {
        if let Component::Normal(part) = component {
            out.push('/');
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

fn unix_seconds(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
