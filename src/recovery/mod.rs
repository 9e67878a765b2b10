//! Crash recovery for the archive triple.
//!
//! Every write session opens with a `start:` log line carrying the data
//! offset it began at, and closes with an `ended:` line.  A log whose last
//! line is `start:` therefore records a session that never finished; the
//! data file, index and log are rolled back to that offset before anything
//! new is written.
//!
//! Rollback order is data → index → log.  The dangling `start:` line is the
//! last thing removed, so a crash during recovery leaves the trigger in place
//! and the next run repeats it.

pub mod scanner;

use std::fs::OpenOptions;

use log::{error, info, warn};

use crate::entry::{self, IndexLine, LogLine};
use crate::error::{ArchiveError, Result};
use crate::layout::{self, ArchivePaths};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Nothing was pending; `position` is the data file length.
    Clean { position: u64 },
    /// An interrupted session was discarded.
    Restored {
        position:            u64,
        dropped_bytes:       u64,
        dropped_index_lines: usize,
    },
}

impl RecoveryOutcome {
    /// Write cursor after recovery.
    pub fn position(&self) -> u64 {
        match self {
            RecoveryOutcome::Clean { position } | RecoveryOutcome::Restored { position, .. } => {
                *position
            }
        }
    }

    pub fn was_restored(&self) -> bool {
        matches!(self, RecoveryOutcome::Restored { .. })
    }
}

/// Bring the three files back to the last committed boundary.
///
/// Running this twice in a row is a no-op the second time.
pub fn restore(paths: &ArchivePaths) -> Result<RecoveryOutcome> {
    let mut dropped_torn_line = false;
    loop {
        let tail = match layout::last_line(&paths.log)? {
            Some(line) if !entry::is_header(&line) => line,
            _ => return clean(paths, None),
        };

        match LogLine::parse(&tail) {
            Ok(LogLine::Ended { offset, .. }) => return clean(paths, Some(offset)),
            Ok(LogLine::Start { offset, .. }) => return roll_back(paths, offset),
            Err(source) if !dropped_torn_line => {
                // A crash while the log line itself was being written.
                warn!(
                    "{}: dropping torn log line {:?} ({source})",
                    paths.name(),
                    tail
                );
                drop_last_log_line(paths)?;
                dropped_torn_line = true;
            }
            Err(source) => {
                let line = layout::read_lines(&paths.log)?.len() as u64;
                return Err(ArchiveError::CorruptLog { line, source });
            }
        }
    }
}

/// Restore point of an unfinished session, if the log ends on `start:`.
/// Read-only; use [`restore`] to act on it.
pub fn pending(paths: &ArchivePaths) -> Result<Option<u64>> {
    Ok(match layout::last_line(&paths.log)? {
        Some(line) => match LogLine::parse(&line) {
            Ok(LogLine::Start { offset, .. }) => Some(offset),
            _ => None,
        },
        None => None,
    })
}

fn clean(paths: &ArchivePaths, committed: Option<u64>) -> Result<RecoveryOutcome> {
    let actual = paths.data_len()?;
    let offset = match committed {
        Some(offset) => offset,
        None => return Ok(RecoveryOutcome::Clean { position: actual }),
    };
    if actual < offset {
        // Committed bytes are gone; writing at `actual` would orphan index lines.
        error!(
            "{}: data file is {} bytes, shorter than last committed offset {}",
            paths.name(),
            actual,
            offset
        );
        return Err(ArchiveError::TruncationFailed { expected: offset, actual });
    }
    if actual == offset {
        return Ok(RecoveryOutcome::Clean { position: offset });
    }

    warn!(
        "{}: {} bytes past last committed offset {} belong to no session",
        paths.name(),
        actual - offset,
        offset
    );
    truncate_data(paths, offset, actual)?;
    let dropped_index_lines = drop_index_tail(paths, offset)?;
    Ok(RecoveryOutcome::Restored {
        position:      offset,
        dropped_bytes: actual - offset,
        dropped_index_lines,
    })
}

fn roll_back(paths: &ArchivePaths, restore_point: u64) -> Result<RecoveryOutcome> {
    let actual = paths.data_len()?;
    warn!(
        "{}: previous write session did not finish, restoring last saved point at offset {}",
        paths.name(),
        restore_point
    );

    if actual < restore_point {
        error!(
            "{}: data file is {} bytes, shorter than restore point {}",
            paths.name(),
            actual,
            restore_point
        );
        return Err(ArchiveError::TruncationFailed { expected: restore_point, actual });
    }
    truncate_data(paths, restore_point, actual)?;

    let dropped_index_lines = drop_index_tail(paths, restore_point)?;
    drop_last_log_line(paths)?;

    info!(
        "{}: restored to offset {} ({} bytes and {} index lines discarded)",
        paths.name(),
        restore_point,
        actual - restore_point,
        dropped_index_lines
    );
    Ok(RecoveryOutcome::Restored {
        position:      restore_point,
        dropped_bytes: actual - restore_point,
        dropped_index_lines,
    })
}

/// Cut the data file from `actual` bytes down to `point` and check the result.
fn truncate_data(paths: &ArchivePaths, point: u64, actual: u64) -> Result<()> {
    if actual > point {
        warn!(
            "{}: truncating data file from {} to {} bytes",
            paths.name(),
            actual,
            point
        );
        let file = OpenOptions::new().write(true).open(&paths.data)?;
        file.set_len(point)?;
        file.sync_all()?;
    }

    let now = paths.data_len()?;
    if now != point {
        error!("{}: failed to restore last saved point", paths.name());
        return Err(ArchiveError::TruncationFailed { expected: point, actual: now });
    }
    Ok(())
}

/// Keep the header and every index line whose offset lies before
/// `restore_point`.  Returns how many lines were dropped.
fn drop_index_tail(paths: &ArchivePaths, restore_point: u64) -> Result<usize> {
    let lines = layout::read_lines(&paths.index)?;
    let last_content = lines.iter().rposition(|l| !l.trim().is_empty());

    let mut kept = Vec::with_capacity(lines.len());
    let mut dropped = 0usize;
    for (i, line) in lines.into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if i == 0 && entry::is_header(&line) {
            kept.push(line);
            continue;
        }
        match IndexLine::parse(&line) {
            Ok(parsed) if parsed.offset < restore_point => kept.push(line),
            Ok(_) => dropped += 1,
            // Only the final line can have been cut short by the crash.
            Err(_) if Some(i) == last_content => dropped += 1,
            Err(source) => {
                return Err(ArchiveError::CorruptIndex { line: i as u64 + 1, source });
            }
        }
    }

    if dropped > 0 {
        warn!(
            "{}: deleting {} index line(s) at or after offset {}",
            paths.name(),
            dropped,
            entry::format_offset(restore_point).unwrap_or_else(|_| restore_point.to_string())
        );
        layout::rewrite_lines(&paths.index, &kept)?;
    }
    Ok(dropped)
}

fn drop_last_log_line(paths: &ArchivePaths) -> Result<()> {
    let mut lines = layout::read_lines(&paths.log)?;
    while lines.last().map_or(false, |l| l.trim().is_empty()) {
        lines.pop();
    }
    if let Some(last) = lines.pop() {
        warn!("{}: removing log line {:?}", paths.name(), last);
    }
    layout::rewrite_lines(&paths.log, &lines)?;
    Ok(())
}
