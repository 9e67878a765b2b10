//! Index-bypass scanner: find entries in the data file without the index.
//!
//! # How it works
//!
//! Every entry starts with the 7-byte [`SIGNATURE`] followed by a
//! self-describing container header that declares the payload length.
//! The scanner reads forward from offset 0, one entry at a time:
//!
//! 1. If the signature is present and the header parses, the declared
//!    length gives the exact start of the next entry.
//! 2. Otherwise the scanner falls back to a byte scan for the next
//!    signature.  This is a degraded mode: a compressed payload that happens
//!    to contain the signature bytes ends the entry early.
//!
//! Without the index the stored path is lost, but the container still
//! carries the original file name, so the data remains usable.
//!
//! ## Entry health
//!
//! - `Healthy`: signature and header valid, payload fully present
//! - `HeaderCorrupt`: no signature, or header unreadable; region skipped
//! - `TruncatedPayload`: header valid but fewer bytes follow than declared
//! - `UnknownCodec`: header valid but `codec_id` is not in this build

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::codec::CodecId;
use crate::container::ContainerHeader;
use crate::entry::{SIGNATURE, SIGNATURE_LEN};

const SCAN_CHUNK: usize = 64 * 1024;

// ── Types ─────────────────────────────────────────────────────────────────────

/// The health verdict for one scanned entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryHealth {
    Healthy,
    HeaderCorrupt,
    TruncatedPayload { declared: u64, available: u64 },
    UnknownCodec { codec_id: u8 },
}

impl EntryHealth {
    pub fn is_usable(&self) -> bool {
        matches!(self, EntryHealth::Healthy)
    }
}

/// How the end of an entry was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Taken from the container header.
    Declared,
    /// Found by scanning for the next signature (or end of file).
    Scanned,
}

/// `[start, end)` of one entry in the data file, signature included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySpan {
    pub start:    u64,
    pub end:      u64,
    pub boundary: Boundary,
}

#[derive(Debug, Clone)]
pub struct ScannedEntry {
    /// Offset of the signature (or of the unreadable region).
    pub offset: u64,
    pub end:    u64,
    pub header: Option<ContainerHeader>,
    pub health: EntryHealth,
}

impl ScannedEntry {
    pub fn is_usable(&self) -> bool {
        self.health.is_usable() && self.header.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryQuality {
    /// Every entry healthy.
    Full,
    /// Some entries damaged.
    Partial,
    /// No usable entry.
    Catastrophic,
}

#[derive(Debug)]
pub struct ScanReport {
    pub total_scanned:        usize,
    pub healthy_entries:      usize,
    pub corrupt_entries:      usize,
    pub truncated_entries:    usize,
    pub unknown_codec_entries: usize,
    pub bytes_scanned:        u64,
    pub entries:              Vec<ScannedEntry>,
    /// Sum of `orig_size` over healthy entries.
    pub recoverable_bytes:    u64,
    pub quality:              RecoveryQuality,
}

impl ScanReport {
    pub fn health_pct(&self) -> f64 {
        if self.total_scanned == 0 { return 100.0; }
        self.healthy_entries as f64 / self.total_scanned as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        format!(
            "{:?} scan: {}/{} entries healthy ({:.1}%), {:.2} MiB recoverable",
            self.quality,
            self.healthy_entries,
            self.total_scanned,
            self.health_pct(),
            self.recoverable_bytes as f64 / 1024.0 / 1024.0,
        )
    }
}

// ── Boundary search ───────────────────────────────────────────────────────────

/// True when the signature sits at `offset`.
pub fn signature_at<R: Read + Seek>(reader: &mut R, offset: u64) -> io::Result<bool> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = [0u8; SIGNATURE.len()];
    match reader.read_exact(&mut buf) {
        Ok(())                                              => Ok(&buf == SIGNATURE),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e)                                              => Err(e),
    }
}

/// Offset of the next signature at or after `from`, by byte scan.
pub fn next_signature<R: Read + Seek>(reader: &mut R, from: u64) -> io::Result<Option<u64>> {
    reader.seek(SeekFrom::Start(from))?;
    let keep = SIGNATURE.len() - 1;
    let mut window: Vec<u8> = Vec::with_capacity(SCAN_CHUNK + keep);
    let mut window_start = from;
    let mut chunk = vec![0u8; SCAN_CHUNK];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        window.extend_from_slice(&chunk[..n]);
        if let Some(pos) = window.windows(SIGNATURE.len()).position(|w| w == SIGNATURE) {
            return Ok(Some(window_start + pos as u64));
        }
        // Carry the tail over in case a signature straddles two reads.
        if window.len() > keep {
            let drop = window.len() - keep;
            window.drain(..drop);
            window_start += drop as u64;
        }
    }
}

/// Work out where the entry starting at `offset` ends, without the index.
///
/// Prefers the length declared by the container header; falls back to the
/// signature byte scan when the header cannot be read.
pub fn entry_span_at<R: Read + Seek>(
    reader:   &mut R,
    offset:   u64,
    data_len: u64,
) -> io::Result<Option<EntrySpan>> {
    if !signature_at(reader, offset)? {
        return Ok(None);
    }
    let payload_start = offset + SIGNATURE_LEN;
    if let Ok(header) = ContainerHeader::read(&mut *reader) {
        let end = payload_start.saturating_add(header.total_len()).min(data_len);
        return Ok(Some(EntrySpan { start: offset, end, boundary: Boundary::Declared }));
    }
    let end = next_signature(reader, payload_start)?.unwrap_or(data_len);
    Ok(Some(EntrySpan { start: offset, end, boundary: Boundary::Scanned }))
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Walk the whole data stream and report every entry found.
///
/// Corrupt data never makes this return `Err`; it is encoded as
/// [`EntryHealth`] in the report.  Only genuine I/O errors propagate.
pub fn scan<R, F>(
    reader:       &mut R,
    mut progress: Option<&mut F>,
) -> io::Result<ScanReport>
where
    R: Read + Seek,
    F: FnMut(u64, u64),
{
    let data_len = reader.seek(SeekFrom::End(0))?;

    let mut entries           = Vec::new();
    let mut healthy           = 0usize;
    let mut corrupt           = 0usize;
    let mut truncated         = 0usize;
    let mut unknown_codec     = 0usize;
    let mut recoverable_bytes = 0u64;
    let mut pos               = 0u64;

    while pos < data_len {
        if !signature_at(reader, pos)? {
            // Garbage between entries: skip to the next signature.
            let next = next_signature(reader, pos + 1)?.unwrap_or(data_len);
            corrupt += 1;
            entries.push(ScannedEntry { offset: pos, end: next, header: None, health: EntryHealth::HeaderCorrupt });
            pos = next;
            continue;
        }

        let payload_start = pos + SIGNATURE_LEN;
        let entry = match ContainerHeader::read(&mut *reader) {
            Err(_) => {
                let next = next_signature(reader, payload_start)?.unwrap_or(data_len);
                corrupt += 1;
                ScannedEntry { offset: pos, end: next, header: None, health: EntryHealth::HeaderCorrupt }
            }
            Ok(header) => {
                let declared_end = payload_start.saturating_add(header.total_len());
                let health = if CodecId::from_id(header.codec_id).is_none() {
                    unknown_codec += 1;
                    EntryHealth::UnknownCodec { codec_id: header.codec_id }
                } else if declared_end > data_len {
                    truncated += 1;
                    EntryHealth::TruncatedPayload {
                        declared:  header.comp_size,
                        available: data_len.saturating_sub(payload_start.saturating_add(header.encoded_len())),
                    }
                } else {
                    healthy += 1;
                    recoverable_bytes += header.orig_size;
                    EntryHealth::Healthy
                };
                ScannedEntry { offset: pos, end: declared_end.min(data_len), header: Some(header), health }
            }
        };
        pos = entry.end;
        entries.push(entry);

        if let Some(ref mut cb) = progress {
            cb(pos, data_len);
        }
    }

    let total_scanned = entries.len();
    let quality = if total_scanned == 0 || healthy == total_scanned {
        RecoveryQuality::Full
    } else if healthy > 0 {
        RecoveryQuality::Partial
    } else {
        RecoveryQuality::Catastrophic
    };

    Ok(ScanReport {
        total_scanned,
        healthy_entries:       healthy,
        corrupt_entries:       corrupt,
        truncated_entries:     truncated,
        unknown_codec_entries: unknown_codec,
        bytes_scanned:         pos,
        entries,
        recoverable_bytes,
        quality,
    })
}

/// Convenience: scan the data file at `path`.
pub fn scan_file(path: &Path) -> io::Result<ScanReport> {
    let mut reader = BufReader::new(File::open(path)?);
    scan::<_, fn(u64, u64)>(&mut reader, None)
}
