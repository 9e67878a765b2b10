//! Content-addressed lookup and plain listing over the index.
//!
//! Each call opens its own pass over the index file and compares only the
//! fixed-width hash column, so a lookup never decompresses anything.

use crate::entry::{self, IndexLine};
use crate::error::Result;
use crate::hash::ContentHash;
use crate::iter::IndexReader;
use crate::layout::ArchivePaths;

/// Path of the first entry whose content hash is `hash`.
pub fn find_by_hash(paths: &ArchivePaths, hash: &ContentHash) -> Result<Option<String>> {
    let mut index = IndexReader::open(paths)?;
    while let Some(text) = index.next_text()? {
        if hash_matches(&index, &text, hash)? {
            return Ok(Some(parse(&index, &text)?.path));
        }
    }
    Ok(None)
}

/// Paths of every entry whose content hash is `hash`, in append order.
pub fn find_all_by_hash(paths: &ArchivePaths, hash: &ContentHash) -> Result<Vec<String>> {
    let mut index = IndexReader::open(paths)?;
    let mut found = Vec::new();
    while let Some(text) = index.next_text()? {
        if hash_matches(&index, &text, hash)? {
            found.push(parse(&index, &text)?.path);
        }
    }
    Ok(found)
}

/// Every index line, in append order.
pub fn list(paths: &ArchivePaths) -> Result<Vec<IndexLine>> {
    let mut index = IndexReader::open(paths)?;
    let mut lines = Vec::new();
    while let Some(line) = index.next_line()? {
        lines.push(line);
    }
    Ok(lines)
}

fn hash_matches(index: &IndexReader, text: &str, hash: &ContentHash) -> Result<bool> {
    entry::hash_field(text)
        .map(|found| &found == hash)
        .map_err(|e| index.corrupt(e))
}

fn parse(index: &IndexReader, text: &str) -> Result<IndexLine> {
    IndexLine::parse(text).map_err(|e| index.corrupt(e))
}
