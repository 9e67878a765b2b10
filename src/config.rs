use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::CodecId;

/// Default Zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
/// Files above this size are not stored (100 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000 * 100;
/// Directory levels walked below the folder being appended.
pub const DEFAULT_MAX_DEPTH: usize = 25;
pub const DEFAULT_OWNER: &str = "bigzip";

/// How many stored files one `start`/`ended` session covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One session for a whole folder append: a crash rolls back every
    /// file stored since the folder started.
    #[default]
    Subtree,
    /// One session per stored file: a crash loses only the file in flight.
    PerFile,
}

/// What a folder append does when one input file cannot be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the file and carry on with the next one.
    #[default]
    Skip,
    /// Stop the append and return the error; nothing of the open session
    /// is committed.
    Abort,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Owner string stamped into the index/log headers.
    pub owner:         String,
    pub codec:         CodecId,
    pub level:         i32,
    pub max_file_size: u64,
    pub max_depth:     usize,
    pub granularity:   Granularity,
    pub on_error:      ErrorPolicy,
    /// fsync the data, index and log files at every commit boundary.
    pub sync:          bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            owner:         DEFAULT_OWNER.to_owned(),
            codec:         CodecId::Zstd,
            level:         DEFAULT_COMPRESSION_LEVEL,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_depth:     DEFAULT_MAX_DEPTH,
            granularity:   Granularity::Subtree,
            on_error:      ErrorPolicy::Skip,
            sync:          true,
        }
    }
}

impl ArchiveConfig {
    /// Load a JSON config file; absent fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_max_file_size(mut self, limit: u64) -> Self {
        self.max_file_size = limit;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_codec(mut self, codec: CodecId, level: i32) -> Self {
        self.codec = codec;
        self.level = level;
        self
    }
}
