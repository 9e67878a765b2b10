pub mod codec;
pub mod container;
pub mod hash;
pub mod entry;
pub mod layout;
pub mod recovery;
pub mod session;
pub mod append;
pub mod reader;
pub mod iter;
pub mod search;
pub mod config;
pub mod error;
pub mod archive;

pub use archive::Archive;
pub use append::AppendReport;
pub use codec::{CodecId, get_codec};
pub use config::{ArchiveConfig, ErrorPolicy, Granularity};
pub use entry::{Entry, IndexLine, LogLine, SIGNATURE};
pub use error::{ArchiveError, Result};
pub use hash::ContentHash;
pub use iter::{Entries, ResumePoint};
pub use reader::Extracted;
pub use recovery::RecoveryOutcome;
