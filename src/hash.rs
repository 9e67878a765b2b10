use std::fmt;
use std::fs::File;
use std::io::{self, copy, Read};
use std::path::Path;
use std::str::FromStr;

use sha1::{Digest, Sha1};

/// Length of a rendered digest in the index.
pub const HASH_HEX_LEN: usize = 40;

/// SHA-1 fingerprint of a stored file's original (uncompressed) bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 20]);

impl ContentHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    /// Accepts exactly 40 hex characters, either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 20];
        hex::decode_to_slice(s, &mut out)?;
        Ok(ContentHash(out))
    }
}

pub fn digest(data: &[u8]) -> ContentHash {
    ContentHash(Sha1::digest(data).into())
}

pub fn digest_reader<R: Read>(data: &mut R) -> io::Result<ContentHash> {
    let mut hasher = Sha1::new();
    copy(data, &mut hasher)?;
    Ok(ContentHash(hasher.finalize().into()))
}

pub fn digest_file(path: &Path) -> io::Result<ContentHash> {
    digest_reader(&mut File::open(path)?)
}
