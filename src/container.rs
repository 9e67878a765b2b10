//! Single-file container wrapped around every stored payload.
//!
//! Each entry in the data file is `SIGNATURE || container`, where the
//! container is a small self-describing header followed by the compressed
//! bytes of exactly one logical file.  The header keeps the original file
//! name and modification time so an entry stays meaningful even when the
//! index is lost.
//!
//! # Layout (little-endian)
//!
//! | Field       | Size | Notes                                   |
//! |-------------|------|-----------------------------------------|
//! | magic       | 2    | `"BZ"`                                  |
//! | version     | 1    | [`CONTAINER_VERSION`]                   |
//! | codec_id    | 1    | see [`crate::codec`]                    |
//! | flags       | 2    | reserved, always 0                      |
//! | name_len    | 2    | bytes of UTF-8 name that follow         |
//! | modified    | 8    | unix seconds, signed                    |
//! | orig_size   | 8    | uncompressed length                     |
//! | comp_size   | 8    | compressed payload length               |
//! | checksum    | 4    | CRC32 of the compressed payload         |
//! | name        | var  |                                         |
//! | payload     | var  | `comp_size` bytes                       |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::codec::{get_codec, get_codec_by_id, CodecError, CodecId};

pub const CONTAINER_MAGIC:   [u8; 2] = *b"BZ";
pub const CONTAINER_VERSION: u8      = 1;
/// Size of the fixed part of the header, before the name.
pub const FIXED_HEADER_SIZE: usize   = 36;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Invalid container magic")]
    InvalidMagic,
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u8),
    #[error("File name too long for container: {0} bytes")]
    NameTooLong(usize),
    #[error("File name is not valid UTF-8")]
    InvalidName,
    #[error("Payload truncated: header declares {declared} bytes, {available} available")]
    Truncated { declared: u64, available: u64 },
    #[error("Checksum mismatch: expected {expected:08x}, found {found:08x}")]
    ChecksumMismatch { expected: u32, found: u32 },
    #[error("Decoded size mismatch: expected {expected}, found {found}")]
    SizeMismatch { expected: u64, found: u64 },
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub codec_id:  u8,
    pub flags:     u16,
    pub name:      String,
    pub modified:  i64,
    pub orig_size: u64,
    pub comp_size: u64,
    pub checksum:  u32,
}

impl ContainerHeader {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&CONTAINER_MAGIC)?;
        writer.write_u8(CONTAINER_VERSION)?;
        writer.write_u8(self.codec_id)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.name.len() as u16)?;
        writer.write_i64::<LittleEndian>(self.modified)?;
        writer.write_u64::<LittleEndian>(self.orig_size)?;
        writer.write_u64::<LittleEndian>(self.comp_size)?;
        writer.write_u32::<LittleEndian>(self.checksum)?;
        writer.write_all(self.name.as_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, ContainerError> {
        let mut magic = [0u8; 2];
        reader.read_exact(&mut magic)?;
        if magic != CONTAINER_MAGIC {
            return Err(ContainerError::InvalidMagic);
        }
        let version = reader.read_u8()?;
        if version != CONTAINER_VERSION {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        let codec_id  = reader.read_u8()?;
        let flags     = reader.read_u16::<LittleEndian>()?;
        let name_len  = reader.read_u16::<LittleEndian>()? as usize;
        let modified  = reader.read_i64::<LittleEndian>()?;
        let orig_size = reader.read_u64::<LittleEndian>()?;
        let comp_size = reader.read_u64::<LittleEndian>()?;
        let checksum  = reader.read_u32::<LittleEndian>()?;
        let mut name  = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name).map_err(|_| ContainerError::InvalidName)?;
        Ok(Self { codec_id, flags, name, modified, orig_size, comp_size, checksum })
    }

    /// Bytes occupied by the header itself.
    pub fn encoded_len(&self) -> u64 {
        (FIXED_HEADER_SIZE + self.name.len()) as u64
    }

    /// Bytes occupied by header plus payload.
    pub fn total_len(&self) -> u64 {
        self.encoded_len().saturating_add(self.comp_size)
    }
}

/// One logical file recovered from a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsealed {
    pub name:     String,
    pub modified: i64,
    pub data:     Vec<u8>,
}

/// Compress `data` into a self-describing container.
pub fn seal(
    name:     &str,
    modified: i64,
    data:     &[u8],
    codec_id: CodecId,
    level:    i32,
) -> Result<Vec<u8>, ContainerError> {
    if name.len() > u16::MAX as usize {
        return Err(ContainerError::NameTooLong(name.len()));
    }
    let payload = get_codec(codec_id).compress(data, level)?;
    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let header = ContainerHeader {
        codec_id:  codec_id.id(),
        flags:     0,
        name:      name.to_owned(),
        modified,
        orig_size: data.len() as u64,
        comp_size: payload.len() as u64,
        checksum:  hasher.finalize(),
    };
    let mut out = Vec::with_capacity(header.encoded_len() as usize + payload.len());
    header.write(&mut out)?;
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a container.  Bytes past the declared payload length are ignored.
pub fn unseal(bytes: &[u8]) -> Result<Unsealed, ContainerError> {
    let mut cursor = io::Cursor::new(bytes);
    let header = ContainerHeader::read(&mut cursor)?;
    let start = cursor.position();
    let available = bytes.len() as u64 - start;
    if available < header.comp_size {
        return Err(ContainerError::Truncated { declared: header.comp_size, available });
    }
    let payload = &bytes[start as usize..(start + header.comp_size) as usize];

    let mut hasher = Hasher::new();
    hasher.update(payload);
    let found = hasher.finalize();
    if found != header.checksum {
        return Err(ContainerError::ChecksumMismatch { expected: header.checksum, found });
    }

    let data = get_codec_by_id(header.codec_id)?.decompress(payload)?;
    if data.len() as u64 != header.orig_size {
        return Err(ContainerError::SizeMismatch {
            expected: header.orig_size,
            found:    data.len() as u64,
        });
    }
    Ok(Unsealed { name: header.name, modified: header.modified, data })
}
