//! Increment codec for relation files.
//!
//! An increment carries the pages of one relation file that changed after a
//! base LSN:
//!
//! ```text
//! 'w' 'i' '1' 0x55 | file size u64 | count u32 | count x block u32 | count x 8 KiB page
//! ```
//!
//! All integers are little-endian.

use std::io::Read;

use crate::{Error, Result};

pub mod apply;
pub mod reader;
pub mod source;

pub use apply::{apply_file_increment, create_file_from_increment, write_missing_pages};
pub use reader::IncrementalPageReader;
pub use source::{is_paged_file, open_paged_file, PagedFileSource};

pub const SIGNATURE_MAGIC: u8 = 0x55;
pub const INCREMENT_VERSION: u8 = b'1';
pub const INCREMENT_TAG: [u8; 4] = [b'w', b'i', INCREMENT_VERSION, SIGNATURE_MAGIC];
/// Tag, file size and block count.
pub const INCREMENT_HEADER_SIZE: u64 = 16;

/// Declared length of an increment carrying `blocks` pages.
pub fn increment_size(blocks: usize) -> u64 {
    INCREMENT_HEADER_SIZE + blocks as u64 * (4 + crate::page::PAGE_SIZE as u64)
}

/// Header of an increment stream, as read by the appliers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementHeader {
    pub file_size: u64,
    pub blocks: Vec<u32>,
}

impl IncrementHeader {
    /// Read and validate the tag, file size and diff map.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut tag = [0u8; 4];
        read_exact_or_eof(reader, &mut tag, "increment tag")?;
        if tag[0] != b'w' || tag[1] != b'i' || tag[3] != SIGNATURE_MAGIC {
            return Err(Error::InvalidIncrementHeader.into());
        }
        if tag[2] != INCREMENT_VERSION {
            return Err(Error::UnknownIncrementVersion(tag[2]).into());
        }

        let mut size = [0u8; 8];
        read_exact_or_eof(reader, &mut size, "increment file size")?;
        let mut count = [0u8; 4];
        read_exact_or_eof(reader, &mut count, "increment block count")?;
        let count = u32::from_le_bytes(count) as u64;

        let map = read_counted(reader, count * 4, "increment diff map")?;
        let blocks = map
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            file_size: u64::from_le_bytes(size),
            blocks,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&INCREMENT_TAG);
        out.extend_from_slice(&self.file_size.to_le_bytes());
        out.extend_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        for block in &self.blocks {
            out.extend_from_slice(&block.to_le_bytes());
        }
    }
}

/// `read_exact` that reports short input as [`Error::UnexpectedEof`].
pub(crate) fn read_exact_or_eof<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(Error::UnexpectedEof(what.to_string()).into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Read exactly `len` bytes, growing the buffer only as data arrives so a
/// corrupt length cannot force a huge allocation.
pub(crate) fn read_counted<R: Read>(reader: &mut R, len: u64, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(Error::UnexpectedEof(format!(
            "{what}: expected {len} bytes, got {}",
            buf.len()
        ))
        .into());
    }
    Ok(buf)
}

/// Fill `buf` as far as the reader allows; returns the number of bytes read.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
