//! Producer side of the increment codec.

use std::collections::{BTreeSet, VecDeque};
use std::io::{self, Read, Seek, SeekFrom};

use tracing::debug;

use super::{increment_size, read_full, IncrementHeader};
use crate::page::{classify, PAGE_SIZE};
use crate::{Error, Result};

/// Pages fetched ahead of the consumer.
const PREFETCH_DEPTH: usize = 2;

/// Lazily streams an increment of one relation file.
///
/// Construction scans the file (or takes a known block set), so the declared
/// size is available before the first byte is read. Page bodies are re-read
/// from the file on demand, at most [`PREFETCH_DEPTH`] pages ahead.
pub struct IncrementalPageReader<R> {
    file: R,
    declared_size: u64,
    blocks: Vec<u32>,
    next_block: usize,
    backlog: VecDeque<Vec<u8>>,
    current: Vec<u8>,
    current_pos: usize,
    emitted: u64,
}

impl<R: Read + Seek> IncrementalPageReader<R> {
    /// Scan `file` page by page and select pages changed at or after `base_lsn`.
    ///
    /// Fails with [`Error::InvalidPage`] on a page that is neither valid nor
    /// all-zero and with [`Error::UnexpectedEof`] on a trailing partial page.
    pub fn new(mut file: R, file_size: u64, base_lsn: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(0))?;
        let mut blocks = Vec::new();
        let mut page = vec![0u8; PAGE_SIZE];
        {
            let mut limited = (&mut file).take(file_size);
            let mut block: u32 = 0;
            loop {
                let n = read_full(&mut limited, &mut page)?;
                if n == 0 {
                    break;
                }
                if n < PAGE_SIZE {
                    return Err(Error::UnexpectedEof(format!(
                        "partial page {block}: {n} of {PAGE_SIZE} bytes"
                    ))
                    .into());
                }
                match classify(&page)?.changed_since(base_lsn) {
                    Some(true) => blocks.push(block),
                    Some(false) => {}
                    None => return Err(Error::InvalidPage { block }.into()),
                }
                block += 1;
            }
        }
        debug!(
            file_size,
            base_lsn,
            changed_blocks = blocks.len(),
            "increment_scan_finished"
        );
        Self::with_blocks(file, file_size, blocks)
    }

    /// Build an increment from a block set known in advance, e.g. from WAL
    /// delta files. Blocks past the end of the file are ignored.
    pub fn from_block_set(file: R, file_size: u64, blocks: &BTreeSet<u32>) -> Result<Self> {
        let page_count = file_size / PAGE_SIZE as u64;
        let blocks = blocks
            .iter()
            .copied()
            .filter(|b| (*b as u64) < page_count)
            .collect();
        Self::with_blocks(file, file_size, blocks)
    }

    fn with_blocks(file: R, file_size: u64, blocks: Vec<u32>) -> Result<Self> {
        let header = IncrementHeader { file_size, blocks };
        let mut current = Vec::with_capacity(16 + header.blocks.len() * 4);
        header.write_to(&mut current);
        Ok(Self {
            file,
            declared_size: increment_size(header.blocks.len()),
            blocks: header.blocks,
            next_block: 0,
            backlog: VecDeque::with_capacity(PREFETCH_DEPTH),
            current,
            current_pos: 0,
            emitted: 0,
        })
    }

    /// Total number of bytes this reader will produce.
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Block numbers in the diff map, ascending.
    pub fn blocks(&self) -> &[u32] {
        &self.blocks
    }

    fn fill_backlog(&mut self) -> Result<()> {
        while self.backlog.len() < PREFETCH_DEPTH && self.next_block < self.blocks.len() {
            let block = self.blocks[self.next_block];
            self.file
                .seek(SeekFrom::Start(block as u64 * PAGE_SIZE as u64))?;
            let mut page = vec![0u8; PAGE_SIZE];
            let n = read_full(&mut self.file, &mut page)?;
            if n < PAGE_SIZE {
                return Err(Error::UnexpectedEof(format!(
                    "page {block} shrank to {n} bytes after scan"
                ))
                .into());
            }
            self.backlog.push_back(page);
            self.next_block += 1;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for IncrementalPageReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.current_pos == self.current.len() {
            self.fill_backlog().map_err(into_io)?;
            match self.backlog.pop_front() {
                Some(page) => {
                    self.current = page;
                    self.current_pos = 0;
                }
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len() - self.current_pos);
        buf[..n].copy_from_slice(&self.current[self.current_pos..self.current_pos + n]);
        self.current_pos += n;
        self.emitted += n as u64;
        debug_assert!(self.emitted <= self.declared_size);
        Ok(n)
    }
}

fn into_io(err: anyhow::Error) -> io::Error {
    match err.downcast::<Error>() {
        Ok(err) => err.into_io(),
        Err(err) => match err.downcast::<io::Error>() {
            Ok(err) => err,
            Err(err) => io::Error::new(io::ErrorKind::Other, err.to_string()),
        },
    }
}
