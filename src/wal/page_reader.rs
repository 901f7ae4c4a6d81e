use std::io::Read;

use super::WAL_PAGE_SIZE;
use crate::increment::read_full;
use crate::{Error, Result};

/// Splits a WAL segment stream into 8 KiB pages.
pub struct WalPageReader<R> {
    inner: R,
}

impl<R: Read> WalPageReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next page, or `None` at a page-aligned end of stream. A trailing
    /// partial page is an [`Error::UnexpectedEof`].
    pub fn read_page(&mut self) -> Result<Option<Vec<u8>>> {
        let mut page = vec![0u8; WAL_PAGE_SIZE];
        match read_full(&mut self.inner, &mut page)? {
            0 => Ok(None),
            WAL_PAGE_SIZE => Ok(Some(page)),
            n => Err(Error::UnexpectedEof(format!(
                "partial WAL page: {n} of {WAL_PAGE_SIZE} bytes"
            ))
            .into()),
        }
    }
}

impl<R: Read> Iterator for WalPageReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_page().transpose()
    }
}
