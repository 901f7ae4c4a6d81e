//! WAL page headers (`XLogPageHeaderData` / `XLogLongPageHeaderData`).

use bytes::Buf;

use crate::page::is_all_zero;
use crate::{Error, Result};

pub const XLP_FIRST_IS_CONTRECORD: u16 = 0x0001;
pub const XLP_LONG_HEADER: u16 = 0x0002;
pub const XLP_BKP_REMOVABLE: u16 = 0x0004;
pub const XLP_FIRST_IS_OVERWRITE_CONTRECORD: u16 = 0x0008;
pub const XLP_ALL_FLAGS: u16 = 0x000F;

/// Short header, MAXALIGNed.
pub const SHORT_PAGE_HEADER_SIZE: usize = 24;
pub const LONG_PAGE_HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XLogPageHeader {
    pub magic: u16,
    pub info: u16,
    pub timeline: u32,
    pub page_address: u64,
    pub remaining_data_len: u32,
    /// Present only on long headers (first page of a segment).
    pub long: Option<XLogLongPageFields>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XLogLongPageFields {
    pub system_id: u64,
    pub segment_size: u32,
    pub block_size: u32,
}

impl XLogPageHeader {
    /// Parse the header at the start of `page`.
    ///
    /// A header made of zeroes means the page was never written: the result
    /// is [`Error::ZeroPage`] when the whole page is zero, otherwise the page
    /// is treated as corrupt.
    pub fn parse(page: &[u8]) -> Result<Self> {
        if page.len() < SHORT_PAGE_HEADER_SIZE {
            return Err(Error::Parse {
                what: "WAL page header",
                need: SHORT_PAGE_HEADER_SIZE,
                got: page.len(),
            }
            .into());
        }
        let mut buf = page;
        let mut header = XLogPageHeader {
            magic: buf.get_u16_le(),
            info: buf.get_u16_le(),
            timeline: buf.get_u32_le(),
            page_address: buf.get_u64_le(),
            remaining_data_len: buf.get_u32_le(),
            long: None,
        };
        buf.advance(4);

        if header.is_zero() {
            if is_all_zero(page) {
                return Err(Error::ZeroPage.into());
            }
            return Err(Error::InvalidWalPageHeader("zero header on a non-empty page".into()).into());
        }
        if header.info & !XLP_ALL_FLAGS != 0 {
            return Err(Error::InvalidWalPageHeader(format!(
                "unknown flags {:#06x}",
                header.info
            ))
            .into());
        }
        if header.info & XLP_LONG_HEADER != 0 {
            if page.len() < LONG_PAGE_HEADER_SIZE {
                return Err(Error::Parse {
                    what: "WAL long page header",
                    need: LONG_PAGE_HEADER_SIZE,
                    got: page.len(),
                }
                .into());
            }
            header.long = Some(XLogLongPageFields {
                system_id: buf.get_u64_le(),
                segment_size: buf.get_u32_le(),
                block_size: buf.get_u32_le(),
            });
        }
        Ok(header)
    }

    pub fn size(&self) -> usize {
        if self.long.is_some() {
            LONG_PAGE_HEADER_SIZE
        } else {
            SHORT_PAGE_HEADER_SIZE
        }
    }

    pub fn is_zero(&self) -> bool {
        self.magic == 0
            && self.info == 0
            && self.timeline == 0
            && self.page_address == 0
            && self.remaining_data_len == 0
    }

    /// Encode into the on-disk layout, including alignment padding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.info.to_le_bytes());
        out.extend_from_slice(&self.timeline.to_le_bytes());
        out.extend_from_slice(&self.page_address.to_le_bytes());
        out.extend_from_slice(&self.remaining_data_len.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        if let Some(long) = &self.long {
            out.extend_from_slice(&long.system_id.to_le_bytes());
            out.extend_from_slice(&long.segment_size.to_le_bytes());
            out.extend_from_slice(&long.block_size.to_le_bytes());
        }
        out
    }
}
