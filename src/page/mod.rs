//! PostgreSQL data page header parsing and validation.
//!
//! Every 8 KiB page of a relation file starts with a 24-byte header. The
//! increment reader uses it to decide whether a page changed after a base LSN.

use crate::{Error, Result};

/// PostgreSQL page size (`BLCKSZ`, 8 KiB).
pub const PAGE_SIZE: usize = 8192;
/// Size of `PageHeaderData`.
pub const PAGE_HEADER_SIZE: usize = 24;
/// `PD_VALID_FLAG_BITS`.
const VALID_FLAGS: u16 = 0x0007;
/// `PG_PAGE_LAYOUT_VERSION`.
const LAYOUT_VERSION: u16 = 4;
const INVALID_LSN: u64 = 0;

/// Parsed view of `PageHeaderData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageHeader {
    pub lsn_hi: u32,
    pub lsn_lo: u32,
    pub checksum: u16,
    pub flags: u16,
    pub lower: u16,
    pub upper: u16,
    pub special: u16,
    pub pagesize_version: u16,
    pub prune_xid: u32,
}

impl PageHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PAGE_HEADER_SIZE {
            return Err(Error::Parse {
                what: "page header",
                need: PAGE_HEADER_SIZE,
                got: bytes.len(),
            }
            .into());
        }
        let u16_at = |off: usize| u16::from_le_bytes([bytes[off], bytes[off + 1]]);
        let u32_at = |off: usize| {
            u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };
        Ok(Self {
            lsn_hi: u32_at(0),
            lsn_lo: u32_at(4),
            checksum: u16_at(8),
            flags: u16_at(10),
            lower: u16_at(12),
            upper: u16_at(14),
            special: u16_at(16),
            pagesize_version: u16_at(18),
            prune_xid: u32_at(20),
        })
    }

    pub fn lsn(&self) -> u64 {
        ((self.lsn_hi as u64) << 32) | self.lsn_lo as u64
    }

    pub fn is_valid(&self) -> bool {
        self.flags & VALID_FLAGS == self.flags
            && self.lower as usize >= PAGE_HEADER_SIZE
            && self.lower <= self.upper
            && self.upper <= self.special
            && self.special as usize <= PAGE_SIZE
            && self.lsn() != INVALID_LSN
            && self.pagesize_version == PAGE_SIZE as u16 + LAYOUT_VERSION
    }
}

/// How a page relates to a base LSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Valid header; the page was modified at `lsn`.
    Valid { lsn: u64 },
    /// Entire page is zero bytes (extended but never written).
    AllZero,
    /// Header fails validation and the page is not all-zero.
    Invalid,
}

impl PageState {
    /// Whether the page must be shipped in an increment taken after `base_lsn`.
    pub fn changed_since(&self, base_lsn: u64) -> Option<bool> {
        match self {
            PageState::Valid { lsn } => Some(*lsn >= base_lsn),
            PageState::AllZero => Some(true),
            PageState::Invalid => None,
        }
    }
}

pub fn is_all_zero(page: &[u8]) -> bool {
    page.iter().all(|b| *b == 0)
}

/// Classify a full page.
pub fn classify(page: &[u8]) -> Result<PageState> {
    let header = PageHeader::parse(page)?;
    if header.is_valid() {
        return Ok(PageState::Valid { lsn: header.lsn() });
    }
    if is_all_zero(page) {
        Ok(PageState::AllZero)
    } else {
        Ok(PageState::Invalid)
    }
}
