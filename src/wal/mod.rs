//! Write-ahead log decoding: pages, records and the block locations they touch.

pub mod generator;
pub mod location;
pub mod page;
pub mod page_reader;
pub mod parser;
pub mod record;
pub mod segment;

pub use location::{BlockLocation, RelFileNode, TERMINAL_LOCATION};
pub use page_reader::WalPageReader;
pub use parser::{PageStatus, ParsedPage, WalParser};
pub use record::{extract_block_locations, XLogRecord};
pub use segment::WalSegmentName;

/// `XLOG_BLCKSZ`.
pub const WAL_PAGE_SIZE: usize = 8192;
/// `BLCKSZ`, the size of full-page images.
pub const BLOCK_SIZE: usize = 8192;
/// `MAXIMUM_ALIGNOF`.
pub const XLOG_RECORD_ALIGNMENT: usize = 8;
/// Default `wal_segment_size`.
pub const DEFAULT_WAL_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

pub(crate) fn align_up(pos: usize) -> usize {
    (pos + XLOG_RECORD_ALIGNMENT - 1) & !(XLOG_RECORD_ALIGNMENT - 1)
}
