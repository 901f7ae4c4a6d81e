//! Synthetic WAL for tests and tooling.
//!
//! Records are laid out the way PostgreSQL writes them: 8-byte aligned,
//! split across pages with continuation headers, and with a long page header
//! at the start of every segment.

use super::page::{
    XLogLongPageFields, XLogPageHeader, XLP_BKP_REMOVABLE, XLP_FIRST_IS_CONTRECORD,
    XLP_LONG_HEADER,
};
use super::record::{XLogRecord, XLogRecordHeader, XLOG_RECORD_HEADER_SIZE, XLOG_SWITCH};
use super::segment::WalSegmentName;
use super::{align_up, WAL_PAGE_SIZE};

/// Page magic written into generated headers (PostgreSQL 13).
pub const XLOG_PAGE_MAGIC: u16 = 0xD106;
const SYSTEM_ID: u64 = 7_000_000_000_000_000_001;

/// Appends records to an in-memory WAL starting at a segment boundary.
pub struct WalGenerator {
    timeline: u32,
    wal_segment_size: u64,
    start_lsn: u64,
    lsn: u64,
    prev_lsn: u64,
    wal: Vec<u8>,
}

impl WalGenerator {
    /// `start_segment` is the absolute segment number of the first segment.
    pub fn new(timeline: u32, start_segment: u64, wal_segment_size: u64) -> Self {
        let start_lsn = start_segment * wal_segment_size;
        Self {
            timeline,
            wal_segment_size,
            start_lsn,
            lsn: start_lsn,
            prev_lsn: 0,
            wal: Vec::new(),
        }
    }

    /// Current insert position.
    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    /// Append `record`; returns its start LSN.
    pub fn append_record(&mut self, record: &XLogRecord) -> u64 {
        let mut record = record.clone();
        record.header.prev_record_ptr = self.prev_lsn;
        let encoded = record.encode();
        self.append_encoded(&encoded)
    }

    /// Append already encoded record bytes; returns the record start LSN.
    pub fn append_encoded(&mut self, encoded: &[u8]) -> u64 {
        if self.page_offset() == 0 {
            self.write_page_header(0);
        }
        let start = self.lsn;
        let mut rest = encoded;
        while !rest.is_empty() {
            if self.page_offset() == 0 {
                self.write_page_header(rest.len() as u32);
            }
            let room = WAL_PAGE_SIZE - self.page_offset();
            let n = room.min(rest.len());
            self.push(&rest[..n]);
            rest = &rest[n..];
        }
        let aligned = align_up(self.page_offset());
        let pad = aligned - self.page_offset();
        self.push(&vec![0u8; pad]);
        self.prev_lsn = start;
        start
    }

    /// Append an `XLOG_SWITCH` record and zero-fill the rest of the segment.
    pub fn switch_segment(&mut self) -> u64 {
        let switch = XLogRecord {
            header: XLogRecordHeader {
                total_record_length: XLOG_RECORD_HEADER_SIZE as u32,
                info: XLOG_SWITCH,
                ..Default::default()
            },
            ..Default::default()
        };
        let start = self.append_record(&switch);
        self.pad_to_segment_end();
        start
    }

    /// Zero-fill up to the next segment boundary, as an unwritten tail.
    pub fn pad_to_segment_end(&mut self) {
        let rem = (self.lsn % self.wal_segment_size) as usize;
        if rem != 0 {
            let pad = self.wal_segment_size as usize - rem;
            self.push(&vec![0u8; pad]);
        }
    }

    /// Finished WAL split into named segments; the last one is zero-padded.
    pub fn into_segments(mut self) -> Vec<(String, Vec<u8>)> {
        self.pad_to_segment_end();
        let first = self.start_lsn / self.wal_segment_size;
        self.wal
            .chunks(self.wal_segment_size as usize)
            .enumerate()
            .map(|(i, chunk)| {
                let name =
                    WalSegmentName::new(self.timeline, first + i as u64, self.wal_segment_size);
                (name.to_string(), chunk.to_vec())
            })
            .collect()
    }

    fn page_offset(&self) -> usize {
        (self.lsn % WAL_PAGE_SIZE as u64) as usize
    }

    fn write_page_header(&mut self, remaining_data_len: u32) {
        let mut info = XLP_BKP_REMOVABLE;
        if remaining_data_len > 0 {
            info |= XLP_FIRST_IS_CONTRECORD;
        }
        let long = if self.lsn % self.wal_segment_size == 0 {
            info |= XLP_LONG_HEADER;
            Some(XLogLongPageFields {
                system_id: SYSTEM_ID,
                segment_size: self.wal_segment_size as u32,
                block_size: WAL_PAGE_SIZE as u32,
            })
        } else {
            None
        };
        let header = XLogPageHeader {
            magic: XLOG_PAGE_MAGIC,
            info,
            timeline: self.timeline,
            page_address: self.lsn,
            remaining_data_len,
            long,
        };
        self.push(&header.encode());
    }

    fn push(&mut self, bytes: &[u8]) {
        self.wal.extend_from_slice(bytes);
        self.lsn += bytes.len() as u64;
    }
}
