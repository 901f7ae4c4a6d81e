//! Reassembly of WAL records across page boundaries.

use std::io::{Read, Write};

use super::page::XLogPageHeader;
use super::record::{XLogRecord, XLogRecordHeader, XLOG_RECORD_HEADER_SIZE};
use super::{align_up, WAL_PAGE_SIZE};
use crate::increment::{read_counted, read_exact_or_eof};
use crate::page::is_all_zero;
use crate::{Error, Result};

/// How a page ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Every written byte of the page was consumed.
    Complete,
    /// The record continued from the previous page runs past this page too.
    RecordContinues,
    /// Written data stops inside the page; the rest of it is zero.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    /// Bytes completing a record whose beginning the parser never saw.
    pub discarded_tail: Option<Vec<u8>>,
    pub records: Vec<XLogRecord>,
    pub status: PageStatus,
}

impl ParsedPage {
    pub fn ensure_complete(&self) -> Result<()> {
        match self.status {
            PageStatus::Partial => Err(Error::PartialPage.into()),
            _ => Ok(()),
        }
    }
}

/// Layout of one WAL page.
struct PageLayout<'a> {
    header: XLogPageHeader,
    prev_record_tail: &'a [u8],
    records: Vec<XLogRecord>,
    next_record_head: &'a [u8],
    status: PageStatus,
}

/// Carries a record that is split between pages from one page to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalParser {
    current_record: Vec<u8>,
    has_record_beginning: bool,
}

impl WalParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser resumed from the head of a record cut at a segment end.
    pub fn from_record_head(head: Vec<u8>) -> Self {
        Self {
            current_record: head,
            has_record_beginning: true,
        }
    }

    pub fn current_record(&self) -> &[u8] {
        &self.current_record
    }

    pub fn has_record_beginning(&self) -> bool {
        self.has_record_beginning
    }

    /// Forget any pending record, e.g. after a parse failure.
    pub fn invalidate(&mut self) {
        self.current_record.clear();
        self.has_record_beginning = false;
    }

    /// Decode the records completed on `page`.
    pub fn parse_records_from_page(&mut self, page: &[u8]) -> Result<ParsedPage> {
        let layout = self.parse_page(page)?;

        if layout.prev_record_tail.len() < layout.header.remaining_data_len as usize {
            self.current_record.extend_from_slice(layout.prev_record_tail);
            return Ok(ParsedPage {
                discarded_tail: None,
                records: Vec::new(),
                status: PageStatus::RecordContinues,
            });
        }

        let mut completed = std::mem::take(&mut self.current_record);
        completed.extend_from_slice(layout.prev_record_tail);
        let next_head = layout.next_record_head.to_vec();

        if !self.has_record_beginning {
            self.set_current_record(next_head);
            return Ok(ParsedPage {
                discarded_tail: Some(completed),
                records: layout.records,
                status: layout.status,
            });
        }

        let mut records = Vec::with_capacity(layout.records.len() + 1);
        if !completed.is_empty() {
            let header = XLogRecordHeader::parse(&completed)?;
            if header.total_record_length as usize != completed.len() {
                return Err(Error::ContinuationNotFound.into());
            }
            records.push(XLogRecord::parse(&completed)?);
        }
        records.extend(layout.records);
        self.set_current_record(next_head);
        Ok(ParsedPage {
            discarded_tail: None,
            records,
            status: layout.status,
        })
    }

    fn set_current_record(&mut self, head: Vec<u8>) {
        self.current_record = head;
        self.has_record_beginning = true;
    }

    fn parse_page<'a>(&self, page: &'a [u8]) -> Result<PageLayout<'a>> {
        if page.len() != WAL_PAGE_SIZE {
            return Err(Error::Parse {
                what: "WAL page",
                need: WAL_PAGE_SIZE,
                got: page.len(),
            }
            .into());
        }
        let header = XLogPageHeader::parse(page)?;
        let mut pos = header.size();

        let remaining = (header.remaining_data_len as usize).min(page.len() - pos);
        let prev_record_tail = &page[pos..pos + remaining];
        pos += remaining;

        let mut layout = PageLayout {
            header,
            prev_record_tail,
            records: Vec::new(),
            next_record_head: &[],
            status: PageStatus::Complete,
        };
        if remaining < header.remaining_data_len as usize {
            return Ok(layout);
        }

        if self.has_record_beginning
            && !self.current_record.is_empty()
            && self.current_record.len() + remaining >= XLOG_RECORD_HEADER_SIZE
        {
            let mut joined = self.current_record.clone();
            joined.extend_from_slice(prev_record_tail);
            if XLogRecordHeader::parse(&joined)?.is_wal_switch() {
                return Ok(layout);
            }
        }

        loop {
            pos = align_up(pos);
            if pos >= page.len() {
                break;
            }
            let rest = &page[pos..];
            let total = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            if total == 0 {
                if is_all_zero(rest) {
                    layout.status = PageStatus::Partial;
                    break;
                }
                return Err(Error::InvalidRecord(format!(
                    "zero record length at page offset {pos} before written data"
                ))
                .into());
            }
            if rest.len() >= XLOG_RECORD_HEADER_SIZE {
                XLogRecordHeader::parse(rest)?.validate()?;
            }
            if total > rest.len() {
                layout.next_record_head = rest;
                break;
            }
            let record = XLogRecord::parse(&rest[..total])?;
            pos += total;
            let switch = record.is_wal_switch();
            layout.records.push(record);
            if switch {
                break;
            }
        }
        Ok(layout)
    }

    /// Persist the pending record bytes: `u32` little-endian length, then
    /// the bytes.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        if !self.current_record.is_empty() && !self.has_record_beginning {
            return Err(Error::CantSavePartialParser.into());
        }
        writer.write_all(&(self.current_record.len() as u32).to_le_bytes())?;
        writer.write_all(&self.current_record)?;
        Ok(())
    }

    pub fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let mut len = [0u8; 4];
        read_exact_or_eof(reader, &mut len, "WAL parser state length")?;
        let current_record =
            read_counted(reader, u32::from_le_bytes(len) as u64, "WAL parser state")?;
        Ok(Self {
            has_record_beginning: !current_record.is_empty(),
            current_record,
        })
    }
}
