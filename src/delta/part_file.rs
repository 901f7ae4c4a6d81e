//! Per-group accumulator of record fragments cut by segment boundaries.

use std::io::{Read, Write};

use crate::increment::{read_counted, read_exact_or_eof, read_full};
use crate::wal::record::XLogRecord;
use crate::{Error, Result};

const PART_MAGIC: &[u8; 8] = b"PGDPART\0";
const PART_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum PartKind {
    Tail = 0,
    PreviousHead = 1,
    Head = 2,
}

impl TryFrom<u8> for PartKind {
    type Error = Error;

    fn try_from(value: u8) -> std::result::Result<Self, Error> {
        match value {
            0 => Ok(PartKind::Tail),
            1 => Ok(PartKind::PreviousHead),
            2 => Ok(PartKind::Head),
            other => Err(Error::InvalidPartFile {
                reason: format!("unknown part kind {other}"),
            }),
        }
    }
}

/// Fragments of the records crossing the segment boundaries of one group.
///
/// Slot `i` holds the tail that opens segment `i` (the end of a record that
/// started earlier) and the head that closes it (the start of a record that
/// ends later). `previous_wal_head` is the head left by the last segment of
/// the preceding group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalPartFile {
    pub wal_tails: Vec<Option<Vec<u8>>>,
    pub wal_heads: Vec<Option<Vec<u8>>>,
    pub previous_wal_head: Option<Vec<u8>>,
}

impl WalPartFile {
    pub fn new(files_in_delta: usize) -> Self {
        Self {
            wal_tails: vec![None; files_in_delta],
            wal_heads: vec![None; files_in_delta],
            previous_wal_head: None,
        }
    }

    pub fn files_in_delta(&self) -> usize {
        self.wal_heads.len()
    }

    pub fn is_complete(&self) -> bool {
        self.previous_wal_head.is_some()
            && self.wal_tails.iter().all(Option::is_some)
            && self.wal_heads.iter().all(Option::is_some)
    }

    /// Slot of the first segment recorded in a group whose earlier segments
    /// were never seen, if this is such a group.
    ///
    /// A group with a previous head was entered through its predecessor and
    /// is not partially filled. Slots before the first one holding both
    /// fragments must hold neither.
    pub fn is_partially_filled(&self) -> Result<Option<usize>> {
        if self.previous_wal_head.is_some() {
            return Ok(None);
        }
        for (i, (head, tail)) in self.wal_heads.iter().zip(&self.wal_tails).enumerate() {
            match (head.is_some(), tail.is_some()) {
                (true, true) => return Ok(Some(i)),
                (false, false) => {}
                _ => {
                    return Err(Error::InvalidPartFile {
                        reason: format!("slot {i} holds only one of head and tail"),
                    }
                    .into())
                }
            }
        }
        Ok(None)
    }

    /// Mark the segments before `first_slot` and the previous group's head
    /// as empty, so the group can complete once its later segments arrive.
    pub fn complete_part_file(&mut self, first_slot: usize) {
        self.previous_wal_head = Some(Vec::new());
        for i in 0..first_slot.min(self.files_in_delta()) {
            self.wal_tails[i] = Some(Vec::new());
            self.wal_heads[i] = Some(Vec::new());
        }
    }

    /// Rebuild the records that crossed a segment boundary of the group.
    pub fn combine_records(&self) -> Result<Vec<XLogRecord>> {
        let mut records = Vec::new();
        let heads = std::iter::once(&self.previous_wal_head).chain(self.wal_heads.iter());
        for (i, (head, tail)) in heads.zip(self.wal_tails.iter()).enumerate() {
            let head = head.as_deref().unwrap_or_default();
            let tail = tail.as_deref().unwrap_or_default();
            if head.is_empty() && tail.is_empty() {
                continue;
            }
            let joined = [head, tail].concat();
            let record = XLogRecord::parse(&joined).map_err(|err| {
                err.context(format!("cannot rebuild record crossing into segment {i}"))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(PART_MAGIC)?;
        writer.write_all(&PART_VERSION.to_le_bytes())?;
        writer.write_all(&(self.files_in_delta() as u16).to_le_bytes())?;
        if let Some(head) = &self.previous_wal_head {
            write_part(writer, PartKind::PreviousHead, 0, head)?;
        }
        for (i, tail) in self.wal_tails.iter().enumerate() {
            if let Some(tail) = tail {
                write_part(writer, PartKind::Tail, i, tail)?;
            }
        }
        for (i, head) in self.wal_heads.iter().enumerate() {
            if let Some(head) = head {
                write_part(writer, PartKind::Head, i, head)?;
            }
        }
        Ok(())
    }

    pub fn load<R: Read>(reader: &mut R, files_in_delta: usize) -> Result<Self> {
        let mut header = [0u8; 12];
        read_exact_or_eof(reader, &mut header, "part file header")?;
        if &header[..8] != PART_MAGIC {
            return Err(Error::InvalidPartFile {
                reason: "bad magic".into(),
            }
            .into());
        }
        let version = u16::from_le_bytes([header[8], header[9]]);
        if version != PART_VERSION {
            return Err(Error::InvalidPartFile {
                reason: format!("unsupported version {version}"),
            }
            .into());
        }
        let stored = u16::from_le_bytes([header[10], header[11]]) as usize;
        if stored != files_in_delta {
            return Err(Error::InvalidPartFile {
                reason: format!("written for {stored} files per delta, expected {files_in_delta}"),
            }
            .into());
        }

        let mut part_file = WalPartFile::new(files_in_delta);
        let mut part_header = [0u8; 6];
        loop {
            match read_full(reader, &mut part_header)? {
                0 => break,
                6 => {}
                n => {
                    return Err(Error::UnexpectedEof(format!(
                        "part header cut after {n} bytes"
                    ))
                    .into())
                }
            }
            let kind = PartKind::try_from(part_header[0])?;
            let slot = part_header[1] as usize;
            let len = u32::from_le_bytes([
                part_header[2],
                part_header[3],
                part_header[4],
                part_header[5],
            ]) as u64;
            let data = read_counted(reader, len, "part data")?;

            let target = match kind {
                PartKind::PreviousHead => &mut part_file.previous_wal_head,
                PartKind::Tail => part_file.wal_tails.get_mut(slot).ok_or_else(|| {
                    Error::InvalidPartFile {
                        reason: format!("tail slot {slot} out of range"),
                    }
                })?,
                PartKind::Head => part_file.wal_heads.get_mut(slot).ok_or_else(|| {
                    Error::InvalidPartFile {
                        reason: format!("head slot {slot} out of range"),
                    }
                })?,
            };
            *target = Some(data);
        }
        Ok(part_file)
    }
}

fn write_part<W: Write>(writer: &mut W, kind: PartKind, slot: usize, data: &[u8]) -> Result<()> {
    writer.write_all(&[kind as u8, slot as u8])?;
    writer.write_all(&(data.len() as u32).to_le_bytes())?;
    writer.write_all(data)?;
    Ok(())
}
