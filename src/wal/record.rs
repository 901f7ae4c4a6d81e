//! WAL record decoding (`XLogRecord` and its block references).
//!
//! A record is a fixed header followed by a header part (block headers,
//! main-data length, origin) and the payloads: per block its image then its
//! data, and the main data last.

use bytes::Buf;

use super::location::{BlockLocation, RelFileNode};
use super::BLOCK_SIZE;
use crate::{Error, Result};

pub const XLOG_RECORD_HEADER_SIZE: usize = 24;

pub const XLR_MAX_BLOCK_ID: u8 = 32;
pub const XLR_BLOCK_ID_DATA_SHORT: u8 = 255;
pub const XLR_BLOCK_ID_DATA_LONG: u8 = 254;
pub const XLR_BLOCK_ID_ORIGIN: u8 = 253;
pub const XLR_BLOCK_ID_TOPLEVEL_XID: u8 = 252;

pub const BKPBLOCK_FORK_MASK: u8 = 0x0F;
pub const BKPBLOCK_HAS_IMAGE: u8 = 0x10;
pub const BKPBLOCK_HAS_DATA: u8 = 0x20;
pub const BKPBLOCK_WILL_INIT: u8 = 0x40;
pub const BKPBLOCK_SAME_REL: u8 = 0x80;

pub const BKPIMAGE_HAS_HOLE: u8 = 0x01;
pub const BKPIMAGE_IS_COMPRESSED: u8 = 0x02;
pub const BKPIMAGE_APPLY: u8 = 0x04;

pub const XLR_INFO_MASK: u8 = 0x0F;
pub const XLOG_SWITCH: u8 = 0x40;

/// Resource managers known to the record decoder (`rmgrlist.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResourceManager {
    Xlog = 0,
    Transaction = 1,
    Storage = 2,
    Clog = 3,
    Database = 4,
    Tablespace = 5,
    MultiXact = 6,
    RelMap = 7,
    Standby = 8,
    Heap2 = 9,
    Heap = 10,
    Btree = 11,
    Hash = 12,
    Gin = 13,
    Gist = 14,
    Sequence = 15,
    SpGist = 16,
    Brin = 17,
    CommitTs = 18,
    ReplicationOrigin = 19,
    Generic = 20,
    LogicalMessage = 21,
}

impl TryFrom<u8> for ResourceManager {
    type Error = Error;

    fn try_from(id: u8) -> std::result::Result<Self, Error> {
        use ResourceManager::*;
        const ALL: [ResourceManager; 22] = [
            Xlog,
            Transaction,
            Storage,
            Clog,
            Database,
            Tablespace,
            MultiXact,
            RelMap,
            Standby,
            Heap2,
            Heap,
            Btree,
            Hash,
            Gin,
            Gist,
            Sequence,
            SpGist,
            Brin,
            CommitTs,
            ReplicationOrigin,
            Generic,
            LogicalMessage,
        ];
        ALL.get(id as usize)
            .copied()
            .ok_or_else(|| Error::InvalidRecord(format!("unknown resource manager id {id}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XLogRecordHeader {
    pub total_record_length: u32,
    pub xid: u32,
    pub prev_record_ptr: u64,
    pub info: u8,
    pub resource_manager_id: u8,
    pub crc32: u32,
}

impl XLogRecordHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < XLOG_RECORD_HEADER_SIZE {
            return Err(Error::Parse {
                what: "WAL record header",
                need: XLOG_RECORD_HEADER_SIZE,
                got: bytes.len(),
            }
            .into());
        }
        let mut buf = bytes;
        let header = Self {
            total_record_length: buf.get_u32_le(),
            xid: buf.get_u32_le(),
            prev_record_ptr: buf.get_u64_le(),
            info: buf.get_u8(),
            resource_manager_id: {
                let rmid = buf.get_u8();
                buf.advance(2);
                rmid
            },
            crc32: buf.get_u32_le(),
        };
        Ok(header)
    }

    /// Length and resource manager sanity checks.
    pub fn validate(&self) -> Result<()> {
        if (self.total_record_length as usize) < XLOG_RECORD_HEADER_SIZE {
            return Err(Error::InvalidRecord(format!(
                "total length {} is shorter than the record header",
                self.total_record_length
            ))
            .into());
        }
        ResourceManager::try_from(self.resource_manager_id)?;
        Ok(())
    }

    pub fn resource_manager(&self) -> Option<ResourceManager> {
        ResourceManager::try_from(self.resource_manager_id).ok()
    }

    pub fn is_wal_switch(&self) -> bool {
        self.resource_manager_id == ResourceManager::Xlog as u8
            && self.info & !XLR_INFO_MASK == XLOG_SWITCH
            && self.total_record_length as usize == XLOG_RECORD_HEADER_SIZE
    }

    pub fn encode(&self) -> [u8; XLOG_RECORD_HEADER_SIZE] {
        let mut out = [0u8; XLOG_RECORD_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.total_record_length.to_le_bytes());
        out[4..8].copy_from_slice(&self.xid.to_le_bytes());
        out[8..16].copy_from_slice(&self.prev_record_ptr.to_le_bytes());
        out[16] = self.info;
        out[17] = self.resource_manager_id;
        out[20..24].copy_from_slice(&self.crc32.to_le_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XLogRecordBlockImageHeader {
    pub image_length: u16,
    pub hole_offset: u16,
    pub info: u8,
    pub hole_length: u16,
}

impl XLogRecordBlockImageHeader {
    pub fn has_hole(&self) -> bool {
        self.info & BKPIMAGE_HAS_HOLE != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.info & BKPIMAGE_IS_COMPRESSED != 0
    }

    pub fn apply_image(&self) -> bool {
        self.info & BKPIMAGE_APPLY != 0
    }

    fn check_consistency(&self) -> Result<()> {
        let full_image = self.image_length as usize == BLOCK_SIZE;
        if self.has_hole() && (self.hole_offset == 0 || self.hole_length == 0 || full_image) {
            return Err(Error::InvalidRecord(format!(
                "inconsistent image hole: offset {}, length {}, image length {}",
                self.hole_offset, self.hole_length, self.image_length
            ))
            .into());
        }
        if !self.has_hole() && (self.hole_offset != 0 || self.hole_length != 0) {
            return Err(Error::InvalidRecord(format!(
                "image without hole has hole offset {} and length {}",
                self.hole_offset, self.hole_length
            ))
            .into());
        }
        if self.is_compressed() && full_image {
            return Err(
                Error::InvalidRecord("compressed image has the full block length".into()).into(),
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XLogRecordBlockHeader {
    pub block_id: u8,
    pub fork_flags: u8,
    pub data_length: u16,
    pub image_header: XLogRecordBlockImageHeader,
    pub location: BlockLocation,
}

impl XLogRecordBlockHeader {
    pub fn fork_number(&self) -> u8 {
        self.fork_flags & BKPBLOCK_FORK_MASK
    }

    pub fn has_image(&self) -> bool {
        self.fork_flags & BKPBLOCK_HAS_IMAGE != 0
    }

    pub fn has_data(&self) -> bool {
        self.fork_flags & BKPBLOCK_HAS_DATA != 0
    }

    pub fn will_init(&self) -> bool {
        self.fork_flags & BKPBLOCK_WILL_INIT != 0
    }

    pub fn has_same_rel(&self) -> bool {
        self.fork_flags & BKPBLOCK_SAME_REL != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XLogRecordBlock {
    pub header: XLogRecordBlockHeader,
    pub image: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XLogRecord {
    pub header: XLogRecordHeader,
    pub origin: Option<u16>,
    pub toplevel_xid: Option<u32>,
    pub main_data_len: u32,
    pub blocks: Vec<XLogRecordBlock>,
    pub main_data: Vec<u8>,
}

/// Cursor over the record header part, bounded by the bytes the record
/// declares for it. Payload lengths are subtracted as they are announced.
struct HeaderPartReader<'a> {
    buf: &'a [u8],
    remaining: usize,
}

impl<'a> HeaderPartReader<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        let available = self.remaining.min(self.buf.len());
        if n > available {
            return Err(Error::Parse {
                what,
                need: n,
                got: available,
            }
            .into());
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        self.remaining -= n;
        Ok(head)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?.get_u8())
    }

    fn u16(&mut self, what: &'static str) -> Result<u16> {
        Ok(self.take(2, what)?.get_u16_le())
    }

    fn u32(&mut self, what: &'static str) -> Result<u32> {
        Ok(self.take(4, what)?.get_u32_le())
    }

    fn shrink(&mut self, payload: usize) -> Result<()> {
        self.remaining = self.remaining.checked_sub(payload).ok_or_else(|| {
            Error::InvalidRecord(format!(
                "payload of {payload} bytes overruns the record"
            ))
        })?;
        Ok(())
    }

    fn rel_file_node(&mut self) -> Result<RelFileNode> {
        Ok(RelFileNode {
            spc_node: self.u32("relfilenode")?,
            db_node: self.u32("relfilenode")?,
            rel_node: self.u32("relfilenode")?,
        })
    }
}

impl XLogRecord {
    /// Decode a complete record, header included.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let header = XLogRecordHeader::parse(bytes)?;
        header.validate()?;
        let total = header.total_record_length as usize;
        if bytes.len() < total {
            return Err(Error::Parse {
                what: "WAL record",
                need: total,
                got: bytes.len(),
            }
            .into());
        }
        let body = &bytes[XLOG_RECORD_HEADER_SIZE..total];
        let mut record = XLogRecord {
            header,
            ..Default::default()
        };

        let mut part = HeaderPartReader {
            buf: body,
            remaining: body.len(),
        };
        let mut max_block_id: Option<u8> = None;
        let mut last_rel: Option<RelFileNode> = None;
        while part.remaining > 0 {
            let block_id = part.u8("block id")?;
            match block_id {
                XLR_BLOCK_ID_DATA_SHORT => {
                    let len = part.u8("main data length")? as u32;
                    part.shrink(len as usize)?;
                    record.main_data_len = len;
                }
                XLR_BLOCK_ID_DATA_LONG => {
                    let len = part.u32("main data length")?;
                    part.shrink(len as usize)?;
                    record.main_data_len = len;
                }
                XLR_BLOCK_ID_ORIGIN => {
                    record.origin = Some(part.u16("replication origin")?);
                }
                XLR_BLOCK_ID_TOPLEVEL_XID => {
                    record.toplevel_xid = Some(part.u32("top-level xid")?);
                }
                id if id <= XLR_MAX_BLOCK_ID => {
                    if let Some(previous) = max_block_id {
                        if id <= previous {
                            return Err(Error::OutOfOrderBlockId { id, previous }.into());
                        }
                    }
                    max_block_id = Some(id);
                    let header = read_block_header(&mut part, id, &mut last_rel)?;
                    record.blocks.push(XLogRecordBlock {
                        header,
                        ..Default::default()
                    });
                }
                id => return Err(Error::InvalidBlockId(id).into()),
            }
        }

        let mut payload = part.buf;
        let mut take = |n: usize| -> Result<Vec<u8>> {
            if n > payload.len() {
                return Err(Error::Parse {
                    what: "record payload",
                    need: n,
                    got: payload.len(),
                }
                .into());
            }
            let (head, tail) = payload.split_at(n);
            payload = tail;
            Ok(head.to_vec())
        };
        for block in &mut record.blocks {
            if block.header.has_image() {
                block.image = take(block.header.image_header.image_length as usize)?;
            }
            if block.header.has_data() {
                block.data = take(block.header.data_length as usize)?;
            }
        }
        record.main_data = take(record.main_data_len as usize)?;
        Ok(record)
    }

    pub fn is_wal_switch(&self) -> bool {
        self.header.is_wal_switch()
    }

    pub fn block_locations(&self) -> impl Iterator<Item = BlockLocation> + '_ {
        self.blocks.iter().map(|b| b.header.location)
    }

    /// Encode the record. `total_record_length` is recomputed; the CRC is
    /// copied from the header as is.
    pub fn encode(&self) -> Vec<u8> {
        let mut part = Vec::new();
        let mut payload = Vec::new();
        let mut last_rel: Option<RelFileNode> = None;
        for block in &self.blocks {
            let h = &block.header;
            let same_rel = last_rel == Some(h.location.rel);
            let mut flags =
                h.fork_flags & !(BKPBLOCK_SAME_REL | BKPBLOCK_HAS_IMAGE | BKPBLOCK_HAS_DATA);
            if !block.image.is_empty() {
                flags |= BKPBLOCK_HAS_IMAGE;
            }
            if !block.data.is_empty() {
                flags |= BKPBLOCK_HAS_DATA;
            }
            if same_rel {
                flags |= BKPBLOCK_SAME_REL;
            }
            part.push(h.block_id);
            part.push(flags);
            part.extend_from_slice(&(block.data.len() as u16).to_le_bytes());
            if !block.image.is_empty() {
                let img = &h.image_header;
                part.extend_from_slice(&(block.image.len() as u16).to_le_bytes());
                part.extend_from_slice(&img.hole_offset.to_le_bytes());
                part.push(img.info);
                if img.has_hole() && img.is_compressed() {
                    part.extend_from_slice(&img.hole_length.to_le_bytes());
                }
            }
            if !same_rel {
                part.extend_from_slice(&h.location.rel.spc_node.to_le_bytes());
                part.extend_from_slice(&h.location.rel.db_node.to_le_bytes());
                part.extend_from_slice(&h.location.rel.rel_node.to_le_bytes());
            }
            part.extend_from_slice(&h.location.block_no.to_le_bytes());
            last_rel = Some(h.location.rel);
            payload.extend_from_slice(&block.image);
            payload.extend_from_slice(&block.data);
        }
        if let Some(origin) = self.origin {
            part.push(XLR_BLOCK_ID_ORIGIN);
            part.extend_from_slice(&origin.to_le_bytes());
        }
        if let Some(xid) = self.toplevel_xid {
            part.push(XLR_BLOCK_ID_TOPLEVEL_XID);
            part.extend_from_slice(&xid.to_le_bytes());
        }
        match self.main_data.len() {
            0 => {}
            len @ 1..=255 => {
                part.push(XLR_BLOCK_ID_DATA_SHORT);
                part.push(len as u8);
            }
            len => {
                part.push(XLR_BLOCK_ID_DATA_LONG);
                part.extend_from_slice(&(len as u32).to_le_bytes());
            }
        }
        payload.extend_from_slice(&self.main_data);

        let mut header = self.header;
        header.total_record_length = (XLOG_RECORD_HEADER_SIZE + part.len() + payload.len()) as u32;
        let mut out = Vec::with_capacity(header.total_record_length as usize);
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&part);
        out.extend_from_slice(&payload);
        out
    }
}

fn read_block_header(
    part: &mut HeaderPartReader<'_>,
    block_id: u8,
    last_rel: &mut Option<RelFileNode>,
) -> Result<XLogRecordBlockHeader> {
    let mut header = XLogRecordBlockHeader {
        block_id,
        fork_flags: part.u8("block fork flags")?,
        data_length: part.u16("block data length")?,
        ..Default::default()
    };
    if header.has_data() != (header.data_length > 0) {
        return Err(Error::InvalidRecord(format!(
            "block {block_id}: data flag disagrees with data length {}",
            header.data_length
        ))
        .into());
    }
    part.shrink(header.data_length as usize)?;

    if header.has_image() {
        let mut image = XLogRecordBlockImageHeader {
            image_length: part.u16("block image length")?,
            hole_offset: part.u16("block image hole offset")?,
            info: part.u8("block image info")?,
            hole_length: 0,
        };
        if image.is_compressed() {
            if image.has_hole() {
                image.hole_length = part.u16("block image hole length")?;
            }
        } else {
            image.hole_length = (BLOCK_SIZE as u16)
                .checked_sub(image.image_length)
                .ok_or_else(|| {
                    Error::InvalidRecord(format!(
                        "block {block_id}: image length {} exceeds the block size",
                        image.image_length
                    ))
                })?;
        }
        image.check_consistency()?;
        part.shrink(image.image_length as usize)?;
        header.image_header = image;
    }

    let rel = if header.has_same_rel() {
        last_rel.ok_or(Error::NoPrecedingRelFileNode)?
    } else {
        part.rel_file_node()?
    };
    *last_rel = Some(rel);
    header.location = BlockLocation {
        rel,
        block_no: part.u32("block number")?,
    };
    Ok(header)
}

/// Block locations of `records`, in record order and without deduplication.
pub fn extract_block_locations(records: &[XLogRecord]) -> Vec<BlockLocation> {
    records.iter().flat_map(|r| r.block_locations()).collect()
}
