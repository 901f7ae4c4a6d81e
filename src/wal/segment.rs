//! WAL segment file names (`%08X%08X%08X`).

use std::fmt;

use crate::{Error, Result};

const WAL_FILENAME_LEN: usize = 24;
const BACKUP_HISTORY_SUFFIX: &str = ".backup";

/// A WAL segment addressed by timeline and absolute segment number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalSegmentName {
    pub timeline: u32,
    pub segment_no: u64,
    segments_per_xlog_id: u64,
}

impl WalSegmentName {
    pub fn new(timeline: u32, segment_no: u64, wal_segment_size: u64) -> Self {
        Self {
            timeline,
            segment_no,
            segments_per_xlog_id: segments_per_xlog_id(wal_segment_size),
        }
    }

    pub fn parse(name: &str, wal_segment_size: u64) -> Result<Self> {
        if name.len() != WAL_FILENAME_LEN || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::NotWalFilename(name.to_string()).into());
        }
        let field = |range: std::ops::Range<usize>| {
            u32::from_str_radix(&name[range], 16)
                .map_err(|_| Error::NotWalFilename(name.to_string()))
        };
        let timeline = field(0..8)?;
        let log_id = field(8..16)? as u64;
        let log_seg = field(16..24)? as u64;
        let per_id = segments_per_xlog_id(wal_segment_size);
        if log_seg >= per_id {
            return Err(Error::NotWalFilename(name.to_string()).into());
        }
        Ok(Self {
            timeline,
            segment_no: log_id * per_id + log_seg,
            segments_per_xlog_id: per_id,
        })
    }

    pub fn next(&self) -> Self {
        Self {
            segment_no: self.segment_no + 1,
            ..*self
        }
    }

    /// Index of the delta group holding this segment.
    pub fn group_no(&self, files_in_delta: u64) -> u64 {
        self.segment_no / files_in_delta
    }

    /// Position of this segment inside its delta group.
    pub fn slot(&self, files_in_delta: u64) -> usize {
        (self.segment_no % files_in_delta) as usize
    }

    /// First segment of the delta group holding this segment.
    pub fn group_start(&self, files_in_delta: u64) -> Self {
        Self {
            segment_no: self.group_no(files_in_delta) * files_in_delta,
            ..*self
        }
    }

    /// Name of the delta file for this segment's group.
    pub fn delta_filename(&self, files_in_delta: u64) -> String {
        format!("{}_delta", self.group_start(files_in_delta))
    }
}

impl fmt::Display for WalSegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}{:08X}{:08X}",
            self.timeline,
            self.segment_no / self.segments_per_xlog_id,
            self.segment_no % self.segments_per_xlog_id
        )
    }
}

pub fn segments_per_xlog_id(wal_segment_size: u64) -> u64 {
    0x1_0000_0000 / wal_segment_size
}

/// Part file name for a delta file name.
pub fn part_filename_for(delta_filename: &str) -> String {
    format!("{delta_filename}_part")
}

/// WAL segment named by a backup history file
/// (`%08X%08X%08X.%08X.backup`), or `None` for any other file name.
pub fn backup_history_wal_filename(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(BACKUP_HISTORY_SUFFIX)?;
    let (wal, offset) = stem.split_once('.')?;
    let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
    (wal.len() == WAL_FILENAME_LEN && offset.len() == 8 && is_hex(wal) && is_hex(offset))
        .then_some(wal)
}
