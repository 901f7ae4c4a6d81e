//! Pass-through reader recording block locations of an archived WAL segment.

use std::io::{self, Read};

use tracing::warn;

use super::manager::DeltaFileManager;
use crate::wal::parser::WalParser;
use crate::wal::record::extract_block_locations;
use crate::wal::segment::WalSegmentName;
use crate::wal::WAL_PAGE_SIZE;
use crate::{Error, Result};

/// Wraps the byte stream of one WAL segment on its way to the archive.
///
/// Every byte is returned unchanged. Complete pages are parsed on the side;
/// the block locations they touch go to the group's delta file and the
/// record fragments at both segment ends go to the group's part file. Any
/// parse failure cancels the recording but never the stream.
pub struct WalDeltaRecordingReader<'m, R> {
    inner: R,
    manager: &'m mut DeltaFileManager,
    wal_filename: String,
    segment: WalSegmentName,
    parser: WalParser,
    page: Vec<u8>,
    can_save_tail: bool,
    recording: bool,
}

impl<'m, R: Read> WalDeltaRecordingReader<'m, R> {
    pub fn new(inner: R, wal_filename: &str, manager: &'m mut DeltaFileManager) -> Result<Self> {
        let segment = manager.segment_name(wal_filename)?;
        let k = manager.files_in_delta();
        let delta_name = segment.delta_filename(k);
        manager.part_file_mut(&delta_name)?;
        manager.delta_file_mut(&delta_name)?;
        Ok(Self {
            inner,
            manager,
            wal_filename: wal_filename.to_string(),
            segment,
            parser: WalParser::new(),
            page: Vec::with_capacity(WAL_PAGE_SIZE),
            can_save_tail: true,
            recording: true,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Store the head of the record left open at the segment end.
    pub fn finish(self) -> Result<()> {
        if !self.recording {
            return Ok(());
        }
        if !self.page.is_empty() {
            self.manager.cancel_recording(&self.wal_filename);
            warn!(
                wal = %self.wal_filename,
                trailing_bytes = self.page.len(),
                "WAL segment ends with a partial page, delta recording canceled"
            );
            return Ok(());
        }
        let head = self.parser.current_record().to_vec();
        self.manager.save_next_wal_head(&self.segment, head)
    }

    fn record_page(&mut self) -> Result<()> {
        let parsed = match self.parser.parse_records_from_page(&self.page) {
            Ok(parsed) => parsed,
            Err(err) if matches!(err.downcast_ref::<Error>(), Some(Error::ZeroPage)) => {
                return Ok(())
            }
            Err(err) => {
                self.parser.invalidate();
                return Err(err);
            }
        };
        let tail_seen = parsed.discarded_tail.as_ref().is_some_and(|t| !t.is_empty());
        if parsed.discarded_tail.is_some() || !parsed.records.is_empty() {
            if self.can_save_tail {
                self.can_save_tail = false;
                let tail = parsed.discarded_tail.unwrap_or_default();
                self.manager.save_previous_wal_tail(&self.segment, tail)?;
            } else if tail_seen {
                return Err(Error::CantDiscardWalData(self.wal_filename.clone()).into());
            }
        }
        let locations = extract_block_locations(&parsed.records);
        if !locations.is_empty() {
            self.manager.record_locations(&self.segment, locations)?;
        }
        Ok(())
    }

    fn cancel(&mut self, err: anyhow::Error) {
        self.recording = false;
        self.manager.cancel_recording(&self.wal_filename);
        warn!(
            wal = %self.wal_filename,
            error = %err,
            "failed to record WAL delta, recording canceled"
        );
    }

    fn observe(&mut self, mut bytes: &[u8]) {
        while self.recording && !bytes.is_empty() {
            let n = (WAL_PAGE_SIZE - self.page.len()).min(bytes.len());
            self.page.extend_from_slice(&bytes[..n]);
            bytes = &bytes[n..];
            if self.page.len() == WAL_PAGE_SIZE {
                if let Err(err) = self.record_page() {
                    self.cancel(err);
                }
                self.page.clear();
            }
        }
    }
}

impl<R: Read> Read for WalDeltaRecordingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.observe(&buf[..n]);
                Ok(n)
            }
            Err(err) => {
                if err.kind() != io::ErrorKind::Interrupted && self.recording {
                    let message = err.to_string();
                    self.cancel(anyhow::anyhow!(message));
                }
                Err(err)
            }
        }
    }
}
