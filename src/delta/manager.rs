//! Owner of all part and delta files of one archiving session.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, warn};

use super::delta_file::DeltaFile;
use super::part_file::WalPartFile;
use crate::config::DeltaConfig;
use crate::fs::DataFolder;
use crate::logging::{log_flush_summary, FlushSummary};
use crate::wal::location::BlockLocation;
use crate::wal::parser::WalParser;
use crate::wal::record::extract_block_locations;
use crate::wal::segment::{backup_history_wal_filename, part_filename_for, WalSegmentName};
use crate::{Error, Result};

/// Cancels the recording of WAL segments; usable from other threads.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Sender<String>,
}

impl CancellationHandle {
    pub fn cancel(&self, wal_filename: &str) {
        // The receiver lives as long as the manager.
        let _ = self.tx.send(wal_filename.to_string());
    }
}

/// A delta file whose group is complete, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedDelta {
    pub name: String,
    pub delta: DeltaFile,
}

#[derive(Debug, Clone, Default)]
pub struct FlushResult {
    pub finished: Vec<FinishedDelta>,
    pub summary: FlushSummary,
}

/// Accumulates block locations per group of WAL segments.
///
/// Not thread-safe: one scanner drives it at a time. Part and delta files
/// are loaded from the data folder on first use and written back by
/// [`DeltaFileManager::flush_files`].
pub struct DeltaFileManager {
    folder: DataFolder,
    files_in_delta: u64,
    wal_segment_size: u64,
    /// Keyed by delta file name.
    part_files: BTreeMap<String, WalPartFile>,
    delta_files: BTreeMap<String, DeltaFile>,
    canceled: BTreeSet<String>,
    cancel_tx: Sender<String>,
    cancel_rx: Receiver<String>,
}

impl DeltaFileManager {
    pub fn new(folder: DataFolder, config: &DeltaConfig) -> Result<Self> {
        config.validate()?;
        let (cancel_tx, cancel_rx) = mpsc::channel();
        Ok(Self {
            folder,
            files_in_delta: config.wal_files_in_delta,
            wal_segment_size: config.wal_segment_size,
            part_files: BTreeMap::new(),
            delta_files: BTreeMap::new(),
            canceled: BTreeSet::new(),
            cancel_tx,
            cancel_rx,
        })
    }

    /// Manager over the configured data folder, or an in-memory one when
    /// none is set.
    pub fn from_config(config: &DeltaConfig) -> Result<Self> {
        let folder = match &config.data_folder {
            Some(root) => DataFolder::local(root)?,
            None => DataFolder::memory(),
        };
        Self::new(folder, config)
    }

    pub fn files_in_delta(&self) -> u64 {
        self.files_in_delta
    }

    pub fn folder(&self) -> &DataFolder {
        &self.folder
    }

    pub fn segment_name(&self, wal_filename: &str) -> Result<WalSegmentName> {
        WalSegmentName::parse(wal_filename, self.wal_segment_size)
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        CancellationHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Queue the group of `wal_filename` (and the group of the segment after
    /// it) for cancellation at the next flush.
    pub fn cancel_recording(&self, wal_filename: &str) {
        let _ = self.cancel_tx.send(wal_filename.to_string());
    }

    pub fn is_canceled(&self, delta_filename: &str) -> bool {
        self.canceled.contains(delta_filename)
    }

    /// Part file of the group named `delta_filename`, loaded on first use.
    pub fn part_file_mut(&mut self, delta_filename: &str) -> Result<&mut WalPartFile> {
        if !self.part_files.contains_key(delta_filename) {
            let part_name = part_filename_for(delta_filename);
            let k = self.files_in_delta as usize;
            let part_file = match self.folder.open_readonly(&part_name) {
                Ok(mut reader) => WalPartFile::load(&mut reader, k)?,
                Err(err) if is_no_such_file(&err) => WalPartFile::new(k),
                Err(err) => return Err(err),
            };
            self.part_files.insert(delta_filename.to_string(), part_file);
        }
        self.part_files
            .get_mut(delta_filename)
            .ok_or_else(|| Error::DeltaFileNotFound(delta_filename.to_string()).into())
    }

    /// Delta file named `delta_filename`, loaded on first use.
    pub fn delta_file_mut(&mut self, delta_filename: &str) -> Result<&mut DeltaFile> {
        if !self.delta_files.contains_key(delta_filename) {
            let delta = match self.folder.open_readonly(delta_filename) {
                Ok(mut reader) => DeltaFile::load(&mut reader)?,
                Err(err) if is_no_such_file(&err) => DeltaFile::new(WalParser::new()),
                Err(err) => return Err(err),
            };
            self.delta_files.insert(delta_filename.to_string(), delta);
        }
        self.delta_files
            .get_mut(delta_filename)
            .ok_or_else(|| Error::DeltaFileNotFound(delta_filename.to_string()).into())
    }

    /// Store the fragment that opens `segment`.
    pub fn save_previous_wal_tail(
        &mut self,
        segment: &WalSegmentName,
        tail: Vec<u8>,
    ) -> Result<()> {
        let k = self.files_in_delta;
        let slot = segment.slot(k);
        self.part_file_mut(&segment.delta_filename(k))?.wal_tails[slot] = Some(tail);
        Ok(())
    }

    /// Store the fragment that closes `segment`. The last segment of a group
    /// also hands it to the next group.
    pub fn save_next_wal_head(&mut self, segment: &WalSegmentName, head: Vec<u8>) -> Result<()> {
        let k = self.files_in_delta;
        let slot = segment.slot(k);
        if slot == k as usize - 1 {
            let next_group = segment.next().delta_filename(k);
            self.part_file_mut(&next_group)?.previous_wal_head = Some(head.clone());
        }
        self.part_file_mut(&segment.delta_filename(k))?.wal_heads[slot] = Some(head);
        Ok(())
    }

    pub fn record_locations(
        &mut self,
        segment: &WalSegmentName,
        locations: impl IntoIterator<Item = BlockLocation>,
    ) -> Result<()> {
        let name = segment.delta_filename(self.files_in_delta);
        self.delta_file_mut(&name)?.add_locations(locations);
        Ok(())
    }

    /// Complete the group a backup started in once its backup history file
    /// is archived; the segments before the backup start are never recorded.
    ///
    /// Returns whether a group was completed. Other file names are ignored.
    /// Must run before the flush that would persist the group.
    pub fn handle_backup_history_file(&mut self, path: &str) -> Result<bool> {
        let filename = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path);
        let Some(wal_filename) = backup_history_wal_filename(filename) else {
            return Ok(false);
        };
        let segment = self.segment_name(wal_filename)?;
        let delta_name = segment.delta_filename(self.files_in_delta);
        let part_file = self.part_file_mut(&delta_name)?;
        match part_file.is_partially_filled()? {
            Some(first_slot) => {
                part_file.complete_part_file(first_slot);
                debug!(delta = %delta_name, first_slot, "completed partially filled part file");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Finalize complete groups and persist the rest.
    ///
    /// Blocks until every outstanding [`CancellationHandle`] is dropped, so no
    /// cancellation can arrive after its group was judged complete.
    pub fn flush_files(&mut self) -> FlushResult {
        self.collect_cancellations();
        let groups: Vec<String> = self.part_files.keys().cloned().collect();
        for name in groups {
            if let Err(err) = self.delta_file_mut(&name) {
                warn!(delta = %name, error = %err, "failed to load delta file, canceling group");
                self.canceled.insert(name);
            }
        }
        if let Err(err) = self.folder.clean() {
            warn!(error = %err, "failed to clean delta data folder");
        }

        let mut summary = FlushSummary::default();
        let completed = self.flush_part_files(&mut summary);
        let finished = self.flush_delta_files(&completed, &mut summary);
        summary.groups_canceled = self.canceled.len();
        log_flush_summary(summary);
        FlushResult { finished, summary }
    }

    fn collect_cancellations(&mut self) {
        let (tx, rx) = mpsc::channel();
        self.cancel_tx = tx;
        let pending = std::mem::replace(&mut self.cancel_rx, rx);
        for wal_filename in pending.iter() {
            match self.segment_name(&wal_filename) {
                Ok(segment) => {
                    let k = self.files_in_delta;
                    self.canceled.insert(segment.delta_filename(k));
                    self.canceled.insert(segment.next().delta_filename(k));
                }
                Err(err) => warn!(wal = %wal_filename, error = %err, "ignoring cancellation"),
            }
        }
    }

    fn flush_part_files(&mut self, summary: &mut FlushSummary) -> BTreeSet<String> {
        let mut completed = BTreeSet::new();
        let part_files = std::mem::take(&mut self.part_files);
        for (delta_name, part_file) in part_files {
            if self.canceled.contains(&delta_name) {
                continue;
            }
            if part_file.is_complete() {
                match self.combine_part_file(&delta_name, &part_file) {
                    Ok(()) => {
                        summary.part_files_combined += 1;
                        completed.insert(delta_name);
                    }
                    Err(err) => {
                        warn!(
                            delta = %delta_name,
                            error = %err,
                            "failed to combine part file, canceling group"
                        );
                        self.canceled.insert(delta_name);
                    }
                }
                continue;
            }
            let part_name = part_filename_for(&delta_name);
            match save_to_folder(&self.folder, &part_name, |w| part_file.save(w)) {
                Ok(()) => summary.part_files_saved += 1,
                Err(err) => {
                    warn!(
                        part = %part_name,
                        error = %err,
                        "failed to save part file, canceling group"
                    );
                    summary.save_failures += 1;
                    self.canceled.insert(delta_name);
                }
            }
        }
        completed
    }

    fn combine_part_file(&mut self, delta_name: &str, part_file: &WalPartFile) -> Result<()> {
        let records = part_file.combine_records()?;
        let last_head = part_file
            .wal_heads
            .last()
            .cloned()
            .flatten()
            .unwrap_or_default();
        let delta = self
            .delta_files
            .get_mut(delta_name)
            .ok_or_else(|| Error::DeltaFileNotFound(delta_name.to_string()))?;
        delta.wal_parser = WalParser::from_record_head(last_head);
        delta.add_locations(extract_block_locations(&records));
        debug!(delta = %delta_name, records = records.len(), "combined part file");
        Ok(())
    }

    fn flush_delta_files(
        &mut self,
        completed: &BTreeSet<String>,
        summary: &mut FlushSummary,
    ) -> Vec<FinishedDelta> {
        let mut finished = Vec::new();
        let delta_files = std::mem::take(&mut self.delta_files);
        for (name, delta) in delta_files {
            if self.canceled.contains(&name) {
                continue;
            }
            if completed.contains(&name) {
                summary.delta_files_finished += 1;
                summary.locations_finished += delta.locations.len();
                finished.push(FinishedDelta { name, delta });
                continue;
            }
            match save_to_folder(&self.folder, &name, |w| delta.save(w)) {
                Ok(()) => summary.delta_files_saved += 1,
                Err(err) => {
                    warn!(delta = %name, error = %err, "failed to save delta file");
                    summary.save_failures += 1;
                }
            }
        }
        finished
    }
}

fn is_no_such_file(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::NoSuchFile(_)))
}

fn save_to_folder<F>(folder: &DataFolder, name: &str, save: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut buf = Vec::new();
    save(&mut buf)?;
    let mut writer = folder.open_write_only(name)?;
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}
