use std::collections::BTreeSet;
use std::io::Read;

use pgdelta::config::DeltaConfig;
use pgdelta::delta::{DeltaFileManager, PagedFileDeltaMap, WalDeltaRecordingReader};
use pgdelta::fs::DataFolder;
use pgdelta::wal::generator::WalGenerator;
use pgdelta::wal::record::{ResourceManager, XLogRecordBlock, XLogRecordBlockHeader, XLogRecordHeader};
use pgdelta::wal::{BlockLocation, XLogRecord, WAL_PAGE_SIZE};
use tempfile::tempdir;

const SEGMENT_SIZE: u64 = 1024 * 1024;
const FILES_IN_DELTA: u64 = 2;

fn config() -> DeltaConfig {
    DeltaConfig {
        wal_files_in_delta: FILES_IN_DELTA,
        wal_segment_size: SEGMENT_SIZE,
        data_folder: None,
    }
}

fn heap_record(block_no: u32) -> XLogRecord {
    XLogRecord {
        header: XLogRecordHeader {
            resource_manager_id: ResourceManager::Heap as u8,
            xid: 900,
            ..Default::default()
        },
        blocks: vec![XLogRecordBlock {
            header: XLogRecordBlockHeader {
                location: BlockLocation::new(1663, 16384, 16397, block_no),
                ..Default::default()
            },
            data: vec![0x33; 16],
            ..Default::default()
        }],
        main_data: vec![0x44; 1000 + (block_no as usize % 7) * 13],
        ..Default::default()
    }
}

/// WAL from the start of segment `first` to the middle of segment `last`.
/// Record `i` touches block `i`.
struct Workload {
    segments: Vec<(String, Vec<u8>)>,
    /// End LSN and block number of every record.
    ends: Vec<(u64, u32)>,
}

impl Workload {
    fn generate(first: u64, last: u64) -> Self {
        let mut gen = WalGenerator::new(1, first, SEGMENT_SIZE);
        let stop = last * SEGMENT_SIZE + SEGMENT_SIZE / 2;
        let mut ends = Vec::new();
        let mut block_no = 0;
        while gen.lsn() < stop {
            gen.append_record(&heap_record(block_no));
            ends.push((gen.lsn(), block_no));
            block_no += 1;
        }
        Self {
            segments: gen.into_segments(),
            ends,
        }
    }

    /// Blocks of records that end inside segments `from..to`.
    fn blocks_ending_in(&self, from: u64, to: u64) -> BTreeSet<u32> {
        self.ends
            .iter()
            .filter(|(end, _)| *end > from * SEGMENT_SIZE && *end <= to * SEGMENT_SIZE)
            .map(|(_, block)| *block)
            .collect()
    }
}

fn archive(manager: &mut DeltaFileManager, name: &str, data: &[u8]) -> pgdelta::Result<()> {
    let mut reader = WalDeltaRecordingReader::new(data, name, manager)?;
    let mut shipped = Vec::new();
    reader.read_to_end(&mut shipped)?;
    assert_eq!(data, &shipped[..], "{name} must pass through unchanged");
    reader.finish()
}

fn finished_blocks(delta: &pgdelta::delta::DeltaFile) -> BTreeSet<u32> {
    delta.locations.iter().map(|l| l.block_no).collect()
}

#[test]
fn complete_group_collects_every_touched_block() -> pgdelta::Result<()> {
    let workload = Workload::generate(1, 3);
    assert_eq!(3, workload.segments.len());
    let mut manager = DeltaFileManager::new(DataFolder::memory(), &config())?;
    for (name, data) in &workload.segments {
        archive(&mut manager, name, data)?;
    }

    let result = manager.flush_files();
    assert_eq!(1, result.finished.len());
    let finished = &result.finished[0];
    assert_eq!("000000010000000000000002_delta", finished.name);
    assert_eq!(
        workload.blocks_ending_in(2, 4),
        finished_blocks(&finished.delta)
    );
    assert!(finished.delta.wal_parser.current_record().is_empty());
    assert_eq!(0, result.summary.groups_canceled);
    Ok(())
}

#[test]
fn group_completes_across_flushes_and_restarts() -> pgdelta::Result<()> {
    let dir = tempdir()?;
    let workload = Workload::generate(1, 3);

    for (name, data) in &workload.segments {
        let folder = DataFolder::local(dir.path().join("delta"))?;
        let mut manager = DeltaFileManager::new(folder, &config())?;
        archive(&mut manager, name, data)?;
        let result = manager.flush_files();
        if name.ends_with('3') {
            assert_eq!(1, result.finished.len());
            assert_eq!(
                workload.blocks_ending_in(2, 4),
                finished_blocks(&result.finished[0].delta)
            );
        } else {
            assert!(result.finished.is_empty(), "{name}");
        }
    }
    Ok(())
}

#[test]
fn corrupt_page_cancels_only_neighbouring_groups() -> pgdelta::Result<()> {
    let mut workload = Workload::generate(1, 5);
    assert_eq!(5, workload.segments.len());
    // segment 2, page 5: unknown page header flags
    let corrupt = &mut workload.segments[1].1;
    let offset = 5 * WAL_PAGE_SIZE;
    corrupt[offset + 2..offset + 4].copy_from_slice(&0x00f0u16.to_le_bytes());

    let folder = DataFolder::memory();
    let mut manager = DeltaFileManager::new(folder.clone(), &config())?;
    for (name, data) in &workload.segments {
        archive(&mut manager, name, data)?;
    }

    let result = manager.flush_files();
    assert!(manager.is_canceled("000000010000000000000002_delta"));
    assert!(!manager.is_canceled("000000010000000000000004_delta"));
    let names: Vec<&str> = result.finished.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(vec!["000000010000000000000004_delta"], names);
    assert_eq!(
        workload.blocks_ending_in(4, 6),
        finished_blocks(&result.finished[0].delta)
    );
    assert!(!folder
        .list()?
        .iter()
        .any(|n| n.starts_with("000000010000000000000002")));
    Ok(())
}

#[test]
fn finished_deltas_drive_incremental_block_selection() -> pgdelta::Result<()> {
    let workload = Workload::generate(1, 3);
    let mut manager = DeltaFileManager::new(DataFolder::memory(), &config())?;
    for (name, data) in &workload.segments {
        archive(&mut manager, name, data)?;
    }

    let mut map = PagedFileDeltaMap::new();
    for finished in manager.flush_files().finished {
        map.add_delta_file(&finished.delta);
    }
    let blocks = map
        .delta_blocks_for(std::path::Path::new("base/16384/16397"))?
        .expect("relation touched");
    assert_eq!(workload.blocks_ending_in(2, 4), blocks);
    Ok(())
}

#[test]
fn truncated_segment_is_shipped_but_not_recorded() -> pgdelta::Result<()> {
    let workload = Workload::generate(2, 3);
    let (name, data) = &workload.segments[0];
    let truncated = &data[..3 * WAL_PAGE_SIZE + 100];

    let mut manager = DeltaFileManager::new(DataFolder::memory(), &config())?;
    let mut reader = WalDeltaRecordingReader::new(truncated, name, &mut manager)?;
    let mut shipped = Vec::new();
    reader.read_to_end(&mut shipped)?;
    assert_eq!(truncated, &shipped[..]);
    assert!(reader.is_recording());
    reader.finish()?;

    manager.flush_files();
    assert!(manager.is_canceled("000000010000000000000002_delta"));
    Ok(())
}

#[test]
fn garbage_stops_recording_immediately() -> pgdelta::Result<()> {
    let garbage = vec![0xffu8; 2 * WAL_PAGE_SIZE];
    let mut manager = DeltaFileManager::new(DataFolder::memory(), &config())?;
    let mut reader =
        WalDeltaRecordingReader::new(garbage.as_slice(), "000000010000000000000004", &mut manager)?;
    let mut shipped = Vec::new();
    reader.read_to_end(&mut shipped)?;
    assert_eq!(garbage, shipped);
    assert!(!reader.is_recording());
    reader.finish()?;

    manager.flush_files();
    assert!(manager.is_canceled("000000010000000000000004_delta"));
    Ok(())
}
