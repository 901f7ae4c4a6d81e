use pgdelta::delta::WalPartFile;
use pgdelta::wal::record::{ResourceManager, XLogRecordBlock, XLogRecordBlockHeader, XLogRecordHeader};
use pgdelta::wal::{BlockLocation, XLogRecord};
use pgdelta::Error;

const K: usize = 4;

fn filled() -> WalPartFile {
    let mut part = WalPartFile::new(K);
    part.previous_wal_head = Some(Vec::new());
    for i in 0..K {
        part.wal_tails[i] = Some(Vec::new());
        part.wal_heads[i] = Some(Vec::new());
    }
    part
}

fn encoded_record(block_no: u32) -> Vec<u8> {
    XLogRecord {
        header: XLogRecordHeader {
            resource_manager_id: ResourceManager::Btree as u8,
            ..Default::default()
        },
        blocks: vec![XLogRecordBlock {
            header: XLogRecordBlockHeader {
                location: BlockLocation::new(1663, 13000, 2619, block_no),
                ..Default::default()
            },
            ..Default::default()
        }],
        main_data: vec![1; 12],
        ..Default::default()
    }
    .encode()
}

#[test]
fn complete_only_when_every_slot_is_set() {
    assert!(filled().is_complete());
    assert!(!WalPartFile::new(K).is_complete());

    let mut part = filled();
    part.previous_wal_head = None;
    assert!(!part.is_complete());

    for i in 0..K {
        let mut part = filled();
        part.wal_tails[i] = None;
        assert!(!part.is_complete(), "tail {i}");
        let mut part = filled();
        part.wal_heads[i] = None;
        assert!(!part.is_complete(), "head {i}");
    }
}

#[test]
fn partially_filled_group_starts_at_first_full_slot() -> pgdelta::Result<()> {
    assert_eq!(None, WalPartFile::new(K).is_partially_filled()?);

    let mut part = WalPartFile::new(K);
    part.wal_tails[2] = Some(Vec::new());
    part.wal_heads[2] = Some(vec![1, 2, 3]);
    part.wal_tails[3] = Some(vec![4]);
    assert_eq!(Some(2), part.is_partially_filled()?);

    // entered through the previous group
    part.previous_wal_head = Some(Vec::new());
    assert_eq!(None, part.is_partially_filled()?);
    Ok(())
}

#[test]
fn partially_filled_rejects_half_set_slot() {
    let mut part = WalPartFile::new(K);
    part.wal_heads[1] = Some(vec![1]);
    part.wal_tails[2] = Some(Vec::new());
    part.wal_heads[2] = Some(Vec::new());
    let err = part.is_partially_filled().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidPartFile { .. })
    ));
}

#[test]
fn complete_part_file_fills_only_earlier_slots() {
    let mut part = WalPartFile::new(K);
    part.wal_tails[2] = Some(Vec::new());
    part.wal_heads[2] = Some(vec![1, 2, 3]);
    part.complete_part_file(2);

    assert_eq!(Some(Vec::new()), part.previous_wal_head);
    for i in 0..2 {
        assert_eq!(Some(Vec::new()), part.wal_tails[i], "tail {i}");
        assert_eq!(Some(Vec::new()), part.wal_heads[i], "head {i}");
    }
    assert_eq!(Some(vec![1, 2, 3]), part.wal_heads[2]);
    assert_eq!(None, part.wal_tails[3]);
    assert_eq!(None, part.wal_heads[3]);
    assert!(!part.is_complete());

    part.wal_tails[3] = Some(vec![4, 5, 6]);
    part.wal_heads[3] = Some(Vec::new());
    assert!(part.is_complete());
}

#[test]
fn combines_records_across_segment_boundaries() -> pgdelta::Result<()> {
    let first = encoded_record(7);
    let second = encoded_record(8);
    let mut part = filled();
    part.previous_wal_head = Some(first[..10].to_vec());
    part.wal_tails[0] = Some(first[10..].to_vec());
    part.wal_heads[1] = Some(second[..30].to_vec());
    part.wal_tails[2] = Some(second[30..].to_vec());

    let records = part.combine_records()?;
    let blocks: Vec<u32> = records
        .iter()
        .flat_map(|r| r.block_locations())
        .map(|l| l.block_no)
        .collect();
    assert_eq!(vec![7, 8], blocks);
    Ok(())
}

#[test]
fn combine_fails_on_mismatched_fragments() {
    let record = encoded_record(7);
    let mut part = filled();
    part.wal_heads[0] = Some(record[..40].to_vec());
    assert!(part.combine_records().is_err());
}

#[test]
fn save_and_load_keep_unset_slots_unset() -> pgdelta::Result<()> {
    let mut part = WalPartFile::new(K);
    part.previous_wal_head = Some(vec![9; 5]);
    part.wal_tails[1] = Some(Vec::new());
    part.wal_heads[3] = Some(vec![4; 100]);

    let mut buf = Vec::new();
    part.save(&mut buf)?;
    let loaded = WalPartFile::load(&mut buf.as_slice(), K)?;
    assert_eq!(part, loaded);
    assert_eq!(None, loaded.wal_tails[0]);
    assert_eq!(Some(Vec::new()), loaded.wal_tails[1]);
    Ok(())
}

#[test]
fn load_rejects_other_group_size() -> pgdelta::Result<()> {
    let mut buf = Vec::new();
    WalPartFile::new(K).save(&mut buf)?;
    let err = WalPartFile::load(&mut buf.as_slice(), 16).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidPartFile { .. })
    ));
    Ok(())
}

#[test]
fn load_rejects_oversized_part_length() -> pgdelta::Result<()> {
    let mut buf = Vec::new();
    WalPartFile::new(K).save(&mut buf)?;
    // tail slot 0 claiming u32::MAX bytes with nothing after it
    buf.extend_from_slice(&[0, 0]);
    buf.extend_from_slice(&u32::MAX.to_le_bytes());
    let err = WalPartFile::load(&mut buf.as_slice(), K).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::UnexpectedEof(_))
    ));
    Ok(())
}
