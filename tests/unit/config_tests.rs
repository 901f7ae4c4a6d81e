use std::fs;

use pgdelta::config::{DeltaConfig, DEFAULT_WAL_FILES_IN_DELTA};
use pgdelta::wal::DEFAULT_WAL_SEGMENT_SIZE;
use pgdelta::Error;
use tempfile::tempdir;

#[test]
fn defaults_are_valid() -> pgdelta::Result<()> {
    let config = DeltaConfig::default();
    assert_eq!(DEFAULT_WAL_FILES_IN_DELTA, config.wal_files_in_delta);
    assert_eq!(DEFAULT_WAL_SEGMENT_SIZE, config.wal_segment_size);
    config.validate()
}

#[test]
fn missing_fields_take_defaults() -> pgdelta::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("delta.json");
    fs::write(&path, r#"{ "wal_files_in_delta": 4, "data_folder": "/var/lib/pgdelta" }"#)?;

    let config = DeltaConfig::from_json_file(&path)?;
    assert_eq!(4, config.wal_files_in_delta);
    assert_eq!(DEFAULT_WAL_SEGMENT_SIZE, config.wal_segment_size);
    assert_eq!(Some("/var/lib/pgdelta".into()), config.data_folder);
    Ok(())
}

#[test]
fn rejects_out_of_range_values() {
    let cases = [
        DeltaConfig {
            wal_files_in_delta: 0,
            ..Default::default()
        },
        DeltaConfig {
            wal_segment_size: 3 * 1024 * 1024,
            ..Default::default()
        },
        DeltaConfig {
            wal_segment_size: 512 * 1024,
            ..Default::default()
        },
        DeltaConfig {
            wal_segment_size: 2 * 1024 * 1024 * 1024,
            ..Default::default()
        },
    ];
    for config in cases {
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err.downcast_ref::<Error>(), Some(Error::InvalidConfig(_))),
            "{config:?}"
        );
    }
}

#[test]
fn malformed_json_is_serde_error() -> pgdelta::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("delta.json");
    fs::write(&path, "{ wal_files_in_delta: ")?;
    let err = DeltaConfig::from_json_file(&path).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Serde(_))));
    Ok(())
}
