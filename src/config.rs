//! Settings for delta accumulation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::wal::{DEFAULT_WAL_SEGMENT_SIZE, WAL_PAGE_SIZE};
use crate::{Error, Result};

pub const DEFAULT_WAL_FILES_IN_DELTA: u64 = 16;
const MIN_WAL_SEGMENT_SIZE: u64 = 1024 * 1024;
const MAX_WAL_SEGMENT_SIZE: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Number of consecutive WAL segments per delta file.
    pub wal_files_in_delta: u64,
    pub wal_segment_size: u64,
    /// Local scratch folder for part and delta files between runs.
    pub data_folder: Option<PathBuf>,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            wal_files_in_delta: DEFAULT_WAL_FILES_IN_DELTA,
            wal_segment_size: DEFAULT_WAL_SEGMENT_SIZE,
            data_folder: None,
        }
    }
}

impl DeltaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.wal_files_in_delta == 0 || self.wal_files_in_delta > u8::MAX as u64 {
            return Err(Error::InvalidConfig(format!(
                "wal_files_in_delta must be within 1..=255, got {}",
                self.wal_files_in_delta
            ))
            .into());
        }
        let size = self.wal_segment_size;
        if !size.is_power_of_two()
            || !(MIN_WAL_SEGMENT_SIZE..=MAX_WAL_SEGMENT_SIZE).contains(&size)
            || size % WAL_PAGE_SIZE as u64 != 0
        {
            return Err(Error::InvalidConfig(format!(
                "wal_segment_size must be a power of two between 1MiB and 1GiB, got {size}"
            ))
            .into());
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: DeltaConfig = serde_json::from_str(&raw).map_err(Error::from)?;
        config.validate()?;
        Ok(config)
    }
}
