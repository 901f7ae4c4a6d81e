//! Choosing between an increment and a full copy for one data file.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use tracing::warn;

use super::IncrementalPageReader;
use crate::page::PAGE_SIZE;
use crate::{Error, Result};

/// What the archiver ships for one relation file.
pub enum PagedFileSource {
    Increment {
        reader: IncrementalPageReader<File>,
        declared_size: u64,
    },
    /// Incremental mode was abandoned for this file.
    Full { file: File, size: u64 },
}

impl PagedFileSource {
    pub fn is_increment(&self) -> bool {
        matches!(self, PagedFileSource::Increment { .. })
    }

    pub fn size(&self) -> u64 {
        match self {
            PagedFileSource::Increment { declared_size, .. } => *declared_size,
            PagedFileSource::Full { size, .. } => *size,
        }
    }
}

/// Whether `path` names a relation file that is stored in 8 KiB pages.
pub fn is_paged_file(path: &Path, size: u64) -> bool {
    if size == 0 || size % PAGE_SIZE as u64 != 0 {
        return false;
    }
    let in_cluster_dir = path.components().any(|c| {
        let c = c.as_os_str();
        c == "base" || c == "pg_tblspc"
    });
    if !in_cluster_dir {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match name.split_once('.') {
        Some((rel, segment)) => all_digits(rel) && all_digits(segment),
        None => all_digits(name),
    }
}

/// Open a relation file for backup against `base_lsn`.
///
/// With `delta_blocks` the diff map comes from WAL delta files and no page
/// scan happens. A page with an invalid header makes the whole file fall back
/// to a full copy.
pub fn open_paged_file(
    path: &Path,
    base_lsn: u64,
    delta_blocks: Option<&BTreeSet<u32>>,
) -> Result<PagedFileSource> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let built = match delta_blocks {
        Some(blocks) => IncrementalPageReader::from_block_set(file, size, blocks),
        None => IncrementalPageReader::new(file, size, base_lsn),
    };
    match built {
        Ok(reader) => {
            let declared_size = reader.declared_size();
            Ok(PagedFileSource::Increment {
                reader,
                declared_size,
            })
        }
        Err(err) => match err.downcast_ref::<Error>() {
            Some(Error::InvalidPage { block }) => {
                warn!(
                    path = %path.display(),
                    block = *block,
                    "invalid page header, falling back to full copy"
                );
                let file = File::open(path)?;
                let size = file.metadata()?.len();
                Ok(PagedFileSource::Full { file, size })
            }
            _ => Err(err),
        },
    }
}
