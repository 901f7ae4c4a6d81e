//! Changed blocks per relation, assembled from delta files.

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path};

use super::delta_file::DeltaFile;
use crate::page::PAGE_SIZE;
use crate::wal::location::{BlockLocation, RelFileNode};
use crate::{Error, Result};

/// OID of `pg_default`.
pub const DEFAULT_TABLESPACE_OID: u32 = 1663;
/// Blocks in one 1 GiB relation segment file (`RELSEG_SIZE`).
pub const BLOCKS_IN_REL_FILE: u32 = (1024 * 1024 * 1024 / PAGE_SIZE) as u32;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagedFileDeltaMap {
    blocks: HashMap<RelFileNode, BTreeSet<u32>>,
}

impl PagedFileDeltaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_location(&mut self, location: BlockLocation) {
        self.blocks
            .entry(location.rel)
            .or_default()
            .insert(location.block_no);
    }

    pub fn add_locations(&mut self, locations: impl IntoIterator<Item = BlockLocation>) {
        for location in locations {
            self.add_location(location);
        }
    }

    pub fn add_delta_file(&mut self, delta: &DeltaFile) {
        self.add_locations(delta.locations.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.blocks.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Changed blocks of the relation segment file at `path`, numbered from
    /// the start of that segment file. `None` when the relation never
    /// appeared in the WAL.
    pub fn delta_blocks_for(&self, path: &Path) -> Result<Option<BTreeSet<u32>>> {
        let (rel, segment_no) = rel_file_node_from_path(path)?;
        let Some(blocks) = self.blocks.get(&rel) else {
            return Ok(None);
        };
        let first = segment_no.saturating_mul(BLOCKS_IN_REL_FILE);
        let last = first.saturating_add(BLOCKS_IN_REL_FILE);
        Ok(Some(blocks.range(first..last).map(|b| b - first).collect()))
    }
}

/// Relation and segment number of a relation file path.
///
/// Accepts `.../base/<db>/<rel>[.<seg>]` (default tablespace) and
/// `.../pg_tblspc/<spc>/<version dir>/<db>/<rel>[.<seg>]`.
pub fn rel_file_node_from_path(path: &Path) -> Result<(RelFileNode, u32)> {
    let unknown = || Error::UnknownTablespace(path.display().to_string());
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let n = parts.len();
    if n < 3 {
        return Err(unknown().into());
    }

    let (rel_part, segment_no) = match parts[n - 1].split_once('.') {
        Some((rel, seg)) => (rel, seg.parse::<u32>().map_err(|_| unknown())?),
        None => (parts[n - 1], 0),
    };
    let rel_node: u32 = rel_part.parse().map_err(|_| unknown())?;
    let db_node: u32 = parts[n - 2].parse().map_err(|_| unknown())?;

    let spc_node = if parts[n - 3] == "base" {
        DEFAULT_TABLESPACE_OID
    } else if n >= 5 && parts[n - 5] == "pg_tblspc" {
        parts[n - 4].parse().map_err(|_| unknown())?
    } else {
        return Err(unknown().into());
    };

    Ok((
        RelFileNode {
            spc_node,
            db_node,
            rel_node,
        },
        segment_no,
    ))
}
