//! Changed block locations collected for one group of WAL segments.

use std::io::{Read, Write};

use crate::increment::read_exact_or_eof;
use crate::wal::location::{read_locations, write_locations, BlockLocation};
use crate::wal::parser::WalParser;
use crate::{Error, Result};

const DELTA_MAGIC: &[u8; 8] = b"PGDDELTA";
const DELTA_VERSION: u16 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaFile {
    pub locations: Vec<BlockLocation>,
    /// State for records still open at the end of the group.
    pub wal_parser: WalParser,
}

impl DeltaFile {
    pub fn new(wal_parser: WalParser) -> Self {
        Self {
            locations: Vec::new(),
            wal_parser,
        }
    }

    pub fn add_locations(&mut self, locations: impl IntoIterator<Item = BlockLocation>) {
        self.locations.extend(locations);
    }

    /// Locations in first-seen order with repeats removed.
    pub fn unique_locations(&self) -> Vec<BlockLocation> {
        let mut seen = std::collections::HashSet::with_capacity(self.locations.len());
        self.locations
            .iter()
            .copied()
            .filter(|l| seen.insert(*l))
            .collect()
    }

    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(DELTA_MAGIC)?;
        writer.write_all(&DELTA_VERSION.to_le_bytes())?;
        write_locations(writer, &self.locations)?;
        self.wal_parser.save(writer)
    }

    pub fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; 10];
        read_exact_or_eof(reader, &mut header, "delta file header")?;
        if &header[..8] != DELTA_MAGIC {
            return Err(Error::InvalidDeltaFile {
                reason: "bad magic".into(),
            }
            .into());
        }
        let version = u16::from_le_bytes([header[8], header[9]]);
        if version != DELTA_VERSION {
            return Err(Error::InvalidDeltaFile {
                reason: format!("unsupported version {version}"),
            }
            .into());
        }
        let locations = read_locations(reader)?;
        let wal_parser = WalParser::load(reader)?;
        Ok(Self {
            locations,
            wal_parser,
        })
    }
}
