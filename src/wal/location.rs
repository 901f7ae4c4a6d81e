//! Block locations and their fixed-width encoding.

use std::fmt;
use std::io::{Read, Write};

use crate::increment::read_full;
use crate::{Error, Result};

/// Encoded size of a [`BlockLocation`].
pub const BLOCK_LOCATION_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RelFileNode {
    pub spc_node: u32,
    pub db_node: u32,
    pub rel_node: u32,
}

impl fmt::Display for RelFileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.spc_node, self.db_node, self.rel_node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockLocation {
    pub rel: RelFileNode,
    pub block_no: u32,
}

/// End-of-list sentinel. Block 0 of relation 0/0/0 is never addressed by
/// PostgreSQL, so the all-zero value cannot collide with a real location.
pub const TERMINAL_LOCATION: BlockLocation = BlockLocation {
    rel: RelFileNode {
        spc_node: 0,
        db_node: 0,
        rel_node: 0,
    },
    block_no: 0,
};

impl BlockLocation {
    pub fn new(spc_node: u32, db_node: u32, rel_node: u32, block_no: u32) -> Self {
        Self {
            rel: RelFileNode {
                spc_node,
                db_node,
                rel_node,
            },
            block_no,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == TERMINAL_LOCATION
    }

    pub fn encode(&self) -> [u8; BLOCK_LOCATION_SIZE] {
        let mut out = [0u8; BLOCK_LOCATION_SIZE];
        out[0..4].copy_from_slice(&self.rel.spc_node.to_le_bytes());
        out[4..8].copy_from_slice(&self.rel.db_node.to_le_bytes());
        out[8..12].copy_from_slice(&self.rel.rel_node.to_le_bytes());
        out[12..16].copy_from_slice(&self.block_no.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOCK_LOCATION_SIZE {
            return Err(Error::Parse {
                what: "block location",
                need: BLOCK_LOCATION_SIZE,
                got: bytes.len(),
            }
            .into());
        }
        let u32_at = |off: usize| {
            u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };
        Ok(Self::new(u32_at(0), u32_at(4), u32_at(8), u32_at(12)))
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.rel, self.block_no)
    }
}

/// Write `locations` followed by the terminal location.
pub fn write_locations<W: Write>(writer: &mut W, locations: &[BlockLocation]) -> Result<()> {
    for location in locations {
        writer.write_all(&location.encode())?;
    }
    writer.write_all(&TERMINAL_LOCATION.encode())?;
    Ok(())
}

/// Read locations until the terminal location or a clean end of stream.
pub fn read_locations<R: Read>(reader: &mut R) -> Result<Vec<BlockLocation>> {
    let mut locations = Vec::new();
    let mut buf = [0u8; BLOCK_LOCATION_SIZE];
    loop {
        let n = read_full(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        if n < BLOCK_LOCATION_SIZE {
            return Err(Error::UnexpectedEof(format!(
                "block location cut after {n} bytes"
            ))
            .into());
        }
        let location = BlockLocation::decode(&buf)?;
        if location.is_terminal() {
            break;
        }
        locations.push(location);
    }
    Ok(locations)
}
