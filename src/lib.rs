use thiserror::Error;

pub mod config;
pub mod delta;
pub mod fs;
pub mod increment;
pub mod logging;
pub mod page;
pub mod wal;

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot parse {what}: need {need} bytes, got {got}")]
    Parse {
        what: &'static str,
        need: usize,
        got: usize,
    },
    #[error("block {block} has an invalid page header")]
    InvalidPage { block: u32 },
    #[error("unexpected end of stream: {0}")]
    UnexpectedEof(String),
    #[error("invalid increment header")]
    InvalidIncrementHeader,
    #[error("unknown increment version: {0:#04x}")]
    UnknownIncrementVersion(u8),
    #[error("increment stream has data after the last declared page")]
    TrailingData,
    #[error("out of order block id {id}, previous block id was {previous}")]
    OutOfOrderBlockId { id: u8, previous: u8 },
    #[error("invalid block id: {0}")]
    InvalidBlockId(u8),
    #[error("block reference reuses the relation of a previous block but none was read")]
    NoPrecedingRelFileNode,
    #[error("WAL page ends before the current record is complete")]
    PartialPage,
    #[error("WAL page consists of zero bytes only")]
    ZeroPage,
    #[error("invalid WAL page header: {0}")]
    InvalidWalPageHeader(String),
    #[error("invalid WAL record: {0}")]
    InvalidRecord(String),
    #[error("continuation of the current WAL record was not found")]
    ContinuationNotFound,
    #[error("WAL parser holds record bytes without the record beginning")]
    CantSavePartialParser,
    #[error("WAL data of {0} was discarded after the segment tail had been recorded")]
    CantDiscardWalData(String),
    #[error("not a WAL segment name: {0}")]
    NotWalFilename(String),
    #[error("invalid delta file: {reason}")]
    InvalidDeltaFile { reason: String },
    #[error("invalid part file: {reason}")]
    InvalidPartFile { reason: String },
    #[error("no delta file loaded for {0}")]
    DeltaFileNotFound(String),
    #[error("no such file in data folder: {0}")]
    NoSuchFile(String),
    #[error("cannot resolve relation from path: {0}")]
    UnknownTablespace(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("serialization error")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convert into an `io::Error` for use inside `Read` implementations.
    pub fn into_io(self) -> std::io::Error {
        use std::io::ErrorKind;
        match self {
            Error::Io(err) => err,
            Error::UnexpectedEof(_) => std::io::Error::new(ErrorKind::UnexpectedEof, self),
            other => std::io::Error::new(ErrorKind::InvalidData, other),
        }
    }
}
