//! Delta files: block locations collected from WAL, one file per group of
//! consecutive segments.

pub mod delta_file;
pub mod manager;
pub mod map;
pub mod part_file;
pub mod recording;

pub use delta_file::DeltaFile;
pub use manager::{CancellationHandle, DeltaFileManager, FinishedDelta, FlushResult};
pub use map::PagedFileDeltaMap;
pub use part_file::WalPartFile;
pub use recording::WalDeltaRecordingReader;
