//! Filesystem capabilities used by the delta accumulator.

pub mod folder;

pub use folder::DataFolder;
