//! Consumer side of the increment codec.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::FileExt;
use std::path::Path;

use tracing::debug;

use super::{read_exact_or_eof, IncrementHeader};
use crate::page::{is_all_zero, PAGE_SIZE};
use crate::{Error, Result};

/// Patch an existing base copy at `path` with an increment stream.
///
/// The target is resized to the file size recorded in the increment, every
/// shipped page is written at its block offset, and the file is synced before
/// returning.
pub fn apply_file_increment<R: Read>(path: &Path, increment: &mut R) -> Result<()> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let header = IncrementHeader::read_from(increment)?;
    file.set_len(header.file_size)?;
    write_pages(&file, &header, increment, |_| Ok(true))?;
    finish(&file, increment)?;
    debug!(
        path = %path.display(),
        file_size = header.file_size,
        pages = header.blocks.len(),
        "increment_applied"
    );
    Ok(())
}

/// Materialize a fresh file from an increment. Pages missing from the
/// increment stay zero-filled until an older backup provides them.
pub fn create_file_from_increment<R: Read>(increment: &mut R, file: &File) -> Result<()> {
    let header = IncrementHeader::read_from(increment)?;
    file.set_len(header.file_size)?;
    write_pages(file, &header, increment, |_| Ok(true))?;
    finish(file, increment)
}

/// Write only the pages that are still all-zero in `file`.
///
/// Used when increments are restored newest first: pages already written by
/// a newer increment must not be overwritten by older content.
pub fn write_missing_pages<R: Read>(increment: &mut R, file: &File) -> Result<()> {
    let header = IncrementHeader::read_from(increment)?;
    if file.metadata()?.len() < header.file_size {
        file.set_len(header.file_size)?;
    }
    let mut existing = vec![0u8; PAGE_SIZE];
    write_pages(file, &header, increment, |block| {
        let offset = block as u64 * PAGE_SIZE as u64;
        let n = file.read_at(&mut existing, offset)?;
        Ok(n < PAGE_SIZE || is_all_zero(&existing))
    })?;
    finish(file, increment)
}

fn write_pages<R, F>(
    file: &File,
    header: &IncrementHeader,
    increment: &mut R,
    mut should_write: F,
) -> Result<()>
where
    R: Read,
    F: FnMut(u32) -> Result<bool>,
{
    let mut page = vec![0u8; PAGE_SIZE];
    for block in &header.blocks {
        read_exact_or_eof(increment, &mut page, "increment page body")?;
        if should_write(*block)? {
            file.write_all_at(&page, *block as u64 * PAGE_SIZE as u64)?;
        }
    }
    Ok(())
}

fn finish<R: Read>(file: &File, increment: &mut R) -> Result<()> {
    let mut extra = [0u8; 1];
    loop {
        match increment.read(&mut extra) {
            Ok(0) => break,
            Ok(_) => return Err(Error::TrailingData.into()),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    file.sync_all()?;
    Ok(())
}
