//! Scratch data folder holding part and delta files between runs.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::{Error, Result};

/// Storage for delta accumulation state.
#[derive(Debug, Clone)]
pub enum DataFolder {
    Local(PathBuf),
    /// In-process folder, shared between clones.
    Memory(Arc<Mutex<BTreeMap<String, Vec<u8>>>>),
}

impl DataFolder {
    /// Local folder rooted at `root`, created if missing.
    pub fn local(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(DataFolder::Local(root))
    }

    pub fn memory() -> Self {
        DataFolder::Memory(Arc::default())
    }

    /// Open `name` for reading; a missing file is [`Error::NoSuchFile`].
    pub fn open_readonly(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        match self {
            DataFolder::Local(root) => match File::open(root.join(name)) {
                Ok(file) => Ok(Box::new(file)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    Err(Error::NoSuchFile(name.to_string()).into())
                }
                Err(err) => Err(err.into()),
            },
            DataFolder::Memory(files) => match files.lock().get(name) {
                Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
                None => Err(Error::NoSuchFile(name.to_string()).into()),
            },
        }
    }

    /// Open `name` for writing, truncating previous content.
    pub fn open_write_only(&self, name: &str) -> Result<Box<dyn Write + Send>> {
        match self {
            DataFolder::Local(root) => {
                let path = root.join(name);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                Ok(Box::new(file))
            }
            DataFolder::Memory(files) => {
                files.lock().insert(name.to_string(), Vec::new());
                Ok(Box::new(MemoryFileWriter {
                    files: Arc::clone(files),
                    name: name.to_string(),
                }))
            }
        }
    }

    /// Remove everything inside the folder, keeping the folder itself.
    pub fn clean(&self) -> Result<()> {
        match self {
            DataFolder::Local(root) => {
                for entry in WalkDir::new(root)
                    .min_depth(1)
                    .contents_first(true)
                    .into_iter()
                {
                    let entry = entry.map_err(io::Error::from)?;
                    if entry.file_type().is_dir() {
                        fs::remove_dir(entry.path())?;
                    } else {
                        fs::remove_file(entry.path())?;
                    }
                }
                Ok(())
            }
            DataFolder::Memory(files) => {
                files.lock().clear();
                Ok(())
            }
        }
    }

    /// Names of stored files, relative to the folder root.
    pub fn list(&self) -> Result<Vec<String>> {
        match self {
            DataFolder::Local(root) => {
                let mut names = Vec::new();
                for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
                    let entry = entry.map_err(io::Error::from)?;
                    if entry.file_type().is_file() {
                        if let Ok(rel) = entry.path().strip_prefix(root) {
                            names.push(rel.to_string_lossy().into_owned());
                        }
                    }
                }
                Ok(names)
            }
            DataFolder::Memory(files) => Ok(files.lock().keys().cloned().collect()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        match self {
            DataFolder::Local(root) => Some(root),
            DataFolder::Memory(_) => None,
        }
    }
}

struct MemoryFileWriter {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    name: String,
}

impl Write for MemoryFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.files
            .lock()
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
