use std::io::{Read, Write};

use pgdelta::fs::DataFolder;
use pgdelta::Error;
use tempfile::tempdir;

fn write_file(folder: &DataFolder, name: &str, data: &[u8]) -> pgdelta::Result<()> {
    let mut writer = folder.open_write_only(name)?;
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
}

fn read_file(folder: &DataFolder, name: &str) -> pgdelta::Result<Vec<u8>> {
    let mut out = Vec::new();
    folder.open_readonly(name)?.read_to_end(&mut out)?;
    Ok(out)
}

fn exercise(folder: &DataFolder) -> pgdelta::Result<()> {
    let err = folder.open_readonly("missing").err().expect("missing file");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NoSuchFile(name)) if name == "missing"
    ));

    write_file(folder, "a_delta", b"first version")?;
    write_file(folder, "a_delta", b"second")?;
    assert_eq!(b"second".to_vec(), read_file(folder, "a_delta")?);

    write_file(folder, "b_delta_part", b"part")?;
    assert_eq!(vec!["a_delta".to_string(), "b_delta_part".to_string()], folder.list()?);

    folder.clean()?;
    assert!(folder.list()?.is_empty());
    assert!(folder.open_readonly("a_delta").is_err());
    Ok(())
}

#[test]
fn local_folder_reads_writes_and_cleans() -> pgdelta::Result<()> {
    let dir = tempdir()?;
    let root = dir.path().join("delta_data");
    let folder = DataFolder::local(&root)?;
    assert_eq!(Some(root.as_path()), folder.root());
    exercise(&folder)?;
    assert!(root.is_dir());
    Ok(())
}

#[test]
fn local_clean_removes_nested_directories() -> pgdelta::Result<()> {
    let dir = tempdir()?;
    let folder = DataFolder::local(dir.path())?;
    write_file(&folder, "nested/deeper/file", b"x")?;
    folder.clean()?;
    assert_eq!(0, std::fs::read_dir(dir.path())?.count());
    Ok(())
}

#[test]
fn memory_folder_is_shared_between_clones() -> pgdelta::Result<()> {
    let folder = DataFolder::memory();
    assert_eq!(None, folder.root());
    exercise(&folder)?;

    let clone = folder.clone();
    write_file(&clone, "shared", b"1")?;
    assert_eq!(b"1".to_vec(), read_file(&folder, "shared")?);
    Ok(())
}
