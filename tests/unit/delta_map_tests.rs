use std::collections::BTreeSet;
use std::path::Path;

use pgdelta::delta::map::{rel_file_node_from_path, BLOCKS_IN_REL_FILE, DEFAULT_TABLESPACE_OID};
use pgdelta::delta::{DeltaFile, PagedFileDeltaMap};
use pgdelta::wal::parser::WalParser;
use pgdelta::wal::{BlockLocation, RelFileNode};
use pgdelta::Error;

#[test]
fn resolves_default_and_custom_tablespaces() -> pgdelta::Result<()> {
    let (rel, seg) = rel_file_node_from_path(Path::new("/pgdata/base/16384/16397"))?;
    assert_eq!(
        RelFileNode {
            spc_node: DEFAULT_TABLESPACE_OID,
            db_node: 16384,
            rel_node: 16397,
        },
        rel
    );
    assert_eq!(0, seg);

    let (rel, seg) = rel_file_node_from_path(Path::new(
        "/pgdata/pg_tblspc/24576/PG_13_202007201/16384/16397.2",
    ))?;
    assert_eq!(24576, rel.spc_node);
    assert_eq!(16397, rel.rel_node);
    assert_eq!(2, seg);
    Ok(())
}

#[test]
fn unknown_layouts_are_rejected() {
    for path in [
        "/pgdata/global/1262",
        "/pgdata/base/16384/16397_fsm",
        "/pgdata/base/16384/16397.x",
        "16397",
    ] {
        let err = rel_file_node_from_path(Path::new(path)).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<Error>(), Some(Error::UnknownTablespace(_))),
            "{path}"
        );
    }
}

#[test]
fn blocks_are_split_by_relation_segment() -> pgdelta::Result<()> {
    let mut map = PagedFileDeltaMap::new();
    assert!(map.is_empty());
    map.add_locations([
        BlockLocation::new(1663, 16384, 16397, 3),
        BlockLocation::new(1663, 16384, 16397, 3),
        BlockLocation::new(1663, 16384, 16397, BLOCKS_IN_REL_FILE + 1),
        BlockLocation::new(1663, 16384, 16400, 0),
    ]);
    assert_eq!(3, map.len());

    let first = map.delta_blocks_for(Path::new("base/16384/16397"))?;
    assert_eq!(Some(BTreeSet::from([3])), first);
    let second = map.delta_blocks_for(Path::new("base/16384/16397.1"))?;
    assert_eq!(Some(BTreeSet::from([1])), second);
    let third = map.delta_blocks_for(Path::new("base/16384/16397.2"))?;
    assert_eq!(Some(BTreeSet::new()), third);
    assert_eq!(None, map.delta_blocks_for(Path::new("base/16384/99999"))?);
    Ok(())
}

#[test]
fn merges_delta_files() -> pgdelta::Result<()> {
    let mut first = DeltaFile::new(WalParser::new());
    first.add_locations([BlockLocation::new(1663, 1, 2, 5)]);
    let mut second = DeltaFile::new(WalParser::new());
    second.add_locations([BlockLocation::new(1663, 1, 2, 7), BlockLocation::new(1663, 1, 2, 5)]);

    let mut map = PagedFileDeltaMap::new();
    map.add_delta_file(&first);
    map.add_delta_file(&second);
    assert_eq!(
        Some(BTreeSet::from([5, 7])),
        map.delta_blocks_for(Path::new("base/1/2"))?
    );
    Ok(())
}
