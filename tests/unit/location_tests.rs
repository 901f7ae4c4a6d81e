use pgdelta::wal::location::{read_locations, write_locations, BLOCK_LOCATION_SIZE};
use pgdelta::wal::{BlockLocation, TERMINAL_LOCATION};
use pgdelta::Error;

#[test]
fn encodes_fields_little_endian() {
    let location = BlockLocation::new(0x67452301, 0xefcdab89, 0x78563412, 0xf0debc9a);
    let bytes = location.encode();
    assert_eq!(
        [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc,
            0xde, 0xf0
        ],
        bytes
    );
    assert_eq!(location, BlockLocation::decode(&bytes).unwrap());
}

#[test]
fn list_ends_at_terminal_location() -> pgdelta::Result<()> {
    let locations = vec![
        BlockLocation::new(1663, 1, 2, 3),
        BlockLocation::new(1663, 1, 2, 4),
    ];
    let mut buf = Vec::new();
    write_locations(&mut buf, &locations)?;
    assert_eq!(3 * BLOCK_LOCATION_SIZE, buf.len());
    assert!(BlockLocation::decode(&buf[32..])?.is_terminal());

    buf.extend_from_slice(b"parser state follows");
    let mut reader = buf.as_slice();
    assert_eq!(locations, read_locations(&mut reader)?);
    assert_eq!(b"parser state follows", reader);
    Ok(())
}

#[test]
fn list_without_terminal_ends_at_stream_end() -> pgdelta::Result<()> {
    let location = BlockLocation::new(1, 2, 3, 4);
    let bytes = location.encode();
    assert_eq!(vec![location], read_locations(&mut bytes.as_slice())?);
    assert!(TERMINAL_LOCATION.is_terminal());
    Ok(())
}

#[test]
fn truncated_location_is_unexpected_eof() {
    let bytes = BlockLocation::new(1, 2, 3, 4).encode();
    let err = read_locations(&mut &bytes[..10]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::UnexpectedEof(_))
    ));
}
