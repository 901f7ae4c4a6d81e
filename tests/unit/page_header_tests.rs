use pgdelta::page::{classify, PageHeader, PageState, PAGE_HEADER_SIZE, PAGE_SIZE};
use pgdelta::Error;

fn page_with_lsn(lsn: u64) -> Vec<u8> {
    let mut page = vec![0u8; PAGE_SIZE];
    page[0..4].copy_from_slice(&((lsn >> 32) as u32).to_le_bytes());
    page[4..8].copy_from_slice(&(lsn as u32).to_le_bytes());
    page[12..14].copy_from_slice(&40u16.to_le_bytes());
    page[14..16].copy_from_slice(&8000u16.to_le_bytes());
    page[16..18].copy_from_slice(&8192u16.to_le_bytes());
    page[18..20].copy_from_slice(&8196u16.to_le_bytes());
    page[100] = 0xab;
    page
}

#[test]
fn parses_lsn_halves() -> pgdelta::Result<()> {
    let header = PageHeader::parse(&page_with_lsn(0x0000_0002_0000_0010))?;
    assert_eq!(2, header.lsn_hi);
    assert_eq!(0x10, header.lsn_lo);
    assert_eq!(0x0000_0002_0000_0010, header.lsn());
    assert!(header.is_valid());
    Ok(())
}

#[test]
fn short_input_is_parse_error() {
    let err = PageHeader::parse(&[0u8; PAGE_HEADER_SIZE - 1]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::Parse { need: 24, got: 23, .. })
    ));
}

#[test]
fn rejects_inconsistent_pointers_and_flags() -> pgdelta::Result<()> {
    let cases: [(usize, u16); 5] = [
        (10, 0x0008),  // unknown flag
        (12, 16),      // lower inside the header
        (14, 30),      // upper below lower
        (16, 8300),    // special beyond the page
        (18, 8192 + 5), // layout version
    ];
    for (offset, value) in cases {
        let mut page = page_with_lsn(500);
        page[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        let header = PageHeader::parse(&page)?;
        assert!(!header.is_valid(), "offset {offset} value {value}");
        assert_eq!(PageState::Invalid, classify(&page)?);
    }
    Ok(())
}

#[test]
fn zero_lsn_is_invalid_but_all_zero_page_is_its_own_state() -> pgdelta::Result<()> {
    let page = page_with_lsn(0);
    assert!(!PageHeader::parse(&page)?.is_valid());
    assert_eq!(PageState::Invalid, classify(&page)?);

    let zero = vec![0u8; PAGE_SIZE];
    assert_eq!(PageState::AllZero, classify(&zero)?);
    assert_eq!(Some(true), PageState::AllZero.changed_since(100));
    Ok(())
}

#[test]
fn validity_is_stable_across_calls() -> pgdelta::Result<()> {
    let page = page_with_lsn(77);
    let first = PageHeader::parse(&page)?.is_valid();
    for _ in 0..3 {
        assert_eq!(first, PageHeader::parse(&page)?.is_valid());
    }
    assert_eq!(Some(true), classify(&page)?.changed_since(77));
    assert_eq!(Some(false), classify(&page)?.changed_since(78));
    Ok(())
}
