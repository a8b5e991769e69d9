mod common;

use common::{bx, ftyp};
use isowalk::boxes::FourCC;
use isowalk::parser::{HeaderError, read_box_header};
use isowalk::source::MemorySource;

#[test]
fn read_single_ftyp_header() {
    let data = ftyp();
    let len = data.len() as u64;
    let src = MemorySource::new(data);

    let hdr = read_box_header(&src, 0, None).expect("read_box_header failed");

    assert_eq!(hdr.start(), 0);
    assert_eq!(hdr.total_size, len);
    assert_eq!(hdr.typ, FourCC(*b"ftyp"));
    assert_eq!(hdr.header_size, 8);
    assert_eq!(hdr.payload, 8..len);
    assert_eq!(hdr.uuid, None);
}

#[test]
fn largesize_header_is_sixteen_bytes() {
    let mut v = Vec::new();
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&20u64.to_be_bytes());
    v.extend_from_slice(&[0xAA; 4]);
    let src = MemorySource::new(v);

    let hdr = read_box_header(&src, 0, None).unwrap();
    assert_eq!(hdr.header_size, 16);
    assert_eq!(hdr.total_size, 20);
    assert_eq!(hdr.payload, 16..20);
}

#[test]
fn uuid_headers_carry_extended_type() {
    let id = [7u8; 16];
    let mut v = Vec::new();
    v.extend_from_slice(&28u32.to_be_bytes());
    v.extend_from_slice(b"uuid");
    v.extend_from_slice(&id);
    v.extend_from_slice(&[1, 2, 3, 4]);

    let mut large = Vec::new();
    large.extend_from_slice(&1u32.to_be_bytes());
    large.extend_from_slice(b"uuid");
    large.extend_from_slice(&32u64.to_be_bytes());
    large.extend_from_slice(&id);
    v.extend_from_slice(&large);

    let src = MemorySource::new(v);
    let first = read_box_header(&src, 0, None).unwrap();
    assert_eq!(first.header_size, 24);
    assert_eq!(first.uuid, Some(id));
    assert_eq!(first.payload.start, 24);

    let second = read_box_header(&src, 28, None).unwrap();
    assert_eq!(second.header_size, 32);
    assert_eq!(second.total_size, 32);
    assert!(second.payload.is_empty());
}

#[test]
fn zero_size_extends_to_parent_end() {
    let mut data = ftyp();
    let offset = data.len() as u64;
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(b"mdat");
    data.extend_from_slice(&[0u8; 100]);
    let len = data.len() as u64;
    let src = MemorySource::new(data);

    let hdr = read_box_header(&src, offset, Some(&(0..len))).unwrap();
    assert_eq!(hdr.total_size, len - offset);
    assert_eq!(hdr.end(), len);

    match read_box_header(&src, offset, None) {
        Err(HeaderError::ZeroSizeWithoutParent { offset: o }) => assert_eq!(o, offset),
        other => panic!("expected ZeroSizeWithoutParent, got {:?}", other),
    }
}

#[test]
fn size_smaller_than_header_is_invalid() {
    let mut v = 4u32.to_be_bytes().to_vec();
    v.extend_from_slice(b"free");
    let src = MemorySource::new(v);
    match read_box_header(&src, 0, None) {
        Err(e @ HeaderError::InvalidSize { size: 4, header_size: 8, .. }) => {
            assert_eq!(e.code(), "header.invalid_size")
        }
        other => panic!("expected InvalidSize, got {:?}", other),
    }
}

#[test]
fn control_bytes_in_type_are_rejected() {
    let mut v = 16u32.to_be_bytes().to_vec();
    v.extend_from_slice(&[b'm', 0x01, b'o', b'v']);
    v.extend_from_slice(&[0u8; 8]);
    let src = MemorySource::new(v);
    match read_box_header(&src, 0, None) {
        Err(HeaderError::InvalidFourCC { offset, .. }) => assert_eq!(offset, 4),
        other => panic!("expected InvalidFourCC, got {:?}", other),
    }
}

#[test]
fn truncated_fields_report_what_was_missing() {
    let src = MemorySource::new(vec![0, 0, 0, 24, b'f', b't']);
    match read_box_header(&src, 0, None) {
        Err(HeaderError::TruncatedField {
            field,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(field, "type");
            assert_eq!(expected, 4);
            assert_eq!(actual, 2);
        }
        other => panic!("expected TruncatedField, got {:?}", other),
    }

    let mut v = 1u32.to_be_bytes().to_vec();
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&[0, 0, 0]);
    let src = MemorySource::new(v);
    match read_box_header(&src, 0, None) {
        Err(HeaderError::TruncatedField { field, .. }) => assert_eq!(field, "largesize"),
        other => panic!("expected TruncatedField, got {:?}", other),
    }
}

#[test]
fn box_past_source_end_is_rejected_before_parent() {
    let mut v = 64u32.to_be_bytes().to_vec();
    v.extend_from_slice(b"free");
    v.extend_from_slice(&[0u8; 8]);
    let src = MemorySource::new(v);
    match read_box_header(&src, 0, Some(&(0..12))) {
        Err(HeaderError::ExceedsSource { end, len, .. }) => {
            assert_eq!(end, 64);
            assert_eq!(len, 16);
        }
        other => panic!("expected ExceedsSource, got {:?}", other),
    }
}

#[test]
fn child_past_parent_end_is_rejected() {
    let child = bx(b"free", &[0u8; 8]);
    let mut data = bx(b"moov", &[]);
    data.extend_from_slice(&child);
    let src = MemorySource::new(data);
    // Parent claims only 12 bytes of the 16-byte child.
    match read_box_header(&src, 8, Some(&(8..20))) {
        Err(HeaderError::ExceedsParent { end, parent_end, .. }) => {
            assert_eq!(end, 24);
            assert_eq!(parent_end, 20);
        }
        other => panic!("expected ExceedsParent, got {:?}", other),
    }
}

#[test]
fn offsets_outside_bounds_are_rejected() {
    let src = MemorySource::new(ftyp());
    match read_box_header(&src, 4, Some(&(8..16))) {
        Err(HeaderError::OffsetOutsideParent { offset: 4, .. }) => {}
        other => panic!("expected OffsetOutsideParent, got {:?}", other),
    }
    match read_box_header(&src, 100, Some(&(0..200))) {
        Err(HeaderError::OffsetBeyondSource { offset: 100, .. }) => {}
        other => panic!("expected OffsetBeyondSource, got {:?}", other),
    }
}

#[test]
fn oversized_largesize_is_out_of_range() {
    let mut v = 1u32.to_be_bytes().to_vec();
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&u64::MAX.to_be_bytes());
    let src = MemorySource::new(v);
    match read_box_header(&src, 0, None) {
        Err(HeaderError::SizeOutOfRange { size, .. }) => assert_eq!(size, u64::MAX),
        other => panic!("expected SizeOutOfRange, got {:?}", other),
    }
}
