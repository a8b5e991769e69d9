mod common;

use common::{container, enters, full, mdhd, mvhd, parse, tkhd, u32s};
use isowalk::payload::{Detail, EditList};

/// `elst` v0 with (segment_duration, media_time) rows at rate 1.0.
fn elst(rows: &[(u32, i32)]) -> Vec<u8> {
    let mut body = u32s(&[rows.len() as u32]);
    for &(duration, media_time) in rows {
        body.extend_from_slice(&duration.to_be_bytes());
        body.extend_from_slice(&media_time.to_be_bytes());
        body.extend_from_slice(&[0, 1, 0, 0]);
    }
    full(b"elst", 0, 0, &body)
}

fn edit_lists(events: &[isowalk::ParseEvent]) -> Vec<EditList> {
    enters(events, b"elst")
        .into_iter()
        .map(|e| match e.payload.as_ref().and_then(|p| p.detail.as_ref()) {
            Some(Detail::EditList(l)) => l.clone(),
            other => panic!("expected edit list, got {:?}", other),
        })
        .collect()
}

#[test]
fn edit_list_uses_movie_and_media_timescales() {
    let trak = container(
        b"trak",
        &[
            tkhd(1),
            container(b"mdia", &[mdhd(48000)]),
            container(b"edts", &[elst(&[(600, -1), (1200, 96000)])]),
        ],
    );
    let data = container(b"moov", &[mvhd(600), trak]);

    let (events, store) = parse(data);
    assert!(store.is_empty(), "{:?}", store.issues());
    let list = &edit_lists(&events)[0];

    assert_eq!(list.movie_timescale, Some(600));
    assert_eq!(list.media_timescale, Some(48000));

    let empty = &list.entries[0];
    assert!(empty.is_empty_edit());
    assert_eq!(empty.segment_duration_seconds, Some(1.0));
    assert_eq!(empty.media_time_seconds, None);

    let edit = &list.entries[1];
    assert_eq!(edit.presentation_start, Some(600));
    assert_eq!(edit.presentation_start_seconds, Some(1.0));
    assert_eq!(edit.segment_duration_seconds, Some(2.0));
    assert_eq!(edit.media_time_seconds, Some(2.0));
    assert_eq!(edit.media_rate(), 1.0);
}

#[test]
fn closed_track_timescale_is_reused_by_track_id() {
    let first = container(b"trak", &[tkhd(7), container(b"mdia", &[mdhd(90000)])]);
    // No media header of its own; the closed track with the same id has one.
    let second = container(
        b"trak",
        &[tkhd(7), container(b"edts", &[elst(&[(10, 0)])])],
    );
    let third = container(
        b"trak",
        &[tkhd(8), container(b"edts", &[elst(&[(10, 0)])])],
    );
    let data = container(b"moov", &[mvhd(1000), first, second, third]);

    let (events, _) = parse(data);
    let lists = edit_lists(&events);
    assert_eq!(lists[0].media_timescale, Some(90000));
    assert_eq!(lists[1].media_timescale, None);
    assert_eq!(lists[1].entries[0].media_time_seconds, None);
    assert_eq!(lists[1].movie_timescale, Some(1000));
}

#[test]
fn edit_list_without_movie_header_has_no_seconds() {
    let data = container(b"trak", &[container(b"edts", &[elst(&[(500, 0)])])]);
    let (events, _) = parse(data);
    let list = &edit_lists(&events)[0];
    assert_eq!(list.movie_timescale, None);
    assert_eq!(list.entries[0].segment_duration_seconds, None);
    assert_eq!(list.entries[0].presentation_start, Some(0));
}
