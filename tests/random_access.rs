mod common;

use common::{bx, container, enters, exits, ftyp, full, mfhd, parse, tfdt_v1, tfhd, u32s};
use isowalk::payload::{Detail, ResolvedSample, TrackRun};

/// One fragment for track 1, sequence 5: two samples at data offsets
/// 5256 and 6256, decode times 9000 and 9100.
fn fragment() -> Vec<u8> {
    let flags = TrackRun::DATA_OFFSET_PRESENT
        | TrackRun::SAMPLE_DURATION_PRESENT
        | TrackRun::SAMPLE_SIZE_PRESENT
        | TrackRun::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT;
    let mut trun_body = u32s(&[2]);
    trun_body.extend_from_slice(&256i32.to_be_bytes());
    trun_body.extend_from_slice(&u32s(&[100, 1000, 10, 100, 1200]));
    trun_body.extend_from_slice(&(-5i32).to_be_bytes());

    let mut tfhd_extra = 5000u64.to_be_bytes().to_vec();
    tfhd_extra.extend_from_slice(&u32s(&[0x0001_0000]));

    container(
        b"moof",
        &[
            mfhd(5),
            container(
                b"traf",
                &[
                    tfhd(1, 0x1 | 0x20, &tfhd_extra),
                    tfdt_v1(9000),
                    full(b"trun", 1, flags, &trun_body),
                ],
            ),
        ],
    )
}

/// `tfra` v1 with one-byte traf/trun/sample numbers.
fn tfra(track_id: u32, entries: &[(u64, u64, u8, u8, u8)]) -> Vec<u8> {
    let mut body = u32s(&[track_id, 0, entries.len() as u32]);
    for &(time, moof, traf, trun, sample) in entries {
        body.extend_from_slice(&time.to_be_bytes());
        body.extend_from_slice(&moof.to_be_bytes());
        body.extend_from_slice(&[traf, trun, sample]);
    }
    full(b"tfra", 1, 0, &body)
}

fn mfra(tables: &[Vec<u8>]) -> Vec<u8> {
    let len: usize = tables.iter().map(Vec::len).sum::<usize>() + 8 + 16;
    let mut children = tables.to_vec();
    children.push(full(b"mfro", 0, 0, &u32s(&[len as u32])));
    container(b"mfra", &children)
}

fn expected_second_sample() -> ResolvedSample {
    ResolvedSample {
        fragment_sequence_number: Some(5),
        track_id: Some(1),
        decode_time: Some(9100),
        presentation_time: Some(9095),
        data_offset: Some(6256),
        size: Some(1200),
        flags: Some(0x0001_0000),
    }
}

#[test]
fn entries_resolve_against_earlier_fragment() {
    let mut data = ftyp();
    let moof_offset = data.len() as u64;
    data.extend_from_slice(&fragment());
    data.extend_from_slice(&bx(b"mdat", &[0u8; 16]));
    let table = tfra(1, &[(9100, moof_offset, 1, 1, 2), (9000, moof_offset, 1, 1, 9)]);
    let mfra_box = mfra(&[table]);
    let mfra_len = mfra_box.len() as u32;
    data.extend_from_slice(&mfra_box);

    let (events, _) = parse(data);

    let tfra_event = enters(&events, b"tfra")[0];
    let table = match tfra_event.payload.as_ref().and_then(|p| p.detail.as_ref()) {
        Some(Detail::TrackFragmentRandomAccess(t)) => t,
        other => panic!("expected tfra detail, got {:?}", other),
    };
    assert_eq!(table.entries[0].resolved, Some(expected_second_sample()));
    // Sample 9 does not exist in the run.
    assert_eq!(table.entries[1].resolved, None);

    let mfra_exit = exits(&events, b"mfra")[0];
    let summary = match mfra_exit.payload.as_ref().and_then(|p| p.detail.as_ref()) {
        Some(Detail::MovieFragmentRandomAccess(s)) => s,
        other => panic!("expected mfra summary, got {:?}", other),
    };
    assert_eq!(summary.total_entry_count, 2);
    assert_eq!(summary.mfra_size, Some(mfra_len));
    assert_eq!(summary.tracks.len(), 1);
    let track = &summary.tracks[0];
    assert_eq!(track.track_id, 1);
    assert_eq!(track.entry_count, 2);
    assert_eq!(track.earliest_time, Some(9000));
    assert_eq!(track.latest_time, Some(9100));
    assert_eq!(track.fragment_sequence_numbers, vec![5]);
}

#[test]
fn forward_entries_resolve_when_fragment_closes() {
    let mut data = ftyp();
    let before = data.len() as u64;
    let placeholder = mfra(&[tfra(1, &[(9100, 0, 1, 1, 2)])]);
    let moof_offset = before + placeholder.len() as u64;
    data.extend_from_slice(&mfra(&[tfra(1, &[(9100, moof_offset, 1, 1, 2)])]));
    data.extend_from_slice(&fragment());

    let (events, _) = parse(data);

    let tfra_event = enters(&events, b"tfra")[0];
    match tfra_event.payload.as_ref().and_then(|p| p.detail.as_ref()) {
        Some(Detail::TrackFragmentRandomAccess(t)) => assert_eq!(t.entries[0].resolved, None),
        other => panic!("expected tfra detail, got {:?}", other),
    }

    let moof_exit = exits(&events, b"moof")[0];
    match moof_exit.payload.as_ref().and_then(|p| p.detail.as_ref()) {
        Some(Detail::DeferredRandomAccess {
            moof_offset: at,
            sequence_number,
            entries,
        }) => {
            assert_eq!(*at, moof_offset);
            assert_eq!(*sequence_number, Some(5));
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].track_id, 1);
            assert_eq!(entries[0].entry.resolved, Some(expected_second_sample()));
        }
        other => panic!("expected deferred resolutions, got {:?}", other),
    }
}

#[test]
fn entries_for_unknown_fragments_stay_unresolved() {
    let mut data = ftyp();
    data.extend_from_slice(&fragment());
    data.extend_from_slice(&mfra(&[tfra(2, &[(0, 4096, 1, 1, 1)])]));

    let (events, store) = parse(data);
    let tfra_event = enters(&events, b"tfra")[0];
    let payload = tfra_event.payload.as_ref().unwrap();
    assert_eq!(
        payload.field("resolved_entries").map(|f| f.value.to_string()),
        Some("0".to_string())
    );
    assert!(store.is_empty());
}

#[test]
fn entries_resolve_into_runs_built_from_defaults() {
    let tfhd_defaults = u32s(&[50, 300, 0x0001_0000]);
    let mut trun_body = u32s(&[250]);
    trun_body.extend_from_slice(&200i32.to_be_bytes());
    let moof = container(
        b"moof",
        &[
            mfhd(9),
            container(
                b"traf",
                &[
                    tfhd(2, 0x8 | 0x10 | 0x20, &tfhd_defaults),
                    tfdt_v1(1000),
                    full(b"trun", 0, TrackRun::DATA_OFFSET_PRESENT, &trun_body),
                ],
            ),
        ],
    );

    let mut data = ftyp();
    let moof_offset = data.len() as u64;
    data.extend_from_slice(&moof);
    data.extend_from_slice(&mfra(&[tfra(2, &[(10950, moof_offset, 1, 1, 200)])]));

    let (events, store) = parse(data);
    assert!(store.is_empty(), "{:?}", store.issues());

    let tfra_event = enters(&events, b"tfra")[0];
    let resolved = match tfra_event.payload.as_ref().and_then(|p| p.detail.as_ref()) {
        Some(Detail::TrackFragmentRandomAccess(t)) => t.entries[0].resolved.clone(),
        other => panic!("expected tfra detail, got {:?}", other),
    };
    assert_eq!(
        resolved,
        Some(ResolvedSample {
            fragment_sequence_number: Some(9),
            track_id: Some(2),
            decode_time: Some(1000 + 199 * 50),
            presentation_time: Some(1000 + 199 * 50),
            data_offset: Some(moof_offset + 200 + 199 * 300),
            size: Some(300),
            flags: Some(0x0001_0000),
        })
    );
}
