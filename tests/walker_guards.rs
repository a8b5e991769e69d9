mod common;

use common::{bx, container, full, ftyp, parse, parse_with, types};
use isowalk::known_boxes::KnownBoxCatalog;
use isowalk::{
    CancellationToken, MemorySource, ParseContext, ParseOptions, ParsePipeline, PipelineError,
    WalkEvent, Walker,
};
use std::sync::Arc;

fn count(store: &isowalk::IssueStore, code: &str) -> usize {
    store.issues().iter().filter(|i| i.code == code).count()
}

#[test]
fn zero_length_run_halts_parent_once() {
    let empties: Vec<Vec<u8>> = (0..5).map(|_| bx(b"free", &[])).collect();
    let mut data = ftyp();
    data.extend_from_slice(&container(b"moov", &empties));
    data.extend_from_slice(&bx(b"free", &[0u8; 4]));

    let (events, store) = parse(data);

    assert_eq!(count(&store, "guard.zero_size_loop"), 1);
    // Two zero-length children are tolerated, the third trips the guard.
    assert_eq!(types(&events), vec!["ftyp", "moov", "free", "free", "free"]);
    let moov_exit = events
        .iter()
        .find(|e| e.is_exit() && e.header.is(b"moov"))
        .expect("moov exit");
    assert!(moov_exit.has_issue("guard.zero_size_loop"));
    // The sibling after moov is still walked.
    assert_eq!(events.last().unwrap().header.start(), moov_exit.header.end());
}

#[test]
fn nesting_beyond_max_depth_is_cut() {
    let stbl = container(b"stbl", &[bx(b"stsd", &[0u8; 8])]);
    let minf = container(b"minf", &[stbl]);
    let mdia = container(b"mdia", &[minf]);
    let trak = container(b"trak", &[mdia]);
    let moov = container(b"moov", &[trak]);

    let options = ParseOptions {
        max_traversal_depth: 3,
        ..ParseOptions::tolerant()
    };
    let (events, store) = parse_with(moov, options);

    assert_eq!(types(&events), vec!["moov", "trak", "mdia", "minf"]);
    assert_eq!(count(&store, "guard.recursion_depth_exceeded"), 1);
    assert_eq!(store.metrics().deepest_depth, Some(3));
}

#[test]
fn trailing_garbage_is_reported_under_tolerant() {
    let mut data = ftyp();
    data.extend_from_slice(&[0, 0, 0, 3, b'f', b'r', b'e', b'e', 0xFF]);

    let (events, store) = parse(data);

    assert_eq!(types(&events), vec!["ftyp"]);
    assert_eq!(count(&store, "header.invalid_size"), 1);
    let issue = &store.issues()[0];
    assert!(issue.affected_node_ids.is_empty());
}

#[test]
fn trailing_garbage_aborts_under_strict() {
    let mut data = ftyp();
    let bad = data.len() as u64;
    data.extend_from_slice(&[0, 0, 0, 3, b'f', b'r', b'e', b'e', 0xFF]);

    let result = ParsePipeline::strict().parse_all(&MemorySource::new(data), &ParseContext::new());
    match result {
        Err(PipelineError::Structural { offset, source }) => {
            assert_eq!(offset, bad);
            assert_eq!(source.code(), "header.invalid_size");
        }
        other => panic!("expected structural error, got {:?}", other.map(|e| e.len())),
    }
}

#[test]
fn overrunning_child_abandons_only_its_container() {
    let mut moov_payload = bx(b"mvhd", &[0u8; 4]);
    // Declares 20 bytes but the container ends after 12.
    moov_payload.extend_from_slice(&20u32.to_be_bytes());
    moov_payload.extend_from_slice(b"trak");
    moov_payload.extend_from_slice(&[0u8; 4]);
    let mut data = bx(b"moov", &moov_payload);
    data.extend_from_slice(&bx(b"free", &[1, 2, 3]));

    let (events, store) = parse(data);

    assert_eq!(types(&events), vec!["moov", "mvhd", "free"]);
    let issues = store.issues_for_node(0);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, "header.exceeds_parent");
}

#[test]
fn well_formed_file_sizes_cover_source_under_strict() {
    let mut data = ftyp();
    data.extend_from_slice(&container(
        b"moov",
        &[full(b"mvhd", 0, 0, &[0u8; 96]), container(b"udta", &[bx(b"free", &[])])],
    ));
    data.extend_from_slice(&bx(b"mdat", &[9u8; 33]));
    let len = data.len() as u64;

    let (events, store) = parse_with(data, ParseOptions::strict());

    let top: u64 = events
        .iter()
        .filter(|e| e.is_enter() && e.depth == 0)
        .map(|e| e.header.total_size)
        .sum();
    assert_eq!(top, len);
    assert!(store.is_empty(), "unexpected issues: {:?}", store.issues());
    for e in &events {
        assert!(matches!(e.header.header_size, 8 | 16 | 24 | 32));
        assert_eq!(e.header.payload.start, e.header.start() + e.header.header_size);
    }
}

#[test]
fn top_level_zero_size_runs_to_end_of_file() {
    let mut data = ftyp();
    let at = data.len() as u64;
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(b"mdat");
    data.extend_from_slice(&[0u8; 50]);
    let len = data.len() as u64;

    let (events, _) = parse_with(data, ParseOptions::strict());
    let mdat = events.iter().find(|e| e.header.is(b"mdat")).unwrap();
    assert_eq!(mdat.header.start(), at);
    assert_eq!(mdat.header.total_size, len - at);
}

#[test]
fn meta_children_start_after_version_and_flags() {
    let hdlr = full(b"hdlr", 0, 0, &[0u8; 21]);
    let meta = full(b"meta", 0, 0, &hdlr);
    let src = MemorySource::new(meta);
    let walker = Walker::new(ParseOptions::strict(), Arc::new(KnownBoxCatalog::new()));

    let mut entered = Vec::new();
    walker
        .walk(&src, &CancellationToken::new(), |e| {
            if let WalkEvent::Enter { header, depth } = e {
                entered.push((header.typ.to_string(), header.start(), depth));
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(
        entered,
        vec![("meta".to_string(), 0, 0), ("hdlr".to_string(), 12, 1)]
    );
}

#[test]
fn cancelled_token_stops_walk_before_first_event() {
    let walker = Walker::new(ParseOptions::tolerant(), Arc::new(KnownBoxCatalog::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut seen = 0;
    let result = walker.walk(&MemorySource::new(ftyp()), &cancel, |_| {
        seen += 1;
        Ok(())
    });
    assert!(matches!(result, Err(isowalk::WalkError::Cancelled)));
    assert_eq!(seen, 0);
}

/// A child whose size is smaller than its own header.
fn undersized_child() -> Vec<u8> {
    vec![0, 0, 0, 2, b'f', b'r', b'e', b'e']
}

#[test]
fn corruption_event_cap_limits_reported_issues() {
    let data: Vec<u8> = (0..5)
        .flat_map(|_| container(b"moov", &[undersized_child()]))
        .collect();
    let options = ParseOptions {
        max_corruption_events: 3,
        ..ParseOptions::tolerant()
    };
    let (events, store) = parse_with(data, options);

    // Every container is still walked; only the reporting is capped.
    assert_eq!(types(&events), vec!["moov"; 5]);
    assert_eq!(store.len(), 3);
    assert_eq!(count(&store, "header.invalid_size"), 3);
    let flagged = events
        .iter()
        .filter(|e| e.is_exit() && e.has_issue("header.invalid_size"))
        .count();
    assert_eq!(flagged, 3);
}

#[test]
fn issue_budget_truncates_the_container() {
    let mut data = container(b"moov", &[undersized_child(), bx(b"free", &[0])]);
    data.extend_from_slice(&bx(b"free", &[1]));
    let options = ParseOptions {
        max_issues_per_frame: 1,
        ..ParseOptions::tolerant()
    };
    let (events, store) = parse_with(data, options);

    let codes: Vec<_> = store.issues().into_iter().map(|i| i.code).collect();
    assert_eq!(codes, vec!["header.invalid_size", "guard.issue_budget_exceeded"]);
    let moov_exit = events
        .iter()
        .find(|e| e.is_exit() && e.header.is(b"moov"))
        .expect("moov exit");
    assert!(moov_exit.has_issue("guard.issue_budget_exceeded"));
    // The sibling after the truncated container is still walked.
    assert_eq!(types(&events), vec!["moov", "free"]);
}
