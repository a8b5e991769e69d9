mod common;

use common::{bx, container, exits, ftyp, full, mfhd, parse_with, tfhd, u32s};
use isowalk::{
    BoxDescriptor, BoxHeader, ByteSource, Catalog, IssueStore, KnownBoxCatalog, MemorySource,
    ParseContext, ParseOptions, ParsePipeline, PayloadValidation, PipelineError,
};
use std::sync::Arc;

fn many_boxes(n: usize) -> Vec<u8> {
    let mut data = ftyp();
    for i in 0..n {
        data.extend_from_slice(&bx(b"free", &[i as u8]));
    }
    data
}

#[test]
fn stream_yields_balanced_events_in_order() {
    let mut data = ftyp();
    data.extend_from_slice(&container(
        b"moov",
        &[container(b"trak", &[container(b"mdia", &[bx(b"free", &[0])])])],
    ));
    let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new(data));

    let mut open = Vec::new();
    let mut count = 0;
    for item in ParsePipeline::tolerant().events(source, ParseContext::new()) {
        let event = item.expect("stream error");
        count += 1;
        if event.is_enter() {
            assert_eq!(event.depth, open.len());
            open.push(event.node_id());
        } else {
            assert_eq!(open.pop(), Some(event.node_id()));
            assert_eq!(event.depth, open.len());
        }
    }
    assert!(open.is_empty());
    assert_eq!(count, 10);
}

#[test]
fn cancel_stops_the_stream() {
    let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new(many_boxes(10_000)));
    let mut stream = ParsePipeline::tolerant()
        .with_buffer(1)
        .events(source, ParseContext::new());

    let first = stream.next().expect("first event").expect("no error");
    assert!(first.header.is(b"ftyp"));

    stream.cancel();
    match stream.next() {
        Some(Err(PipelineError::Cancelled)) => {}
        other => panic!("expected cancellation, got {:?}", other.map(|r| r.map(|e| e.header))),
    }
    assert!(stream.next().is_none());
}

#[test]
fn dropping_the_stream_cancels_the_walk() {
    let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new(many_boxes(10_000)));
    let mut stream = ParsePipeline::tolerant()
        .with_buffer(1)
        .events(source, ParseContext::new());
    let token = stream.cancellation_token();
    assert!(stream.next().is_some());
    drop(stream);
    assert!(token.is_cancelled());
}

#[test]
fn structural_error_ends_a_strict_stream() {
    let mut data = ftyp();
    data.extend_from_slice(&[0, 0, 0, 2, b'm', b'o', b'o', b'v']);
    let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new(data));

    let results: Vec<_> = ParsePipeline::strict()
        .events(source, ParseContext::new())
        .collect();

    // ftyp enter and exit, then the error.
    assert_eq!(results.len(), 3);
    assert!(results[..2].iter().all(|r| r.is_ok()));
    match &results[2] {
        Err(PipelineError::Structural { offset, .. }) => assert_eq!(*offset, 24),
        other => panic!("expected structural error, got {:?}", other.as_ref().map(|e| e.offset())),
    }
}

#[test]
fn context_options_override_pipeline_defaults() {
    let mut data = ftyp();
    data.extend_from_slice(&[0, 0, 0, 2, b'm', b'o', b'o', b'v']);
    let src = MemorySource::new(data);

    let tolerant = ParsePipeline::tolerant();
    assert!(tolerant.parse_all(&src, &ParseContext::new()).is_ok());

    let ctx = ParseContext::new().with_options(ParseOptions::strict());
    assert!(matches!(
        tolerant.parse_all(&src, &ctx),
        Err(PipelineError::Structural { .. })
    ));
}

#[test]
fn issue_store_is_filled_from_the_worker() {
    let mut data = ftyp();
    data.extend_from_slice(&[0, 0, 0, 2, b'm', b'o', b'o', b'v']);
    let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new(data));
    let store = Arc::new(IssueStore::new());

    let events: Vec<_> = ParsePipeline::tolerant()
        .events(source, ParseContext::new().with_issue_store(store.clone()))
        .collect::<Result<_, _>>()
        .expect("tolerant walk");

    assert_eq!(events.len(), 2);
    assert_eq!(store.len(), 1);
    assert_eq!(store.metrics().error, 1);
    assert_eq!(store.issues_in_range(24..32).len(), 1);
    assert_eq!(store.summary(), "1 issue(s): 1 error, 0 warning, 0 info");
}

fn fragment_with_bad_values() -> Vec<u8> {
    container(
        b"moof",
        &[
            mfhd(0),
            container(b"traf", &[tfhd(1, 0, &[]), full(b"trun", 0, 0, &u32s(&[0]))]),
        ],
    )
}

#[test]
fn fragment_rule_violations_are_promoted_under_the_tolerant_preset() {
    let (events, store) = parse_with(fragment_with_bad_values(), ParseOptions::tolerant());

    let mfhd_exit = exits(&events, b"mfhd")[0];
    assert!(mfhd_exit.validation_issues.iter().any(|v| v.rule_id == "VR-016"));
    assert!(mfhd_exit.has_issue("VR-016"));

    let trun_exit = exits(&events, b"trun")[0];
    assert!(trun_exit.has_issue("VR-017"));

    let codes: Vec<_> = store.issues().into_iter().map(|i| i.code).collect();
    assert_eq!(codes, vec!["VR-016", "VR-017"]);
    assert_eq!(store.issues_for_node(trun_exit.node_id()).len(), 1);
}

#[test]
fn strict_mode_annotates_without_promoting() {
    let (events, store) = parse_with(fragment_with_bad_values(), ParseOptions::strict());

    let mfhd_exit = exits(&events, b"mfhd")[0];
    assert!(mfhd_exit.validation_issues.iter().any(|v| v.rule_id == "VR-016"));
    assert!(mfhd_exit.issues.is_empty());
    assert!(store.is_empty());
}

/// `elst` with one edit at media time -5, which only full validation flags.
fn odd_edit_list() -> Vec<u8> {
    let mut body = u32s(&[1, 100]);
    body.extend_from_slice(&(-5i32).to_be_bytes());
    body.extend_from_slice(&[0, 1, 0, 0]);
    full(b"elst", 0, 0, &body)
}

#[test]
fn structure_only_skips_payload_rules() {
    let (events, store) = parse_with(odd_edit_list(), ParseOptions::tolerant());
    let elst_exit = exits(&events, b"elst")[0];
    assert!(elst_exit.validation_issues.is_empty());
    assert!(store.is_empty());

    let full_checks = ParseOptions {
        payload_validation: PayloadValidation::Full,
        ..ParseOptions::tolerant()
    };
    let (events, store) = parse_with(odd_edit_list(), full_checks);
    let elst_exit = exits(&events, b"elst")[0];
    let rules: Vec<_> = elst_exit.validation_issues.iter().map(|v| v.rule_id).collect();
    assert_eq!(rules, vec!["VR-014"]);
    // Edit list findings are annotations, never issues.
    assert!(store.is_empty());
}

#[derive(Default)]
struct VendorCatalog {
    builtin: KnownBoxCatalog,
}

impl Catalog for VendorCatalog {
    fn descriptor(&self, header: &BoxHeader) -> Option<BoxDescriptor> {
        if header.is(b"vndr") {
            return Some(BoxDescriptor {
                name: "Vendor Box".to_string(),
                is_container: false,
                is_full_box: false,
            });
        }
        self.builtin.descriptor(header)
    }
}

#[test]
fn validator_uses_the_pipeline_catalog() {
    let data = bx(b"vndr", &[1, 2]);
    let src = MemorySource::new(data);

    let default_events = ParsePipeline::tolerant()
        .parse_all(&src, &ParseContext::new())
        .unwrap();
    assert_eq!(default_events[1].validation_issues[0].rule_id, "VR-006");

    let events = ParsePipeline::tolerant()
        .with_catalog(Arc::new(VendorCatalog::default()))
        .parse_all(&src, &ParseContext::new())
        .unwrap();
    let exit = &events[1];
    assert_eq!(exit.descriptor.as_ref().map(|d| d.name.as_str()), Some("Vendor Box"));
    assert!(exit.validation_issues.is_empty());
}

#[test]
fn traf_exit_carries_the_synthesized_summary() {
    let (events, _) = parse_with(fragment_with_bad_values(), ParseOptions::tolerant());
    let traf_exit = exits(&events, b"traf")[0];
    let summary = traf_exit
        .payload
        .as_ref()
        .and_then(|p| p.track_fragment())
        .expect("summary");
    assert_eq!(summary.total_sample_count, Some(0));
    assert_eq!(
        traf_exit.payload.as_ref().unwrap().field("run_count").map(|f| f.value.to_string()),
        Some("1".to_string())
    );
}
