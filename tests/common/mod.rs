#![allow(dead_code)]

use isowalk::{IssueStore, MemorySource, ParseContext, ParseEvent, ParseOptions, ParsePipeline};
use std::sync::Arc;

/// Plain box: 32-bit size, type, payload.
pub fn bx(typ: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
    v.extend_from_slice(typ);
    v.extend_from_slice(payload);
    v
}

/// Full box: version and 24-bit flags in front of `body`.
pub fn full(typ: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut payload = vec![version];
    payload.extend_from_slice(&flags.to_be_bytes()[1..]);
    payload.extend_from_slice(body);
    bx(typ, &payload)
}

pub fn container(typ: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    bx(typ, &children.concat())
}

pub fn ftyp() -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(b"isom");
    p.extend_from_slice(&512u32.to_be_bytes());
    p.extend_from_slice(b"isom");
    p.extend_from_slice(b"iso6");
    bx(b"ftyp", &p)
}

pub fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn trex(track_id: u32, sdi: u32, duration: u32, size: u32, flags: u32) -> Vec<u8> {
    full(b"trex", 0, 0, &u32s(&[track_id, sdi, duration, size, flags]))
}

pub fn mfhd(sequence_number: u32) -> Vec<u8> {
    full(b"mfhd", 0, 0, &u32s(&[sequence_number]))
}

pub fn tfdt_v1(base: u64) -> Vec<u8> {
    full(b"tfdt", 1, 0, &base.to_be_bytes())
}

/// `tfhd` with only a track id and the given flags; optional fields follow
/// in flag order and must be supplied in `extra`.
pub fn tfhd(track_id: u32, flags: u32, extra: &[u8]) -> Vec<u8> {
    let mut body = track_id.to_be_bytes().to_vec();
    body.extend_from_slice(extra);
    full(b"tfhd", 0, flags, &body)
}

pub fn parse_with(bytes: Vec<u8>, options: ParseOptions) -> (Vec<ParseEvent>, Arc<IssueStore>) {
    let store = Arc::new(IssueStore::new());
    let ctx = ParseContext::new()
        .with_source_descriptor("test")
        .with_issue_store(store.clone());
    let events = ParsePipeline::new(options)
        .parse_all(&MemorySource::new(bytes), &ctx)
        .expect("parse failed");
    (events, store)
}

pub fn parse(bytes: Vec<u8>) -> (Vec<ParseEvent>, Arc<IssueStore>) {
    parse_with(bytes, ParseOptions::tolerant())
}

pub fn enters<'a>(events: &'a [ParseEvent], typ: &[u8; 4]) -> Vec<&'a ParseEvent> {
    events
        .iter()
        .filter(|e| e.is_enter() && e.header.is(typ))
        .collect()
}

pub fn exits<'a>(events: &'a [ParseEvent], typ: &[u8; 4]) -> Vec<&'a ParseEvent> {
    events
        .iter()
        .filter(|e| e.is_exit() && e.header.is(typ))
        .collect()
}

pub fn types(events: &[ParseEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.is_enter())
        .map(|e| e.header.typ.to_string())
        .collect()
}

pub fn mvhd(timescale: u32) -> Vec<u8> {
    let mut body = u32s(&[0, 0, timescale, 0, 0x0001_0000]);
    body.extend_from_slice(&[0x01, 0x00]);
    body.extend_from_slice(&[0u8; 10 + 36 + 24]);
    body.extend_from_slice(&u32s(&[2]));
    full(b"mvhd", 0, 0, &body)
}

pub fn tkhd(track_id: u32) -> Vec<u8> {
    let mut body = u32s(&[0, 0, track_id, 0, 0]);
    body.extend_from_slice(&[0u8; 8 + 2 + 2 + 2 + 2 + 36]);
    body.extend_from_slice(&u32s(&[640 << 16, 480 << 16]));
    full(b"tkhd", 0, 0x3, &body)
}

pub fn mdhd(timescale: u32) -> Vec<u8> {
    let mut body = u32s(&[0, 0, timescale, 0]);
    // "und", pre_defined
    body.extend_from_slice(&[0x55, 0xC4, 0, 0]);
    full(b"mdhd", 0, 0, &body)
}

pub fn hdlr(handler: &[u8; 4], name: &str) -> Vec<u8> {
    let mut body = u32s(&[0]);
    body.extend_from_slice(handler);
    body.extend_from_slice(&[0u8; 12]);
    body.extend_from_slice(name.as_bytes());
    body.push(0);
    full(b"hdlr", 0, 0, &body)
}
