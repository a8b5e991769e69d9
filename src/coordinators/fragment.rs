use super::Coordinator;
use crate::boxes::BoxHeader;
use crate::payload::{
    Detail, Field, ParsedPayload, TrackExtendsDefaults, TrackFragmentHeader,
    TrackFragmentSummary, TrackRun,
};
use std::collections::HashMap;
use tracing::trace;

/// Fragment state a `trun` decoder resolves samples against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentEnv {
    pub track_id: Option<u32>,
    pub sample_description_index: u32,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub base_data_offset: Option<u64>,
    /// Where the next run's samples start when it carries no data offset.
    pub data_cursor: Option<u64>,
    pub next_decode_time: Option<u64>,
    /// One-based.
    pub next_sample_number: u64,
    /// Zero-based index of the next run in the fragment.
    pub run_index: u32,
}

impl Default for FragmentEnv {
    fn default() -> Self {
        Self {
            track_id: None,
            sample_description_index: 1,
            default_sample_duration: None,
            default_sample_size: None,
            default_sample_flags: None,
            base_data_offset: None,
            data_cursor: None,
            next_decode_time: None,
            next_sample_number: 1,
            run_index: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ResolvedDefaults {
    sample_description_index: Option<u32>,
    duration: Option<u32>,
    size: Option<u32>,
    flags: Option<u32>,
}

#[derive(Debug)]
struct MoofState {
    start: u64,
    /// End of the previous `traf`'s data in this `moof`.
    previous_data_end: Option<u64>,
}

#[derive(Debug)]
struct TrafState {
    moof_start: Option<u64>,
    env: FragmentEnv,
    duration_is_empty: bool,
    base_decode_time: Option<u64>,
    runs: Vec<TrackRun>,
    total_sample_count: Option<u64>,
    total_sample_size: Option<u64>,
    total_sample_duration: Option<u64>,
    first_decode_time: Option<u64>,
    /// End decode time of the latest run that had one.
    last_decode_time: Option<u64>,
    earliest_presentation_time: Option<i64>,
    latest_presentation_time: Option<i64>,
}

impl TrafState {
    fn new(moof_start: Option<u64>, data_start: Option<u64>) -> Self {
        Self {
            moof_start,
            env: FragmentEnv {
                base_data_offset: data_start,
                data_cursor: data_start,
                ..FragmentEnv::default()
            },
            duration_is_empty: false,
            base_decode_time: None,
            runs: Vec::new(),
            total_sample_count: Some(0),
            total_sample_size: Some(0),
            total_sample_duration: Some(0),
            first_decode_time: None,
            last_decode_time: None,
            earliest_presentation_time: None,
            latest_presentation_time: None,
        }
    }

    fn apply_run(&mut self, run: &TrackRun) {
        self.total_sample_count = self
            .total_sample_count
            .and_then(|t| t.checked_add(run.sample_count as u64));
        self.total_sample_size = self
            .total_sample_size
            .zip(run.total_sample_size)
            .and_then(|(t, n)| t.checked_add(n));
        self.total_sample_duration = self
            .total_sample_duration
            .zip(run.total_sample_duration)
            .and_then(|(t, n)| t.checked_add(n));

        if self.first_decode_time.is_none() {
            self.first_decode_time = run.start_decode_time.or(self.base_decode_time);
        }
        if let Some(end) = run.end_decode_time {
            self.last_decode_time = Some(end);
        }
        if let Some(e) = run.earliest_presentation_time {
            self.earliest_presentation_time =
                Some(self.earliest_presentation_time.map_or(e, |cur| cur.min(e)));
        }
        if let Some(l) = run.latest_presentation_time {
            self.latest_presentation_time =
                Some(self.latest_presentation_time.map_or(l, |cur| cur.max(l)));
        }

        self.env.data_cursor = run.end_data_offset;
        self.env.next_decode_time = run.end_decode_time;
        self.env.next_sample_number = self
            .env
            .next_sample_number
            .saturating_add(run.sample_count as u64);
        self.env.run_index = self.env.run_index.saturating_add(1);
        self.runs.push(run.clone());
    }

    fn into_summary(self) -> TrackFragmentSummary {
        TrackFragmentSummary {
            track_id: self.env.track_id,
            moof_start: self.moof_start,
            base_data_offset: self.env.base_data_offset,
            base_decode_time: self.base_decode_time,
            sample_description_index: self.env.sample_description_index,
            default_sample_duration: self.env.default_sample_duration,
            default_sample_size: self.env.default_sample_size,
            default_sample_flags: self.env.default_sample_flags,
            duration_is_empty: self.duration_is_empty,
            run_count: self.runs.len(),
            total_sample_count: self.total_sample_count,
            total_sample_size: self.total_sample_size,
            total_sample_duration: self.total_sample_duration,
            first_decode_time: self.first_decode_time.or(self.base_decode_time),
            last_decode_time: self
                .last_decode_time
                .or(self.env.next_decode_time)
                .or(self.base_decode_time),
            earliest_presentation_time: self.earliest_presentation_time,
            latest_presentation_time: self.latest_presentation_time,
            runs: self.runs,
        }
    }
}

/// Resolves track fragment defaults, data offsets and decode times across
/// `trex`, `tfhd`, `tfdt` and `trun`, and summarizes each `traf` on exit.
#[derive(Debug, Default)]
pub struct FragmentCoordinator {
    trex: HashMap<u32, TrackExtendsDefaults>,
    previous: HashMap<u32, ResolvedDefaults>,
    moofs: Vec<MoofState>,
    trafs: Vec<TrafState>,
}

impl FragmentCoordinator {
    pub fn track_extends(&self, track_id: u32) -> Option<&TrackExtendsDefaults> {
        self.trex.get(&track_id)
    }

    fn apply_tfhd(&mut self, tfhd: &TrackFragmentHeader) {
        let trex = self.trex.get(&tfhd.track_id).copied();
        let prior = self.previous.get(&tfhd.track_id).copied().unwrap_or_default();
        let moof_start = self.moofs.last().map(|m| m.start);
        let previous_data_end = self.moofs.last().and_then(|m| m.previous_data_end);
        let Some(traf) = self.trafs.last_mut() else {
            return;
        };

        let sample_description_index = tfhd
            .sample_description_index
            .or(trex.map(|t| t.default_sample_description_index))
            .or(prior.sample_description_index)
            .unwrap_or(1);
        let duration = tfhd
            .default_sample_duration
            .or(trex.map(|t| t.default_sample_duration))
            .or(prior.duration);
        let size = tfhd
            .default_sample_size
            .or(trex.map(|t| t.default_sample_size))
            .or(prior.size);
        let flags = tfhd
            .default_sample_flags
            .or(trex.map(|t| t.default_sample_flags))
            .or(prior.flags);

        let base = match tfhd.base_data_offset {
            Some(b) => Some(b),
            None if tfhd.default_base_is_moof() => moof_start,
            None => previous_data_end.or(moof_start),
        };

        traf.env = FragmentEnv {
            track_id: Some(tfhd.track_id),
            sample_description_index,
            default_sample_duration: duration,
            default_sample_size: size,
            default_sample_flags: flags,
            base_data_offset: base,
            data_cursor: base,
            ..traf.env.clone()
        };
        traf.duration_is_empty = tfhd.duration_is_empty();
        trace!(track_id = tfhd.track_id, ?base, "track fragment defaults resolved");
    }
}

fn summary_fields(s: &TrackFragmentSummary) -> Vec<Field> {
    let mut fields = Vec::new();
    if let Some(id) = s.track_id {
        fields.push(Field::new("track_id", id, None));
    }
    fields.push(Field::new("run_count", s.run_count as u64, None));
    let totals = [
        ("total_sample_count", s.total_sample_count),
        ("total_sample_size", s.total_sample_size),
        ("total_sample_duration", s.total_sample_duration),
        ("base_data_offset", s.base_data_offset),
        ("first_decode_time", s.first_decode_time),
        ("last_decode_time", s.last_decode_time),
    ];
    for (name, v) in totals {
        if let Some(v) = v {
            fields.push(Field::new(name, v, None));
        }
    }
    fields
}

impl Coordinator for FragmentCoordinator {
    type Env<'a> = FragmentEnv;

    fn will_start_box(&mut self, header: &BoxHeader, _depth: usize) {
        if header.is(b"moof") {
            self.moofs.push(MoofState {
                start: header.start(),
                previous_data_end: None,
            });
        } else if header.is(b"traf") {
            let moof = self.moofs.last();
            let moof_start = moof.map(|m| m.start);
            let data_start = moof.and_then(|m| m.previous_data_end).or(moof_start);
            self.trafs.push(TrafState::new(moof_start, data_start));
        }
    }

    fn did_parse_payload(&mut self, _header: &BoxHeader, payload: &ParsedPayload) {
        match &payload.detail {
            Some(Detail::TrackExtends(trex)) => {
                self.trex.insert(trex.track_id, *trex);
            }
            Some(Detail::TrackFragmentHeader(tfhd)) => self.apply_tfhd(tfhd),
            Some(Detail::TrackFragmentDecodeTime {
                base_media_decode_time,
            }) => {
                if let Some(traf) = self.trafs.last_mut() {
                    traf.base_decode_time = Some(*base_media_decode_time);
                    traf.env.next_decode_time = Some(*base_media_decode_time);
                    traf.first_decode_time.get_or_insert(*base_media_decode_time);
                }
            }
            Some(Detail::TrackRun(run)) => {
                if let Some(traf) = self.trafs.last_mut() {
                    traf.apply_run(run);
                }
            }
            _ => {}
        }
    }

    fn did_finish_box(&mut self, header: &BoxHeader) -> Option<ParsedPayload> {
        if header.is(b"moof") {
            self.moofs.pop();
            return None;
        }
        if !header.is(b"traf") {
            return None;
        }
        let traf = self.trafs.pop()?;
        if let Some(moof) = self.moofs.last_mut() {
            moof.previous_data_end = traf.env.data_cursor;
        }
        if let Some(id) = traf.env.track_id {
            self.previous.insert(
                id,
                ResolvedDefaults {
                    sample_description_index: Some(traf.env.sample_description_index),
                    duration: traf.env.default_sample_duration,
                    size: traf.env.default_sample_size,
                    flags: traf.env.default_sample_flags,
                },
            );
        }
        let summary = traf.into_summary();
        Some(ParsedPayload {
            fields: summary_fields(&summary),
            detail: Some(Detail::TrackFragment(summary)),
        })
    }

    fn environment<'a>(&'a self, header: &BoxHeader) -> Option<FragmentEnv> {
        if !header.is(b"trun") {
            return None;
        }
        self.trafs.last().map(|t| t.env.clone())
    }
}
