use super::Coordinator;
use crate::boxes::BoxHeader;
use crate::payload::{
    DeferredResolution, Detail, Field, ParsedPayload, RandomAccessEntry, RandomAccessSummary,
    ResolvedSample, TrackFragmentRandomAccess, TrackFragmentSummary, TrackRandomAccessSummary,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A `moof` that has been fully walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRecord {
    pub start: u64,
    pub sequence_number: Option<u32>,
    /// In file order; a `tfra` traf number `n` refers to index `n - 1`.
    pub track_fragments: Vec<TrackFragmentSummary>,
}

impl FragmentRecord {
    /// Resolve a random-access entry into this fragment.
    pub fn resolve(&self, entry: &RandomAccessEntry) -> Option<ResolvedSample> {
        let traf = self
            .track_fragments
            .get((entry.traf_number as usize).checked_sub(1)?)?;
        let run = traf
            .runs
            .iter()
            .find(|r| r.run_index as u64 + 1 == entry.trun_number as u64)?;
        let sample = run.sample(entry.sample_number)?;
        Some(ResolvedSample {
            fragment_sequence_number: self.sequence_number,
            track_id: traf.track_id,
            decode_time: sample.decode_time,
            presentation_time: sample.presentation_time,
            data_offset: sample.data_offset,
            size: sample.size,
            flags: sample.flags,
        })
    }
}

/// Completed fragments, keyed by `moof` start offset.
#[derive(Debug, Clone, Copy)]
pub struct RandomAccessEnv<'a> {
    pub fragments: &'a BTreeMap<u64, FragmentRecord>,
}

#[derive(Debug, Default)]
struct MfraContext {
    tables: Vec<TrackFragmentRandomAccess>,
    mfra_size: Option<u32>,
}

/// Indexes walked fragments and resolves `tfra` entries against them.
///
/// Entries that point at a `moof` not yet walked are kept and resolved when
/// that `moof` closes; the `moof` exit then carries the late resolutions.
#[derive(Debug, Default)]
pub struct RandomAccessCoordinator {
    moofs: Vec<FragmentRecord>,
    fragments: BTreeMap<u64, FragmentRecord>,
    mfras: Vec<MfraContext>,
    pending: BTreeMap<u64, Vec<(u32, RandomAccessEntry)>>,
}

impl RandomAccessCoordinator {
    pub fn fragment(&self, moof_offset: u64) -> Option<&FragmentRecord> {
        self.fragments.get(&moof_offset)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    fn summarize(&self, ctx: MfraContext) -> RandomAccessSummary {
        let mut by_track: BTreeMap<u32, TrackRandomAccessSummary> = BTreeMap::new();
        let mut sequences: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
        let mut total = 0u64;

        for table in &ctx.tables {
            let track = by_track
                .entry(table.track_id)
                .or_insert_with(|| TrackRandomAccessSummary {
                    track_id: table.track_id,
                    entry_count: 0,
                    earliest_time: None,
                    latest_time: None,
                    fragment_sequence_numbers: Vec::new(),
                });
            for entry in &table.entries {
                total += 1;
                track.entry_count += 1;
                let time = entry.time;
                track.earliest_time = Some(track.earliest_time.map_or(time, |t| t.min(time)));
                track.latest_time = Some(track.latest_time.map_or(time, |t| t.max(time)));
                let seq = entry
                    .resolved
                    .as_ref()
                    .and_then(|r| r.fragment_sequence_number)
                    .or_else(|| {
                        self.fragments
                            .get(&entry.moof_offset)
                            .and_then(|f| f.sequence_number)
                    });
                if let Some(seq) = seq {
                    sequences.entry(table.track_id).or_default().insert(seq);
                }
            }
        }
        for (id, seqs) in sequences {
            if let Some(track) = by_track.get_mut(&id) {
                track.fragment_sequence_numbers = seqs.into_iter().collect();
            }
        }

        RandomAccessSummary {
            tracks: by_track.into_values().collect(),
            total_entry_count: total,
            mfra_size: ctx.mfra_size,
        }
    }
}

impl Coordinator for RandomAccessCoordinator {
    type Env<'a> = RandomAccessEnv<'a>;

    fn will_start_box(&mut self, header: &BoxHeader, _depth: usize) {
        if header.is(b"moof") {
            self.moofs.push(FragmentRecord {
                start: header.start(),
                sequence_number: None,
                track_fragments: Vec::new(),
            });
        } else if header.is(b"mfra") {
            self.mfras.push(MfraContext::default());
        }
    }

    fn did_parse_payload(&mut self, _header: &BoxHeader, payload: &ParsedPayload) {
        match &payload.detail {
            Some(Detail::MovieFragmentHeader { sequence_number }) => {
                if let Some(moof) = self.moofs.last_mut() {
                    moof.sequence_number = Some(*sequence_number);
                }
            }
            Some(Detail::TrackFragment(summary)) => {
                if let Some(moof) = self.moofs.last_mut() {
                    moof.track_fragments.push(summary.clone());
                }
            }
            Some(Detail::TrackFragmentRandomAccess(table)) => {
                for entry in &table.entries {
                    let walked = self.fragments.contains_key(&entry.moof_offset);
                    if entry.resolved.is_none() && !walked {
                        self.pending
                            .entry(entry.moof_offset)
                            .or_default()
                            .push((table.track_id, entry.clone()));
                    }
                }
                if let Some(mfra) = self.mfras.last_mut() {
                    mfra.tables.push(table.clone());
                }
            }
            Some(Detail::MovieFragmentRandomAccessOffset { mfra_size }) => {
                if let Some(mfra) = self.mfras.last_mut() {
                    mfra.mfra_size = Some(*mfra_size);
                }
            }
            _ => {}
        }
    }

    fn did_finish_box(&mut self, header: &BoxHeader) -> Option<ParsedPayload> {
        if header.is(b"moof") {
            let record = self.moofs.pop()?;
            let start = record.start;
            let late = self.pending.remove(&start).map(|waiting| {
                waiting
                    .into_iter()
                    .map(|(track_id, mut entry)| {
                        entry.resolved = record.resolve(&entry);
                        DeferredResolution { track_id, entry }
                    })
                    .collect::<Vec<_>>()
            });
            let sequence_number = record.sequence_number;
            self.fragments.insert(start, record);

            let entries = late?;
            debug!(moof = start, count = entries.len(), "resolved deferred random-access entries");
            let resolved = entries.iter().filter(|e| e.entry.resolved.is_some()).count();
            return Some(ParsedPayload {
                fields: vec![
                    Field::new("deferred_entries", entries.len() as u64, None),
                    Field::new("resolved_entries", resolved as u64, None),
                ],
                detail: Some(Detail::DeferredRandomAccess {
                    moof_offset: start,
                    sequence_number,
                    entries,
                }),
            });
        }
        if header.is(b"mfra") {
            let ctx = self.mfras.pop()?;
            let summary = self.summarize(ctx);
            let mut fields = vec![
                Field::new("track_count", summary.tracks.len() as u64, None),
                Field::new("total_entry_count", summary.total_entry_count, None),
            ];
            if let Some(size) = summary.mfra_size {
                fields.push(Field::new("mfra_size", size, None));
            }
            return Some(ParsedPayload {
                fields,
                detail: Some(Detail::MovieFragmentRandomAccess(summary)),
            });
        }
        None
    }

    fn environment<'a>(&'a self, header: &BoxHeader) -> Option<RandomAccessEnv<'a>> {
        if !header.is(b"tfra") {
            return None;
        }
        Some(RandomAccessEnv {
            fragments: &self.fragments,
        })
    }
}
