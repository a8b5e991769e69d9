//! Decoded box payloads.
//!
//! A [`ParsedPayload`] is an ordered list of byte-ranged [`Field`]s plus an
//! optional typed [`Detail`] for boxes the registry understands.

use crate::boxes::FourCC;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Code(FourCC),
    Bytes(#[serde(serialize_with = "hex_bytes")] Vec<u8>),
}

fn hex_bytes<S: serde::Serializer>(b: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(b))
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Signed(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{:?}", v),
            FieldValue::Code(v) => write!(f, "{}", v),
            FieldValue::Bytes(v) => write!(f, "{}", hex::encode(v)),
        }
    }
}

macro_rules! field_value_from {
    ($($t:ty => $variant:ident as $as:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::$variant(v as $as)
            }
        })*
    };
}

field_value_from!(
    u8 => Unsigned as u64, u16 => Unsigned as u64, u32 => Unsigned as u64, u64 => Unsigned as u64,
    i16 => Signed as i64, i32 => Signed as i64, i64 => Signed as i64, f64 => Float as f64
);

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<FourCC> for FieldValue {
    fn from(v: FourCC) -> Self {
        FieldValue::Code(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
    pub range: Option<Range<u64>>,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<FieldValue>,
        range: Option<Range<u64>>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParsedPayload {
    pub fields: Vec<Field>,
    pub detail: Option<Detail>,
}

impl ParsedPayload {
    pub fn new(fields: Vec<Field>, detail: Detail) -> Self {
        Self {
            fields,
            detail: Some(detail),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn track_run(&self) -> Option<&TrackRun> {
        match &self.detail {
            Some(Detail::TrackRun(r)) => Some(r),
            _ => None,
        }
    }

    pub fn track_fragment(&self) -> Option<&TrackFragmentSummary> {
        match &self.detail {
            Some(Detail::TrackFragment(t)) => Some(t),
            _ => None,
        }
    }
}

/// Box-specific decoded content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detail {
    FileType(FileType),
    MediaData { data_range: Range<u64> },
    Padding { length: u64 },
    MovieHeader(MovieHeader),
    TrackHeader(TrackHeader),
    MediaHeader(MediaHeader),
    HandlerReference(HandlerReference),
    EditList(EditList),
    DecodingTimeToSample(TimeToSample),
    CompositionOffsets(CompositionOffsets),
    SampleToChunk(SampleToChunk),
    SampleSize(SampleSize),
    ChunkOffsets(ChunkOffsets),
    SyncSamples(SyncSamples),
    MovieExtendsHeader { fragment_duration: u64 },
    TrackExtends(TrackExtendsDefaults),
    MovieFragmentHeader { sequence_number: u32 },
    TrackFragmentHeader(TrackFragmentHeader),
    TrackFragmentDecodeTime { base_media_decode_time: u64 },
    TrackRun(TrackRun),
    TrackFragment(TrackFragmentSummary),
    TrackFragmentRandomAccess(TrackFragmentRandomAccess),
    MovieFragmentRandomAccessOffset { mfra_size: u32 },
    MovieFragmentRandomAccess(RandomAccessSummary),
    /// Random-access entries that pointed at this `moof` before it was walked.
    DeferredRandomAccess {
        moof_offset: u64,
        sequence_number: Option<u32>,
        entries: Vec<DeferredResolution>,
    },
    Metadata { version: u8, flags: u32 },
    MetadataKeys(MetadataKeys),
    MetadataItems(MetadataItems),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileType {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieHeader {
    pub version: u8,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub rate: f64,
    pub volume: f64,
    pub next_track_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackHeader {
    pub version: u8,
    pub flags: u32,
    pub track_id: u32,
    pub duration: u64,
    pub width: f64,
    pub height: f64,
}

impl TrackHeader {
    pub fn is_enabled(&self) -> bool {
        self.flags & 0x1 != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaHeader {
    pub version: u8,
    pub timescale: u32,
    pub duration: u64,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerReference {
    pub handler_type: FourCC,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditList {
    pub version: u8,
    pub movie_timescale: Option<u32>,
    pub media_timescale: Option<u32>,
    pub entries: Vec<EditListEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditListEntry {
    pub segment_duration: u64,
    /// -1 marks an empty edit.
    pub media_time: i64,
    pub media_rate_integer: i16,
    pub media_rate_fraction: u16,
    /// Start on the movie timeline, in movie timescale units.
    pub presentation_start: Option<u64>,
    pub segment_duration_seconds: Option<f64>,
    pub media_time_seconds: Option<f64>,
    pub presentation_start_seconds: Option<f64>,
}

impl EditListEntry {
    pub fn is_empty_edit(&self) -> bool {
        self.media_time == -1
    }

    pub fn media_rate(&self) -> f64 {
        self.media_rate_integer as f64 + self.media_rate_fraction as f64 / 65536.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeToSample {
    pub entries: Vec<TimeToSampleEntry>,
    pub total_samples: Option<u64>,
    pub total_duration: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeToSampleEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionOffsets {
    pub version: u8,
    pub entries: Vec<CompositionOffsetEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompositionOffsetEntry {
    pub sample_count: u32,
    pub sample_offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleToChunk {
    pub entries: Vec<SampleToChunkEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleToChunkEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSize {
    /// Non-zero when every sample has this size and `sizes` is empty.
    pub sample_size: u32,
    pub sample_count: u32,
    pub sizes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkOffsets {
    pub large: bool,
    pub offsets: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSamples {
    pub sample_numbers: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackExtendsDefaults {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackFragmentHeader {
    pub track_id: u32,
    pub flags: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

impl TrackFragmentHeader {
    pub const BASE_DATA_OFFSET_PRESENT: u32 = 0x00_0001;
    pub const SAMPLE_DESCRIPTION_INDEX_PRESENT: u32 = 0x00_0002;
    pub const DEFAULT_DURATION_PRESENT: u32 = 0x00_0008;
    pub const DEFAULT_SIZE_PRESENT: u32 = 0x00_0010;
    pub const DEFAULT_FLAGS_PRESENT: u32 = 0x00_0020;
    pub const DURATION_IS_EMPTY: u32 = 0x01_0000;
    pub const DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

    pub fn duration_is_empty(&self) -> bool {
        self.flags & Self::DURATION_IS_EMPTY != 0
    }

    pub fn default_base_is_moof(&self) -> bool {
        self.flags & Self::DEFAULT_BASE_IS_MOOF != 0
    }
}

/// A decoded `trun`.
///
/// Per-sample rows are kept only when the run stores per-sample fields, and
/// they are shared between every copy of the run. Runs that rely on defaults
/// alone keep no rows; [`TrackRun::sample`] computes any sample on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackRun {
    pub version: u8,
    pub flags: u32,
    pub sample_count: u32,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub track_id: Option<u32>,
    /// Zero-based position of this run inside its track fragment.
    pub run_index: u32,
    /// One-based number of the first sample in this run within the fragment.
    pub first_sample_number: u64,
    /// Fragment defaults in force for this run.
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub start_data_offset: Option<u64>,
    pub end_data_offset: Option<u64>,
    pub start_decode_time: Option<u64>,
    pub end_decode_time: Option<u64>,
    pub earliest_presentation_time: Option<i64>,
    pub latest_presentation_time: Option<i64>,
    pub total_sample_duration: Option<u64>,
    pub total_sample_size: Option<u64>,
    pub entries: Arc<[TrackRunEntry]>,
}

impl TrackRun {
    pub const DATA_OFFSET_PRESENT: u32 = 0x000001;
    pub const FIRST_SAMPLE_FLAGS_PRESENT: u32 = 0x000004;
    pub const SAMPLE_DURATION_PRESENT: u32 = 0x000100;
    pub const SAMPLE_SIZE_PRESENT: u32 = 0x000200;
    pub const SAMPLE_FLAGS_PRESENT: u32 = 0x000400;
    pub const SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT: u32 = 0x000800;

    const PER_SAMPLE_FIELDS: u32 = Self::SAMPLE_DURATION_PRESENT
        | Self::SAMPLE_SIZE_PRESENT
        | Self::SAMPLE_FLAGS_PRESENT
        | Self::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT;

    /// Whether each sample carries its own bytes in the box.
    pub fn has_sample_rows(&self) -> bool {
        self.flags & Self::PER_SAMPLE_FIELDS != 0
    }

    /// Sample `number` (one-based) of this run.
    pub fn sample(&self, number: u32) -> Option<TrackRunEntry> {
        if number == 0 || number > self.sample_count {
            return None;
        }
        if self.has_sample_rows() {
            return self.entries.get(number as usize - 1).cloned();
        }
        let k = (number - 1) as u64;
        let step = |start: Option<u64>, each: Option<u32>| {
            start
                .zip(each)
                .and_then(|(s, n)| (n as u64).checked_mul(k).and_then(|o| s.checked_add(o)))
        };
        let decode_time = step(self.start_decode_time, self.default_sample_duration);
        let flags = match (number, self.first_sample_flags) {
            (1, Some(f)) => Some(f),
            _ => self.default_sample_flags,
        };
        Some(TrackRunEntry {
            index: number,
            duration: self.default_sample_duration,
            size: self.default_sample_size,
            flags,
            composition_time_offset: None,
            decode_time,
            presentation_time: decode_time.and_then(|d| i64::try_from(d).ok()),
            data_offset: step(self.start_data_offset, self.default_sample_size),
        })
    }

    pub fn samples(&self) -> impl Iterator<Item = TrackRunEntry> + '_ {
        (1..=self.sample_count).filter_map(|n| self.sample(n))
    }

    /// Number of samples for which neither the run nor a default supplies a
    /// duration.
    pub fn samples_without_duration(&self) -> u64 {
        let explicit = self.flags & Self::SAMPLE_DURATION_PRESENT != 0;
        if explicit || self.default_sample_duration.is_some() {
            0
        } else {
            self.sample_count as u64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackRunEntry {
    /// One-based sample number inside the run.
    pub index: u32,
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_time_offset: Option<i64>,
    pub decode_time: Option<u64>,
    pub presentation_time: Option<i64>,
    pub data_offset: Option<u64>,
}

/// Aggregate produced when a `traf` closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackFragmentSummary {
    pub track_id: Option<u32>,
    pub moof_start: Option<u64>,
    pub base_data_offset: Option<u64>,
    pub base_decode_time: Option<u64>,
    pub sample_description_index: u32,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub duration_is_empty: bool,
    pub run_count: usize,
    pub total_sample_count: Option<u64>,
    pub total_sample_size: Option<u64>,
    pub total_sample_duration: Option<u64>,
    pub first_decode_time: Option<u64>,
    pub last_decode_time: Option<u64>,
    pub earliest_presentation_time: Option<i64>,
    pub latest_presentation_time: Option<i64>,
    pub runs: Vec<TrackRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackFragmentRandomAccess {
    pub version: u8,
    pub track_id: u32,
    pub traf_number_size: u8,
    pub trun_number_size: u8,
    pub sample_number_size: u8,
    pub entries: Vec<RandomAccessEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RandomAccessEntry {
    pub time: u64,
    pub moof_offset: u64,
    pub traf_number: u32,
    pub trun_number: u32,
    pub sample_number: u32,
    pub resolved: Option<ResolvedSample>,
}

/// A random-access entry matched against an already-walked fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSample {
    pub fragment_sequence_number: Option<u32>,
    pub track_id: Option<u32>,
    pub decode_time: Option<u64>,
    pub presentation_time: Option<i64>,
    pub data_offset: Option<u64>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferredResolution {
    pub track_id: u32,
    pub entry: RandomAccessEntry,
}

/// Aggregate produced when an `mfra` closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RandomAccessSummary {
    pub tracks: Vec<TrackRandomAccessSummary>,
    pub total_entry_count: u64,
    pub mfra_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackRandomAccessSummary {
    pub track_id: u32,
    pub entry_count: u64,
    pub earliest_time: Option<u64>,
    pub latest_time: Option<u64>,
    pub fragment_sequence_numbers: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataKey {
    /// One-based index used by `ilst` item ids.
    pub index: u32,
    pub namespace: FourCC,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataKeys {
    pub version: u8,
    pub keys: Vec<MetadataKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataItems {
    pub handler_type: Option<FourCC>,
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetadataIdentifier {
    KeyIndex(u32),
    Code(FourCC),
    Raw(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataItem {
    pub identifier: MetadataIdentifier,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub values: Vec<MetadataValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataValue {
    pub type_indicator: u32,
    pub locale: u32,
    pub value: MetadataValueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValueKind {
    Utf8(String),
    Utf16(String),
    Integer(i64),
    Unsigned(u64),
    Bytes(#[serde(serialize_with = "hex_bytes")] Vec<u8>),
}
