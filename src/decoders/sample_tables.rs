use super::PayloadReader;
use crate::boxes::BoxHeader;
use crate::payload::{
    ChunkOffsets, CompositionOffsetEntry, CompositionOffsets, Detail, ParsedPayload,
    SampleSize, SampleToChunk, SampleToChunkEntry, SyncSamples, TimeToSample, TimeToSampleEntry,
};
use crate::registry::DecoderEnv;
use crate::source::ByteSource;

/// Each table row is at least this many bytes; caps preallocation on corrupt counts.
fn capacity(count: u32, row: u64, rd: &PayloadReader) -> usize {
    (count as u64).min(rd.remaining() / row) as usize
}

// stts: run-length decode deltas
pub fn decode_stts(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let entry_count = rd.u32("entry_count")?;

    let mut entries = Vec::with_capacity(capacity(entry_count, 8, &rd));
    let mut total_samples = Some(0u64);
    let mut total_duration = Some(0u64);
    for _ in 0..entry_count {
        let sample_count = rd.read_u32()?;
        let sample_delta = rd.read_u32()?;
        total_samples = total_samples.and_then(|t| t.checked_add(sample_count as u64));
        total_duration = total_duration
            .and_then(|t| t.checked_add((sample_count as u64).checked_mul(sample_delta as u64)?));
        entries.push(TimeToSampleEntry {
            sample_count,
            sample_delta,
        });
    }

    Ok(rd.finish(Detail::DecodingTimeToSample(TimeToSample {
        entries,
        total_samples,
        total_duration,
    })))
}

// ctts: signed offsets in version 1
pub fn decode_ctts(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, _) = rd.full_box()?;
    let entry_count = rd.u32("entry_count")?;

    let mut entries = Vec::with_capacity(capacity(entry_count, 8, &rd));
    for _ in 0..entry_count {
        let sample_count = rd.read_u32()?;
        let sample_offset = if version == 1 {
            rd.read_i32()? as i64
        } else {
            rd.read_u32()? as i64
        };
        entries.push(CompositionOffsetEntry {
            sample_count,
            sample_offset,
        });
    }

    Ok(rd.finish(Detail::CompositionOffsets(CompositionOffsets { version, entries })))
}

pub fn decode_stsc(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let entry_count = rd.u32("entry_count")?;

    let mut entries = Vec::with_capacity(capacity(entry_count, 12, &rd));
    for _ in 0..entry_count {
        entries.push(SampleToChunkEntry {
            first_chunk: rd.read_u32()?,
            samples_per_chunk: rd.read_u32()?,
            sample_description_index: rd.read_u32()?,
        });
    }

    Ok(rd.finish(Detail::SampleToChunk(SampleToChunk { entries })))
}

pub fn decode_stsz(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let sample_size = rd.u32("sample_size")?;
    let sample_count = rd.u32("sample_count")?;

    let mut sizes = Vec::new();
    if sample_size == 0 {
        sizes.reserve(capacity(sample_count, 4, &rd));
        for _ in 0..sample_count {
            sizes.push(rd.read_u32()?);
        }
    }

    Ok(rd.finish(Detail::SampleSize(SampleSize {
        sample_size,
        sample_count,
        sizes,
    })))
}

pub fn decode_stco(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let entry_count = rd.u32("entry_count")?;

    let mut offsets = Vec::with_capacity(capacity(entry_count, 4, &rd));
    for _ in 0..entry_count {
        offsets.push(rd.read_u32()? as u64);
    }

    Ok(rd.finish(Detail::ChunkOffsets(ChunkOffsets {
        large: false,
        offsets,
    })))
}

pub fn decode_co64(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let entry_count = rd.u32("entry_count")?;

    let mut offsets = Vec::with_capacity(capacity(entry_count, 8, &rd));
    for _ in 0..entry_count {
        offsets.push(rd.read_u64()?);
    }

    Ok(rd.finish(Detail::ChunkOffsets(ChunkOffsets {
        large: true,
        offsets,
    })))
}

pub fn decode_stss(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let entry_count = rd.u32("entry_count")?;

    let mut sample_numbers = Vec::with_capacity(capacity(entry_count, 4, &rd));
    for _ in 0..entry_count {
        sample_numbers.push(rd.read_u32()?);
    }

    Ok(rd.finish(Detail::SyncSamples(SyncSamples { sample_numbers })))
}
