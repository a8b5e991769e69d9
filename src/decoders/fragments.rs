//! Movie fragment boxes: `mvex`/`trex`, `moof`/`mfhd`, `traf`/`tfhd`/`tfdt`/`trun`.

use super::PayloadReader;
use crate::boxes::BoxHeader;
use crate::payload::{
    Detail, ParsedPayload, TrackExtendsDefaults, TrackFragmentHeader, TrackRun, TrackRunEntry,
};
use crate::registry::DecoderEnv;
use crate::source::ByteSource;
use std::sync::Arc;

/// Pure containers whose aggregate, if any, is synthesized on exit.
pub fn decode_empty(
    _hdr: &BoxHeader,
    _src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    Ok(ParsedPayload::default())
}

pub fn decode_mehd(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, _) = rd.full_box()?;
    let fragment_duration = rd.versioned("fragment_duration", version)?;
    Ok(rd.finish(Detail::MovieExtendsHeader { fragment_duration }))
}

pub fn decode_trex(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let defaults = TrackExtendsDefaults {
        track_id: rd.u32("track_id")?,
        default_sample_description_index: rd.u32("default_sample_description_index")?,
        default_sample_duration: rd.u32("default_sample_duration")?,
        default_sample_size: rd.u32("default_sample_size")?,
        default_sample_flags: rd.u32("default_sample_flags")?,
    };
    Ok(rd.finish(Detail::TrackExtends(defaults)))
}

pub fn decode_mfhd(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let sequence_number = rd.u32("sequence_number")?;
    Ok(rd.finish(Detail::MovieFragmentHeader { sequence_number }))
}

pub fn decode_tfhd(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (_, flags) = rd.full_box()?;
    let track_id = rd.u32("track_id")?;

    let base_data_offset = match flags & TrackFragmentHeader::BASE_DATA_OFFSET_PRESENT {
        0 => None,
        _ => Some(rd.u64("base_data_offset")?),
    };
    let sample_description_index = match flags
        & TrackFragmentHeader::SAMPLE_DESCRIPTION_INDEX_PRESENT
    {
        0 => None,
        _ => Some(rd.u32("sample_description_index")?),
    };
    let default_sample_duration = match flags & TrackFragmentHeader::DEFAULT_DURATION_PRESENT {
        0 => None,
        _ => Some(rd.u32("default_sample_duration")?),
    };
    let default_sample_size = match flags & TrackFragmentHeader::DEFAULT_SIZE_PRESENT {
        0 => None,
        _ => Some(rd.u32("default_sample_size")?),
    };
    let default_sample_flags = match flags & TrackFragmentHeader::DEFAULT_FLAGS_PRESENT {
        0 => None,
        _ => Some(rd.u32("default_sample_flags")?),
    };

    let tfhd = TrackFragmentHeader {
        track_id,
        flags,
        base_data_offset,
        sample_description_index,
        default_sample_duration,
        default_sample_size,
        default_sample_flags,
    };
    if tfhd.duration_is_empty() {
        rd.push_derived("duration_is_empty", 1u8);
    }
    if tfhd.default_base_is_moof() {
        rd.push_derived("default_base_is_moof", 1u8);
    }
    Ok(rd.finish(Detail::TrackFragmentHeader(tfhd)))
}

pub fn decode_tfdt(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, _) = rd.full_box()?;
    let base_media_decode_time = rd.versioned("base_media_decode_time", version)?;
    Ok(rd.finish(Detail::TrackFragmentDecodeTime {
        base_media_decode_time,
    }))
}

fn min_opt(a: Option<i64>, b: i64) -> Option<i64> {
    Some(a.map_or(b, |a| a.min(b)))
}

fn max_opt(a: Option<i64>, b: i64) -> Option<i64> {
    Some(a.map_or(b, |a| a.max(b)))
}

/// Track run. Missing per-sample values fall back to the fragment defaults in
/// the environment, and sample positions are resolved against the
/// fragment's base data offset, data cursor and decode time.
///
/// Every running total is checked: once a value is unknown or an addition
/// overflows, the total and everything derived from it becomes `None`.
pub fn decode_trun(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, flags) = rd.full_box()?;
    let sample_count = rd.u32("sample_count")?;

    let data_offset = match flags & TrackRun::DATA_OFFSET_PRESENT {
        0 => None,
        _ => Some(rd.i32("data_offset")?),
    };
    let first_sample_flags = match flags & TrackRun::FIRST_SAMPLE_FLAGS_PRESENT {
        0 => None,
        _ => Some(rd.u32("first_sample_flags")?),
    };

    let frag = env.fragment.clone().unwrap_or_default();
    let start_data_offset = match data_offset {
        Some(off) => frag.base_data_offset.and_then(|b| b.checked_add_signed(off as i64)),
        None => frag.data_cursor,
    };

    let mut run = TrackRun {
        version,
        flags,
        sample_count,
        data_offset,
        first_sample_flags,
        track_id: frag.track_id,
        run_index: frag.run_index,
        first_sample_number: frag.next_sample_number,
        default_sample_duration: frag.default_sample_duration,
        default_sample_size: frag.default_sample_size,
        default_sample_flags: frag.default_sample_flags,
        start_data_offset,
        end_data_offset: None,
        start_decode_time: frag.next_decode_time,
        end_decode_time: None,
        earliest_presentation_time: None,
        latest_presentation_time: None,
        total_sample_duration: None,
        total_sample_size: None,
        entries: Arc::from(Vec::new()),
    };
    if run.has_sample_rows() {
        read_sample_rows(&mut rd, &mut run)?;
    } else {
        close_default_run(&mut run);
    }

    if let Some(v) = run.start_data_offset {
        rd.push_derived("start_data_offset", v);
    }
    if let Some(v) = run.end_data_offset {
        rd.push_derived("end_data_offset", v);
    }
    if let Some(v) = run.start_decode_time {
        rd.push_derived("start_decode_time", v);
    }
    if let Some(v) = run.total_sample_duration {
        rd.push_derived("total_sample_duration", v);
    }
    if let Some(v) = run.total_sample_size {
        rd.push_derived("total_sample_size", v);
    }
    Ok(rd.finish(Detail::TrackRun(run)))
}

/// Totals of a run whose samples all take the fragment defaults, computed
/// without materializing the samples.
fn close_default_run(run: &mut TrackRun) {
    let count = run.sample_count as u64;
    if count == 0 {
        run.end_data_offset = run.start_data_offset;
        run.end_decode_time = run.start_decode_time;
        run.total_sample_duration = Some(0);
        run.total_sample_size = Some(0);
        return;
    }
    let total = |each: Option<u32>| each.and_then(|n| (n as u64).checked_mul(count));
    run.total_sample_duration = total(run.default_sample_duration);
    run.total_sample_size = total(run.default_sample_size);
    run.end_decode_time = run
        .start_decode_time
        .zip(run.total_sample_duration)
        .and_then(|(s, t)| s.checked_add(t));
    run.end_data_offset = run
        .start_data_offset
        .zip(run.total_sample_size)
        .and_then(|(s, t)| s.checked_add(t));
    run.earliest_presentation_time = run.sample(1).and_then(|s| s.presentation_time);
    run.latest_presentation_time = run.sample(run.sample_count).and_then(|s| s.presentation_time);
}

/// Reads the per-sample rows of `run`, which must all be present in the box.
fn read_sample_rows(rd: &mut PayloadReader, run: &mut TrackRun) -> anyhow::Result<()> {
    let flags = run.flags;
    let has_duration = flags & TrackRun::SAMPLE_DURATION_PRESENT != 0;
    let has_size = flags & TrackRun::SAMPLE_SIZE_PRESENT != 0;
    let has_flags = flags & TrackRun::SAMPLE_FLAGS_PRESENT != 0;
    let has_cto = flags & TrackRun::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT != 0;
    let row = 4 * (has_duration as u64 + has_size as u64 + has_flags as u64 + has_cto as u64);

    let needed = run.sample_count as u64 * row;
    if needed > rd.remaining() {
        anyhow::bail!(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("trun needs {} bytes of samples, {} available", needed, rd.remaining()),
        ));
    }

    let mut entries = Vec::with_capacity(run.sample_count as usize);
    let mut decode_cursor = run.start_decode_time;
    let mut data_cursor = run.start_data_offset;
    let mut total_duration = Some(0u64);
    let mut total_size = Some(0u64);
    let mut earliest = None;
    let mut latest = None;

    for i in 0..run.sample_count {
        let duration = if has_duration {
            Some(rd.read_u32()?)
        } else {
            run.default_sample_duration
        };
        let size = if has_size {
            Some(rd.read_u32()?)
        } else {
            run.default_sample_size
        };
        let explicit_flags = if has_flags { Some(rd.read_u32()?) } else { None };
        let sample_flags = match (i, run.first_sample_flags) {
            (0, Some(f)) => Some(f),
            _ => explicit_flags.or(run.default_sample_flags),
        };
        let composition_time_offset = if !has_cto {
            None
        } else if run.version == 0 {
            Some(rd.read_u32()? as i64)
        } else {
            Some(rd.read_i32()? as i64)
        };

        let presentation_time = decode_cursor
            .and_then(|d| i64::try_from(d).ok())
            .and_then(|d| d.checked_add(composition_time_offset.unwrap_or(0)));
        if let Some(p) = presentation_time {
            earliest = min_opt(earliest, p);
            latest = max_opt(latest, p);
        }

        entries.push(TrackRunEntry {
            index: i + 1,
            duration,
            size,
            flags: sample_flags,
            composition_time_offset,
            decode_time: decode_cursor,
            presentation_time,
            data_offset: data_cursor,
        });

        decode_cursor = decode_cursor.zip(duration).and_then(|(d, n)| d.checked_add(n as u64));
        data_cursor = data_cursor.zip(size).and_then(|(d, n)| d.checked_add(n as u64));
        total_duration = total_duration.zip(duration).and_then(|(t, n)| t.checked_add(n as u64));
        total_size = total_size.zip(size).and_then(|(t, n)| t.checked_add(n as u64));
    }

    run.end_decode_time = decode_cursor;
    run.end_data_offset = data_cursor;
    run.earliest_presentation_time = earliest;
    run.latest_presentation_time = latest;
    run.total_sample_duration = total_duration;
    run.total_sample_size = total_size;
    run.entries = entries.into();
    Ok(())
}
