//! File- and movie-level boxes.

use super::{PayloadReader, c_string, fixed_8_8, fixed_16_16, lang_from_u16};
use crate::boxes::BoxHeader;
use crate::payload::{
    Detail, EditList, EditListEntry, FileType, HandlerReference, MediaHeader, MovieHeader,
    ParsedPayload, TrackHeader,
};
use crate::registry::DecoderEnv;
use crate::source::ByteSource;

// ftyp / styp: major + minor + compatible brands
pub fn decode_ftyp(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let major_brand = rd.fourcc("major_brand")?;
    let minor_version = rd.u32("minor_version")?;
    let mut compatible_brands = Vec::new();
    while rd.remaining() >= 4 {
        compatible_brands.push(rd.fourcc("compatible_brand")?);
    }
    Ok(rd.finish(Detail::FileType(FileType {
        major_brand,
        minor_version,
        compatible_brands,
    })))
}

// mdat is never read; only its extent is reported.
pub fn decode_mdat(
    hdr: &BoxHeader,
    _src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::from_bytes(Vec::new(), hdr.payload.start);
    rd.push_derived("data_offset", hdr.payload.start);
    rd.push_derived("data_length", hdr.payload_len());
    Ok(rd.finish(Detail::MediaData {
        data_range: hdr.payload.clone(),
    }))
}

pub fn decode_padding(
    hdr: &BoxHeader,
    _src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::from_bytes(Vec::new(), hdr.payload.start);
    rd.push_derived("length", hdr.payload_len());
    Ok(rd.finish(Detail::Padding {
        length: hdr.payload_len(),
    }))
}

pub fn decode_mvhd(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, _flags) = rd.full_box()?;
    let creation_time = rd.versioned("creation_time", version)?;
    let modification_time = rd.versioned("modification_time", version)?;
    let timescale = rd.u32("timescale")?;
    let duration = rd.versioned("duration", version)?;

    let start = rd.offset();
    let rate = fixed_16_16(rd.read_u32()?);
    rd.push("rate", rate, start);
    let start = rd.offset();
    let volume = fixed_8_8(rd.read_u16()?);
    rd.push("volume", volume, start);

    // reserved(2) + reserved(4*2) + matrix(4*9) + pre_defined(4*6)
    rd.skip(2 + 8 + 36 + 24)?;
    let next_track_id = rd.u32("next_track_id")?;

    Ok(rd.finish(Detail::MovieHeader(MovieHeader {
        version,
        creation_time,
        modification_time,
        timescale,
        duration,
        rate,
        volume,
        next_track_id,
    })))
}

pub fn decode_tkhd(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, flags) = rd.full_box()?;
    rd.versioned("creation_time", version)?;
    rd.versioned("modification_time", version)?;
    let track_id = rd.u32("track_id")?;
    rd.skip(4)?; // reserved
    let duration = rd.versioned("duration", version)?;

    // reserved[2], layer, alternate_group, volume, reserved, matrix
    rd.skip(8 + 2 + 2 + 2 + 2 + 36)?;
    let start = rd.offset();
    let width = fixed_16_16(rd.read_u32()?);
    rd.push("width", width, start);
    let start = rd.offset();
    let height = fixed_16_16(rd.read_u32()?);
    rd.push("height", height, start);

    Ok(rd.finish(Detail::TrackHeader(TrackHeader {
        version,
        flags,
        track_id,
        duration,
        width,
        height,
    })))
}

pub fn decode_mdhd(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, _flags) = rd.full_box()?;
    rd.versioned("creation_time", version)?;
    rd.versioned("modification_time", version)?;
    let timescale = rd.u32("timescale")?;
    let duration = rd.versioned("duration", version)?;
    let start = rd.offset();
    let language = lang_from_u16(rd.read_u16()? & 0x7FFF);
    rd.push("language", language.clone(), start);

    Ok(rd.finish(Detail::MediaHeader(MediaHeader {
        version,
        timescale,
        duration,
        language,
    })))
}

pub fn decode_hdlr(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    rd.skip(4)?; // pre_defined
    let handler_type = rd.fourcc("handler_type")?;
    rd.skip(12)?; // reserved
    let start = rd.offset();
    let name = c_string(&rd.read_to_end());
    rd.push("name", name.clone(), start);

    Ok(rd.finish(Detail::HandlerReference(HandlerReference { handler_type, name })))
}

fn seconds(value: u64, timescale: Option<u32>) -> Option<f64> {
    match timescale {
        Some(ts) if ts > 0 => Some(value as f64 / ts as f64),
        _ => None,
    }
}

/// Edit list. Durations are in the movie timescale and media times in the
/// track's media timescale; both come from the decoder environment.
pub fn decode_elst(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, _flags) = rd.full_box()?;
    let entry_count = rd.u32("entry_count")?;

    let timescales = env.edit_list.unwrap_or_default();
    let movie_ts = timescales.movie_timescale;
    let media_ts = timescales.media_timescale;

    let mut entries = Vec::with_capacity(entry_count.min(4096) as usize);
    let mut cursor = Some(0u64);
    for _ in 0..entry_count {
        let segment_duration = rd.read_versioned(version)?;
        let media_time = if version == 1 {
            rd.read_i64()?
        } else {
            rd.read_i32()? as i64
        };
        let media_rate_integer = rd.read_i16()?;
        let media_rate_fraction = rd.read_u16()?;

        let media_time_seconds = if media_time >= 0 {
            seconds(media_time as u64, media_ts)
        } else {
            None
        };
        entries.push(EditListEntry {
            segment_duration,
            media_time,
            media_rate_integer,
            media_rate_fraction,
            presentation_start: cursor,
            segment_duration_seconds: seconds(segment_duration, movie_ts),
            media_time_seconds,
            presentation_start_seconds: cursor.and_then(|c| seconds(c, movie_ts)),
        });
        cursor = cursor.and_then(|c| c.checked_add(segment_duration));
    }

    if let Some(ts) = movie_ts {
        rd.push_derived("movie_timescale", ts);
    }
    if let Some(ts) = media_ts {
        rd.push_derived("media_timescale", ts);
    }

    Ok(rd.finish(Detail::EditList(EditList {
        version,
        movie_timescale: movie_ts,
        media_timescale: media_ts,
        entries,
    })))
}
