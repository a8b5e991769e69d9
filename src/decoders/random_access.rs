use super::PayloadReader;
use crate::boxes::BoxHeader;
use crate::payload::{
    Detail, ParsedPayload, RandomAccessEntry, TrackFragmentRandomAccess,
};
use crate::registry::DecoderEnv;
use crate::source::ByteSource;

/// Read a big-endian unsigned integer of `size` bytes (1..=4).
fn read_sized(rd: &mut PayloadReader, size: u8) -> anyhow::Result<u32> {
    Ok(match size {
        1 => rd.read_u8()? as u32,
        2 => rd.read_u16()? as u32,
        3 => rd.read_u24()?,
        _ => rd.read_u32()?,
    })
}

/// Track fragment random access table. Entries that point at a fragment
/// walked earlier are resolved to the recorded sample.
pub fn decode_tfra(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, _) = rd.full_box()?;
    let track_id = rd.u32("track_id")?;
    let sizes = rd.u32("length_size_of_fields")?;
    let traf_number_size = ((sizes >> 4) & 0x3) as u8 + 1;
    let trun_number_size = ((sizes >> 2) & 0x3) as u8 + 1;
    let sample_number_size = (sizes & 0x3) as u8 + 1;
    let entry_count = rd.u32("number_of_entry")?;

    let time_fields: u64 = if version == 1 { 16 } else { 8 };
    let row = time_fields + (traf_number_size + trun_number_size + sample_number_size) as u64;
    if (entry_count as u64) * row > rd.remaining() {
        anyhow::bail!(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "tfra declares {} entries but only {} bytes remain",
                entry_count,
                rd.remaining()
            ),
        ));
    }

    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut resolved_count = 0u32;
    for _ in 0..entry_count {
        let time = rd.read_versioned(version)?;
        let moof_offset = rd.read_versioned(version)?;
        let mut entry = RandomAccessEntry {
            time,
            moof_offset,
            traf_number: read_sized(&mut rd, traf_number_size)?,
            trun_number: read_sized(&mut rd, trun_number_size)?,
            sample_number: read_sized(&mut rd, sample_number_size)?,
            resolved: None,
        };
        entry.resolved = env
            .random_access
            .and_then(|ra| ra.fragments.get(&entry.moof_offset))
            .and_then(|f| f.resolve(&entry));
        if entry.resolved.is_some() {
            resolved_count += 1;
        }
        entries.push(entry);
    }
    rd.push_derived("resolved_entries", resolved_count);

    Ok(rd.finish(Detail::TrackFragmentRandomAccess(TrackFragmentRandomAccess {
        version,
        track_id,
        traf_number_size,
        trun_number_size,
        sample_number_size,
        entries,
    })))
}

pub fn decode_mfro(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    rd.full_box()?;
    let mfra_size = rd.u32("mfra_size")?;
    Ok(rd.finish(Detail::MovieFragmentRandomAccessOffset { mfra_size }))
}
