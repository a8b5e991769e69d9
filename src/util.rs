use crate::boxes::BoxHeader;
use crate::source::{ByteSource, SourceError};

/// Read up to `limit` bytes of a box payload (0 means all of it), clipped to
/// what the source actually holds.
pub fn read_payload(
    src: &dyn ByteSource,
    hdr: &BoxHeader,
    limit: u64,
) -> Result<Vec<u8>, SourceError> {
    let available = hdr.payload.end.min(src.len()).saturating_sub(hdr.payload.start);
    let count = if limit == 0 { available } else { available.min(limit) };
    src.read(hdr.payload.start, count)
}

pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<48}  |{}|\n", offs, hexs, ascii));
    }
    out
}
