//! `meta`, `keys` and `ilst`.

use super::PayloadReader;
use crate::boxes::{BoxHeader, FourCC};
use crate::payload::{
    Detail, MetadataIdentifier, MetadataItem, MetadataItems, MetadataKey, MetadataKeys,
    MetadataValue, MetadataValueKind, ParsedPayload,
};
use crate::registry::DecoderEnv;
use crate::source::ByteSource;

const TYPE_UTF8: u32 = 1;
const TYPE_UTF16: u32 = 2;
const TYPE_SIGNED: u32 = 21;
const TYPE_UNSIGNED: u32 = 22;

/// Codes may carry Latin-1 bytes such as the `©` prefix of iTunes atoms.
fn latin1(cc: FourCC) -> String {
    cc.0.iter().map(|&b| b as char).collect()
}

/// Only the version and flags are read; the children are walked.
pub fn decode_meta(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::prefix(hdr, src, 4)?;
    let (version, flags) = rd.full_box()?;
    Ok(rd.finish(Detail::Metadata { version, flags }))
}

/// Key table. Each entry's size covers its own size field and namespace.
pub fn decode_keys(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    _env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let (version, _) = rd.full_box()?;
    let entry_count = rd.u32("entry_count")?;

    let mut keys = Vec::new();
    for index in 1..=entry_count {
        if rd.remaining() < 8 {
            rd.push_derived(&format!("entries[{}].status", index), "truncated".to_string());
            break;
        }
        let key_size = rd.read_u32()? as u64;
        if key_size < 8 || key_size - 4 > rd.remaining() {
            rd.push_derived(&format!("entries[{}].status", index), "invalid".to_string());
            break;
        }
        let namespace = rd.fourcc(&format!("entries[{}].namespace", index))?;
        let start = rd.offset();
        let name = String::from_utf8_lossy(&rd.read_bytes(key_size - 8)?).into_owned();
        rd.push(&format!("entries[{}].name", index), name.clone(), start);
        keys.push(MetadataKey {
            index,
            namespace,
            name,
        });
    }

    Ok(rd.finish(Detail::MetadataKeys(MetadataKeys { version, keys })))
}

fn decode_value(type_indicator: u32, data: &[u8]) -> MetadataValueKind {
    match type_indicator {
        TYPE_UTF8 => MetadataValueKind::Utf8(String::from_utf8_lossy(data).into_owned()),
        TYPE_UTF16 => {
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            MetadataValueKind::Utf16(String::from_utf16_lossy(&units))
        }
        TYPE_SIGNED if matches!(data.len(), 1 | 2 | 3 | 4 | 8) => {
            let mut v = if data[0] & 0x80 != 0 { -1i64 } else { 0 };
            for &b in data {
                v = (v << 8) | b as i64;
            }
            MetadataValueKind::Integer(v)
        }
        TYPE_UNSIGNED if matches!(data.len(), 1 | 2 | 3 | 4 | 8) => {
            let v = data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
            MetadataValueKind::Unsigned(v)
        }
        _ => MetadataValueKind::Bytes(data.to_vec()),
    }
}

/// Item list. Item ids resolve against the enclosing `meta`'s key table when
/// one exists, otherwise as four-character codes.
pub fn decode_ilst(
    hdr: &BoxHeader,
    src: &dyn ByteSource,
    env: &DecoderEnv<'_>,
) -> anyhow::Result<ParsedPayload> {
    let mut rd = PayloadReader::new(hdr, src)?;
    let meta = env.metadata.clone().unwrap_or_default();
    let handler = meta.handler_type.map(latin1);
    if let Some(h) = &handler {
        rd.push_derived("handler_type", h.clone());
    }

    let mut items = Vec::new();
    while rd.remaining() >= 8 {
        let entry_start = rd.offset();
        let entry_size = rd.read_u32()? as u64;
        if entry_size < 8 || entry_size - 4 > rd.remaining() {
            break;
        }
        let entry_end = entry_start + entry_size;
        let id_start = rd.offset();
        let raw = rd.read_u32()?;
        let n = items.len();

        let (identifier, namespace, name) = if let Some(key) = meta.keys.get(&raw) {
            (
                MetadataIdentifier::KeyIndex(raw),
                Some(latin1(key.namespace)),
                Some(key.name.clone()),
            )
        } else if FourCC::from(raw).is_valid() {
            let cc = FourCC::from(raw);
            (MetadataIdentifier::Code(cc), handler.clone(), Some(latin1(cc)))
        } else {
            (MetadataIdentifier::Raw(raw), handler.clone(), None)
        };
        let shown = match &identifier {
            MetadataIdentifier::KeyIndex(i) => format!("key#{}", i),
            MetadataIdentifier::Code(cc) => latin1(*cc),
            MetadataIdentifier::Raw(r) => format!("0x{:08x}", r),
        };
        rd.push(&format!("entries[{}].identifier", n), shown, id_start);
        if let Some(name) = &name {
            rd.push_derived(&format!("entries[{}].name", n), name.clone());
        }

        let mut values = Vec::new();
        while rd.offset() + 8 <= entry_end {
            let child_start = rd.offset();
            let child_size = rd.read_u32()? as u64;
            if child_size < 8 || child_start + child_size > entry_end {
                break;
            }
            let child_type = rd.read_fourcc()?;
            if &child_type.0 == b"data" && child_size >= 16 {
                let type_indicator = rd.read_u32()? & 0x00FF_FFFF;
                let locale = rd.read_u32()?;
                let data_start = rd.offset();
                let data = rd.read_bytes(child_start + child_size - data_start)?;
                let value = decode_value(type_indicator, &data);
                rd.push(
                    &format!("entries[{}].values[{}]", n, values.len()),
                    match &value {
                        MetadataValueKind::Utf8(s) | MetadataValueKind::Utf16(s) => s.clone(),
                        MetadataValueKind::Integer(i) => i.to_string(),
                        MetadataValueKind::Unsigned(u) => u.to_string(),
                        MetadataValueKind::Bytes(b) => hex::encode(b),
                    },
                    data_start,
                );
                values.push(MetadataValue {
                    type_indicator,
                    locale,
                    value,
                });
            } else {
                rd.skip(child_start + child_size - rd.offset())?;
            }
        }
        rd.skip(entry_end - rd.offset())?;

        items.push(MetadataItem {
            identifier,
            namespace,
            name,
            values,
        });
    }
    rd.push_derived("entry_count", items.len() as u64);

    Ok(rd.finish(Detail::MetadataItems(MetadataItems {
        handler_type: meta.handler_type,
        items,
    })))
}
