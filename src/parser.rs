use crate::boxes::{BoxHeader, FourCC};
use crate::source::{ByteSource, SourceError};
use std::ops::Range;

#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    #[error("offset {offset} is outside parent range {parent:?}")]
    OffsetOutsideParent { offset: u64, parent: Range<u64> },
    #[error("offset {offset} is beyond source length {len}")]
    OffsetBeyondSource { offset: u64, len: u64 },
    #[error("truncated {field} at {offset}: expected {expected} bytes, {actual} available")]
    TruncatedField {
        field: &'static str,
        offset: u64,
        expected: u64,
        actual: u64,
    },
    #[error("invalid four-character code {fourcc:?} at {offset}")]
    InvalidFourCC { fourcc: FourCC, offset: u64 },
    #[error("box at {offset} has size 0 but no parent range to extend to")]
    ZeroSizeWithoutParent { offset: u64 },
    #[error("box at {offset} declares size {size} which is not representable")]
    SizeOutOfRange { offset: u64, size: u64 },
    #[error("box at {offset} declares size {size} smaller than its {header_size}-byte header")]
    InvalidSize {
        offset: u64,
        size: u64,
        header_size: u64,
    },
    #[error("box at {offset} ends at {end}, past parent end {parent_end}")]
    ExceedsParent {
        offset: u64,
        end: u64,
        parent_end: u64,
    },
    #[error("box at {offset} ends at {end}, past source length {len}")]
    ExceedsSource { offset: u64, end: u64, len: u64 },
    #[error("source: {0}")]
    Source(#[from] SourceError),
}

impl HeaderError {
    /// Machine-readable issue code.
    pub fn code(&self) -> &'static str {
        match self {
            HeaderError::OffsetOutsideParent { .. } => "header.offset_outside_parent",
            HeaderError::OffsetBeyondSource { .. } => "header.offset_beyond_source",
            HeaderError::TruncatedField { .. } => "header.truncated_field",
            HeaderError::InvalidFourCC { .. } => "header.invalid_fourcc",
            HeaderError::ZeroSizeWithoutParent { .. } => "header.zero_size_without_parent",
            HeaderError::SizeOutOfRange { .. } => "header.size_out_of_range",
            HeaderError::InvalidSize { .. } => "header.invalid_size",
            HeaderError::ExceedsParent { .. } => "header.exceeds_parent",
            HeaderError::ExceedsSource { .. } => "header.exceeds_source",
            HeaderError::Source(_) => "header.source_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, HeaderError>;

/// Bytes of the box that can be read at `cursor` without leaving either the
/// parent or the source.
struct Limits {
    end: u64,
}

impl Limits {
    fn take(
        &self,
        src: &dyn ByteSource,
        field: &'static str,
        cursor: &mut u64,
        count: u64,
    ) -> Result<Vec<u8>> {
        let available = self.end.saturating_sub(*cursor);
        if available < count {
            return Err(HeaderError::TruncatedField {
                field,
                offset: *cursor,
                expected: count,
                actual: available,
            });
        }
        let bytes = src.read(*cursor, count)?;
        *cursor += count;
        Ok(bytes)
    }
}

/// Decode the box header at `offset`.
///
/// `parent` bounds the box; without one the whole source is the implicit
/// parent, except that a 32-bit size of 0 then has nothing to extend to and is
/// rejected. The function is pure: it reads only header bytes and never
/// retries.
pub fn read_box_header(
    src: &dyn ByteSource,
    offset: u64,
    parent: Option<&Range<u64>>,
) -> Result<BoxHeader> {
    let len = src.len();
    let bounds = parent.cloned().unwrap_or(0..len);

    if offset < bounds.start || offset >= bounds.end {
        return Err(HeaderError::OffsetOutsideParent {
            offset,
            parent: bounds,
        });
    }
    if offset >= len {
        return Err(HeaderError::OffsetBeyondSource { offset, len });
    }

    let limits = Limits {
        end: bounds.end.min(len),
    };
    let mut cursor = offset;

    let size_bytes = limits.take(src, "size", &mut cursor, 4)?;
    let size32 = u32::from_be_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]);

    let type_bytes = limits.take(src, "type", &mut cursor, 4)?;
    let typ = FourCC([type_bytes[0], type_bytes[1], type_bytes[2], type_bytes[3]]);
    if !typ.is_valid() {
        return Err(HeaderError::InvalidFourCC {
            fourcc: typ,
            offset: offset + 4,
        });
    }

    let mut declared = size32 as u64;
    if size32 == 1 {
        let large = limits.take(src, "largesize", &mut cursor, 8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&large);
        declared = u64::from_be_bytes(arr);
        if declared > i64::MAX as u64 {
            return Err(HeaderError::SizeOutOfRange {
                offset,
                size: declared,
            });
        }
    }

    let mut uuid = None;
    if &typ.0 == b"uuid" {
        let ext = limits.take(src, "extended type", &mut cursor, 16)?;
        let mut u = [0u8; 16];
        u.copy_from_slice(&ext);
        uuid = Some(u);
    }

    let header_size = cursor - offset;

    let total_size = if size32 == 0 {
        match parent {
            Some(p) => p.end - offset,
            None => return Err(HeaderError::ZeroSizeWithoutParent { offset }),
        }
    } else {
        declared
    };

    if total_size < header_size {
        return Err(HeaderError::InvalidSize {
            offset,
            size: total_size,
            header_size,
        });
    }

    let end = offset
        .checked_add(total_size)
        .ok_or(HeaderError::SizeOutOfRange {
            offset,
            size: total_size,
        })?;
    if end > len {
        return Err(HeaderError::ExceedsSource { offset, end, len });
    }
    if end > bounds.end {
        return Err(HeaderError::ExceedsParent {
            offset,
            end,
            parent_end: bounds.end,
        });
    }

    Ok(BoxHeader {
        typ,
        total_size,
        header_size,
        payload: cursor..end,
        range: offset..end,
        uuid,
    })
}
