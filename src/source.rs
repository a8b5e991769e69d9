//! Random-access byte sources the walker reads from.

use crate::boxes::FourCC;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("read at {offset} (+{count}) is outside source of length {len}")]
    OutOfBounds { offset: u64, count: u64, len: u64 },
    #[error("truncated read at {offset}: expected {expected} bytes, got {actual}")]
    Truncated {
        offset: u64,
        expected: u64,
        actual: u64,
    },
    #[error("invalid four-character code {0:?} at {1}")]
    InvalidFourCC(FourCC, u64),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A read-only, random-access view of a file.
///
/// `read` must return exactly `count` bytes or fail; short reads are errors.
pub trait ByteSource: Send + Sync {
    fn len(&self) -> u64;

    fn read(&self, offset: u64, count: u64) -> Result<Vec<u8>, SourceError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_u8(&self, offset: u64) -> Result<u8, SourceError> {
        let b = self.read(offset, 1)?;
        Ok(b[0])
    }

    fn read_u16(&self, offset: u64) -> Result<u16, SourceError> {
        let b = self.read(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, offset: u64) -> Result<u32, SourceError> {
        let b = self.read(offset, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&self, offset: u64) -> Result<u64, SourceError> {
        let b = self.read(offset, 8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&b);
        Ok(u64::from_be_bytes(arr))
    }

    fn read_fourcc(&self, offset: u64) -> Result<FourCC, SourceError> {
        let b = self.read(offset, 4)?;
        let cc = FourCC([b[0], b[1], b[2], b[3]]);
        if !cc.is_valid() {
            return Err(SourceError::InvalidFourCC(cc, offset));
        }
        Ok(cc)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Arc<S> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read(&self, offset: u64, count: u64) -> Result<Vec<u8>, SourceError> {
        (**self).read(offset, count)
    }
}

fn check_bounds(offset: u64, count: u64, len: u64) -> Result<(), SourceError> {
    if offset > len {
        return Err(SourceError::OutOfBounds { offset, count, len });
    }
    let available = len - offset;
    if count > available {
        return Err(SourceError::Truncated {
            offset,
            expected: count,
            actual: available,
        });
    }
    Ok(())
}

/// In-memory buffer.
#[derive(Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&self, offset: u64, count: u64) -> Result<Vec<u8>, SourceError> {
        check_bounds(offset, count, self.len())?;
        let start = offset as usize;
        Ok(self.data[start..start + count as usize].to_vec())
    }
}

/// File handle with the length captured at open time.
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read(&self, offset: u64, count: u64) -> Result<Vec<u8>, SourceError> {
        check_bounds(offset, count, self.len)?;
        let mut f = self.file.lock();
        f.seek(SeekFrom::Start(offset))?;
        let mut v = vec![0u8; count as usize];
        f.read_exact(&mut v).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => SourceError::Truncated {
                offset,
                expected: count,
                actual: 0,
            },
            _ => SourceError::Io(e),
        })?;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_is_truncated() {
        let src = MemorySource::new(vec![0u8; 6]);
        match src.read(4, 4) {
            Err(SourceError::Truncated {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            }
            other => panic!("expected truncated, got {:?}", other),
        }
    }

    #[test]
    fn read_past_end_is_out_of_bounds() {
        let src = MemorySource::new(vec![0u8; 6]);
        assert!(matches!(
            src.read(7, 1),
            Err(SourceError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn fourcc_rejects_control_bytes() {
        let src = MemorySource::new(vec![b'm', 0x01, b'o', b'v']);
        assert!(matches!(
            src.read_fourcc(0),
            Err(SourceError::InvalidFourCC(..))
        ));
        let src = MemorySource::new(vec![0xA9, b'n', b'a', b'm']);
        assert_eq!(src.read_fourcc(0).unwrap().0, [0xA9, b'n', b'a', b'm']);
    }
}
