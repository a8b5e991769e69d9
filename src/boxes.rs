use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Range;

#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else {
            None
        }
    }

    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }

    /// Four-character codes may carry Latin-1 bytes such as `©` but never
    /// control characters.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|&c| c >= 0x20 && c != 0x7F)
    }

    /// Strictly printable ASCII, used when a raw 32-bit id is shown as a code.
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|c| (32..=126).contains(c))
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl From<u32> for FourCC {
    fn from(v: u32) -> Self {
        FourCC(v.to_be_bytes())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

/// Decoded box header, positioned in the source.
///
/// `range` covers the whole box and `payload` is `range` minus the header
/// bytes. A box with 32-bit size 0 has already been resolved to its parent's
/// end, so `total_size` is never 0 here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxHeader {
    pub typ: FourCC,
    pub total_size: u64,
    pub header_size: u64, // 8, 16, 24 or 32
    pub payload: Range<u64>,
    pub range: Range<u64>,
    #[serde(serialize_with = "serialize_uuid")]
    pub uuid: Option<[u8; 16]>,
}

impl BoxHeader {
    pub fn start(&self) -> u64 {
        self.range.start
    }

    pub fn end(&self) -> u64 {
        self.range.end
    }

    pub fn payload_len(&self) -> u64 {
        self.payload.end - self.payload.start
    }

    /// Stable node identity: the offset of the box header.
    pub fn node_id(&self) -> NodeId {
        self.range.start
    }

    pub fn key(&self) -> BoxKey {
        match self.uuid {
            Some(u) => BoxKey::Uuid(u),
            None => BoxKey::FourCC(self.typ),
        }
    }

    pub fn is(&self, code: &[u8; 4]) -> bool {
        &self.typ.0 == code
    }
}

/// Box start offset, unique within a source.
pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKey {
    FourCC(FourCC),
    Uuid([u8; 16]),
}

impl fmt::Display for BoxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxKey::FourCC(cc) => write!(f, "{}", cc),
            BoxKey::Uuid(u) => write!(f, "uuid:{}", hex::encode(u)),
        }
    }
}

fn serialize_uuid<S: Serializer>(uuid: &Option<[u8; 16]>, s: S) -> Result<S::Ok, S::Error> {
    match uuid {
        Some(u) => s.serialize_some(&hex::encode(u)),
        None => s.serialize_none(),
    }
}
