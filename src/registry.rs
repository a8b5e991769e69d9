use crate::boxes::{BoxHeader, BoxKey, FourCC};
use crate::coordinators::edit_list::EditListEnv;
use crate::coordinators::fragment::FragmentEnv;
use crate::coordinators::metadata::MetadataEnv;
use crate::coordinators::random_access::RandomAccessEnv;
use crate::decoders::{fragments, metadata, movie, random_access, sample_tables};
use crate::payload::ParsedPayload;
use crate::source::ByteSource;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Cross-box state a decoder may need, built by the coordinators for the box
/// being decoded. Each part is `None` unless its coordinator serves this box.
#[derive(Debug, Clone, Default)]
pub struct DecoderEnv<'a> {
    pub edit_list: Option<EditListEnv>,
    pub metadata: Option<MetadataEnv>,
    pub fragment: Option<FragmentEnv>,
    pub random_access: Option<RandomAccessEnv<'a>>,
}

/// Trait for box payload decoders.
///
/// A decoder interprets the payload of one box type (identified by a
/// [`BoxKey`]). Plain functions with the matching signature implement it.
pub trait BoxDecoder: Send + Sync {
    fn decode(
        &self,
        hdr: &BoxHeader,
        src: &dyn ByteSource,
        env: &DecoderEnv<'_>,
    ) -> anyhow::Result<ParsedPayload>;
}

impl<F> BoxDecoder for F
where
    F: Fn(&BoxHeader, &dyn ByteSource, &DecoderEnv<'_>) -> anyhow::Result<ParsedPayload>
        + Send
        + Sync,
{
    fn decode(
        &self,
        hdr: &BoxHeader,
        src: &dyn ByteSource,
        env: &DecoderEnv<'_>,
    ) -> anyhow::Result<ParsedPayload> {
        self(hdr, src, env)
    }
}

/// Registry of decoders keyed by `BoxKey` (4CC or UUID).
///
/// The registry is immutable once constructed; use [`Registry::with_decoder`]
/// to build it fluently.
pub struct Registry {
    map: HashMap<BoxKey, BoxDecoderEntry>,
}

struct BoxDecoderEntry {
    inner: Box<dyn BoxDecoder>,
    name: String,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and used only for logging.
    pub fn with_decoder(mut self, key: BoxKey, name: &str, dec: Box<dyn BoxDecoder>) -> Self {
        self.map.insert(
            key,
            BoxDecoderEntry {
                inner: dec,
                name: name.to_string(),
            },
        );
        self
    }

    pub fn contains(&self, key: &BoxKey) -> bool {
        self.map.contains_key(key)
    }

    fn lookup(&self, hdr: &BoxHeader) -> Option<&BoxDecoderEntry> {
        if let Some(u) = hdr.uuid {
            if let Some(e) = self.map.get(&BoxKey::Uuid(u)) {
                return Some(e);
            }
        }
        self.map.get(&BoxKey::FourCC(hdr.typ))
    }

    /// Decode a box payload with the registered decoder.
    ///
    /// Extended-type registrations win over the plain four-character code.
    /// Returns `None` if nothing is registered for the box.
    pub fn decode(
        &self,
        hdr: &BoxHeader,
        src: &dyn ByteSource,
        env: &DecoderEnv<'_>,
    ) -> Option<anyhow::Result<ParsedPayload>> {
        self.lookup(hdr).map(|d| {
            tracing::trace!(decoder = %d.name, offset = hdr.start(), "decoding payload");
            d.inner.decode(hdr, src, env)
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn cc(s: &[u8; 4]) -> BoxKey {
    BoxKey::FourCC(FourCC(*s))
}

/// Registry with every built-in decoder.
pub fn default_registry() -> Registry {
    Registry::new()
        .with_decoder(cc(b"ftyp"), "ftyp", Box::new(movie::decode_ftyp))
        .with_decoder(cc(b"styp"), "styp", Box::new(movie::decode_ftyp))
        .with_decoder(cc(b"mdat"), "mdat", Box::new(movie::decode_mdat))
        .with_decoder(cc(b"free"), "free", Box::new(movie::decode_padding))
        .with_decoder(cc(b"skip"), "skip", Box::new(movie::decode_padding))
        .with_decoder(cc(b"mvhd"), "mvhd", Box::new(movie::decode_mvhd))
        .with_decoder(cc(b"tkhd"), "tkhd", Box::new(movie::decode_tkhd))
        .with_decoder(cc(b"mdhd"), "mdhd", Box::new(movie::decode_mdhd))
        .with_decoder(cc(b"hdlr"), "hdlr", Box::new(movie::decode_hdlr))
        .with_decoder(cc(b"elst"), "elst", Box::new(movie::decode_elst))
        .with_decoder(cc(b"stts"), "stts", Box::new(sample_tables::decode_stts))
        .with_decoder(cc(b"ctts"), "ctts", Box::new(sample_tables::decode_ctts))
        .with_decoder(cc(b"stsc"), "stsc", Box::new(sample_tables::decode_stsc))
        .with_decoder(cc(b"stsz"), "stsz", Box::new(sample_tables::decode_stsz))
        .with_decoder(cc(b"stco"), "stco", Box::new(sample_tables::decode_stco))
        .with_decoder(cc(b"co64"), "co64", Box::new(sample_tables::decode_co64))
        .with_decoder(cc(b"stss"), "stss", Box::new(sample_tables::decode_stss))
        .with_decoder(cc(b"mvex"), "mvex", Box::new(fragments::decode_empty))
        .with_decoder(cc(b"mehd"), "mehd", Box::new(fragments::decode_mehd))
        .with_decoder(cc(b"trex"), "trex", Box::new(fragments::decode_trex))
        .with_decoder(cc(b"moof"), "moof", Box::new(fragments::decode_empty))
        .with_decoder(cc(b"mfhd"), "mfhd", Box::new(fragments::decode_mfhd))
        .with_decoder(cc(b"traf"), "traf", Box::new(fragments::decode_empty))
        .with_decoder(cc(b"tfhd"), "tfhd", Box::new(fragments::decode_tfhd))
        .with_decoder(cc(b"tfdt"), "tfdt", Box::new(fragments::decode_tfdt))
        .with_decoder(cc(b"trun"), "trun", Box::new(fragments::decode_trun))
        .with_decoder(cc(b"mfra"), "mfra", Box::new(fragments::decode_empty))
        .with_decoder(cc(b"tfra"), "tfra", Box::new(random_access::decode_tfra))
        .with_decoder(cc(b"mfro"), "mfro", Box::new(random_access::decode_mfro))
        .with_decoder(cc(b"meta"), "meta", Box::new(metadata::decode_meta))
        .with_decoder(cc(b"keys"), "keys", Box::new(metadata::decode_keys))
        .with_decoder(cc(b"ilst"), "ilst", Box::new(metadata::decode_ilst))
}

/// Process-wide default registry, built on first use.
pub fn shared_registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(default_registry)
}
