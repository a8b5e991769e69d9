use crate::boxes::{BoxHeader, FourCC};
use serde::Serialize;
use std::collections::HashMap;

macro_rules! known_boxes {
    ($($variant:ident => $code:literal, $name:literal;)*) => {
        /// Typed view over common MP4 / ISOBMFF / QuickTime boxes.
        ///
        /// Anything not in this list becomes `KnownBox::Unknown(fourcc)`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum KnownBox {
            $($variant,)*
            Unknown(FourCC),
        }

        impl From<FourCC> for KnownBox {
            fn from(cc: FourCC) -> Self {
                match &cc.0 {
                    $($code => KnownBox::$variant,)*
                    _ => KnownBox::Unknown(cc),
                }
            }
        }

        impl KnownBox {
            pub fn fourcc(&self) -> FourCC {
                match self {
                    $(KnownBox::$variant => FourCC(*$code),)*
                    KnownBox::Unknown(cc) => *cc,
                }
            }

            /// Human-readable box name, `"Unknown Box"` for unlisted codes.
            pub fn full_name(&self) -> &'static str {
                match self {
                    $(KnownBox::$variant => $name,)*
                    KnownBox::Unknown(_) => "Unknown Box",
                }
            }
        }
    };
}

known_boxes! {
    Ftyp => b"ftyp", "File Type Box";
    Styp => b"styp", "Segment Type Box";
    Moov => b"moov", "Movie Box";
    Mdat => b"mdat", "Media Data Box";
    Free => b"free", "Free Space Box";
    Skip => b"skip", "Skip Box";
    Wide => b"wide", "Wide Box";
    Pdin => b"pdin", "Progressive Download Info Box";
    Sidx => b"sidx", "Segment Index Box";
    Ssix => b"ssix", "Subsegment Index Box";
    Prft => b"prft", "Producer Reference Time Box";
    Emsg => b"emsg", "Event Message Box";
    Pssh => b"pssh", "Protection System Specific Header Box";

    Mvhd => b"mvhd", "Movie Header Box";
    Trak => b"trak", "Track Box";
    Udta => b"udta", "User Data Box";
    Tkhd => b"tkhd", "Track Header Box";
    Tref => b"tref", "Track Reference Box";
    Edts => b"edts", "Edit Box";
    Elst => b"elst", "Edit List Box";
    Mdia => b"mdia", "Media Box";
    Mdhd => b"mdhd", "Media Header Box";
    Hdlr => b"hdlr", "Handler Reference Box";
    Minf => b"minf", "Media Information Box";
    Vmhd => b"vmhd", "Video Media Header Box";
    Smhd => b"smhd", "Sound Media Header Box";
    Hmhd => b"hmhd", "Hint Media Header Box";
    Nmhd => b"nmhd", "Null Media Header Box";
    Dinf => b"dinf", "Data Information Box";
    Dref => b"dref", "Data Reference Box";
    Stbl => b"stbl", "Sample Table Box";
    Stsd => b"stsd", "Sample Description Box";
    Stts => b"stts", "Decoding Time to Sample Box";
    Ctts => b"ctts", "Composition Time to Sample Box";
    Cslg => b"cslg", "Composition to Decode Box";
    Stsc => b"stsc", "Sample to Chunk Box";
    Stsz => b"stsz", "Sample Size Box";
    Stz2 => b"stz2", "Compact Sample Size Box";
    Stco => b"stco", "Chunk Offset Box";
    Co64 => b"co64", "Chunk Large Offset Box";
    Stss => b"stss", "Sync Sample Box";
    Stsh => b"stsh", "Shadow Sync Sample Box";
    Sdtp => b"sdtp", "Independent and Disposable Samples Box";
    Sgpd => b"sgpd", "Sample Group Description Box";
    Sbgp => b"sbgp", "Sample to Group Box";
    Subs => b"subs", "Sub-Sample Information Box";
    Saiz => b"saiz", "Sample Auxiliary Information Sizes Box";
    Saio => b"saio", "Sample Auxiliary Information Offsets Box";
    Strk => b"strk", "Sub Track Box";
    Strd => b"strd", "Sub Track Definition Box";

    Mvex => b"mvex", "Movie Extends Box";
    Mehd => b"mehd", "Movie Extends Header Box";
    Trex => b"trex", "Track Extends Box";
    Moof => b"moof", "Movie Fragment Box";
    Mfhd => b"mfhd", "Movie Fragment Header Box";
    Traf => b"traf", "Track Fragment Box";
    Tfhd => b"tfhd", "Track Fragment Header Box";
    Tfdt => b"tfdt", "Track Fragment Decode Time Box";
    Trun => b"trun", "Track Run Box";
    Mfra => b"mfra", "Movie Fragment Random Access Box";
    Tfra => b"tfra", "Track Fragment Random Access Box";
    Mfro => b"mfro", "Movie Fragment Random Access Offset Box";

    Meta => b"meta", "Meta Box";
    Keys => b"keys", "Metadata Item Keys Box";
    Ilst => b"ilst", "Metadata Item List Box";
    Data => b"data", "Metadata Value Box";
    Iloc => b"iloc", "Item Location Box";
    Iinf => b"iinf", "Item Information Box";
    Infe => b"infe", "Item Information Entry";
    Iref => b"iref", "Item Reference Box";
    Pitm => b"pitm", "Primary Item Box";
    Iprp => b"iprp", "Item Properties Box";
    Ipco => b"ipco", "Item Property Container Box";
    Ipma => b"ipma", "Item Property Association Box";
    Ipro => b"ipro", "Item Protection Box";
    Meco => b"meco", "Additional Metadata Container Box";
    Mere => b"mere", "Metabox Relation Box";

    Sinf => b"sinf", "Protection Scheme Information Box";
    Frma => b"frma", "Original Format Box";
    Schm => b"schm", "Scheme Type Box";
    Schi => b"schi", "Scheme Information Box";
    Tenc => b"tenc", "Track Encryption Box";
    Senc => b"senc", "Sample Encryption Box";

    Avc1 => b"avc1", "AVC Sample Entry";
    Avc3 => b"avc3", "AVC Sample Entry (in-band parameters)";
    Hvc1 => b"hvc1", "HEVC Sample Entry";
    Hev1 => b"hev1", "HEVC Sample Entry (in-band parameters)";
    Av01 => b"av01", "AV1 Sample Entry";
    Vp09 => b"vp09", "VP9 Sample Entry";
    Mp4a => b"mp4a", "MPEG-4 Audio Sample Entry";
    Opus => b"Opus", "Opus Sample Entry";
    Avcc => b"avcC", "AVC Configuration Box";
    Hvcc => b"hvcC", "HEVC Configuration Box";
    Esds => b"esds", "Elementary Stream Descriptor Box";
    Pasp => b"pasp", "Pixel Aspect Ratio Box";
    Colr => b"colr", "Colour Information Box";
    Btrt => b"btrt", "Bit Rate Box";

    Uuid => b"uuid", "User Extension Box";
}

impl KnownBox {
    /// Boxes whose payload is a plain sequence of child boxes.
    ///
    /// `stsd` is absent because its entries follow a version/flags word and an
    /// entry count. `ilst` is absent because item ids may be key-table
    /// indices rather than codes; its decoder reads the items itself.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            KnownBox::Moov
                | KnownBox::Trak
                | KnownBox::Mdia
                | KnownBox::Minf
                | KnownBox::Dinf
                | KnownBox::Stbl
                | KnownBox::Edts
                | KnownBox::Mvex
                | KnownBox::Moof
                | KnownBox::Traf
                | KnownBox::Mfra
                | KnownBox::Tref
                | KnownBox::Udta
                | KnownBox::Strk
                | KnownBox::Strd
                | KnownBox::Sinf
                | KnownBox::Schi
                | KnownBox::Meta
        )
    }

    /// Is this a FullBox (version + flags)?
    pub fn is_full_box(&self) -> bool {
        matches!(
            self,
            KnownBox::Mvhd
                | KnownBox::Tkhd
                | KnownBox::Mdhd
                | KnownBox::Hdlr
                | KnownBox::Vmhd
                | KnownBox::Smhd
                | KnownBox::Nmhd
                | KnownBox::Dref
                | KnownBox::Stsd
                | KnownBox::Stts
                | KnownBox::Ctts
                | KnownBox::Cslg
                | KnownBox::Stsc
                | KnownBox::Stsz
                | KnownBox::Stz2
                | KnownBox::Stco
                | KnownBox::Co64
                | KnownBox::Stss
                | KnownBox::Stsh
                | KnownBox::Sdtp
                | KnownBox::Sgpd
                | KnownBox::Sbgp
                | KnownBox::Subs
                | KnownBox::Saiz
                | KnownBox::Saio
                | KnownBox::Elst
                | KnownBox::Sidx
                | KnownBox::Mehd
                | KnownBox::Trex
                | KnownBox::Mfhd
                | KnownBox::Tfhd
                | KnownBox::Tfdt
                | KnownBox::Trun
                | KnownBox::Tfra
                | KnownBox::Mfro
                | KnownBox::Meta
                | KnownBox::Keys
                | KnownBox::Iloc
                | KnownBox::Iinf
                | KnownBox::Infe
                | KnownBox::Iref
                | KnownBox::Pitm
                | KnownBox::Ipma
                | KnownBox::Pssh
                | KnownBox::Schm
                | KnownBox::Tenc
                | KnownBox::Senc
                | KnownBox::Esds
        )
    }
}

/// Catalog entry attached to enter/exit events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxDescriptor {
    pub name: String,
    pub is_container: bool,
    pub is_full_box: bool,
}

impl From<KnownBox> for BoxDescriptor {
    fn from(kb: KnownBox) -> Self {
        BoxDescriptor {
            name: kb.full_name().to_string(),
            is_container: kb.is_container(),
            is_full_box: kb.is_full_box(),
        }
    }
}

/// Box-type metadata lookup.
pub trait Catalog: Send + Sync {
    fn descriptor(&self, header: &BoxHeader) -> Option<BoxDescriptor>;
}

/// The built-in catalog, optionally extended with vendor `uuid` boxes.
#[derive(Debug, Clone, Default)]
pub struct KnownBoxCatalog {
    extended: HashMap<[u8; 16], BoxDescriptor>,
}

impl KnownBoxCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uuid(mut self, uuid: [u8; 16], name: &str, is_container: bool) -> Self {
        self.extended.insert(
            uuid,
            BoxDescriptor {
                name: name.to_string(),
                is_container,
                is_full_box: false,
            },
        );
        self
    }
}

impl Catalog for KnownBoxCatalog {
    fn descriptor(&self, header: &BoxHeader) -> Option<BoxDescriptor> {
        if let Some(d) = header.uuid.as_ref().and_then(|u| self.extended.get(u)) {
            return Some(d.clone());
        }
        match KnownBox::from(header.typ) {
            KnownBox::Unknown(_) => None,
            kb => Some(kb.into()),
        }
    }
}
