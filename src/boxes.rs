// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

macro_rules! box_database {
    ($($(#[$attr:meta])* $boxenum:ident $boxtype:expr),*,) => {
        /// Box types this crate knows by name.
        ///
        /// Anything else maps to `UnknownBox` and is carried through a
        /// read/write cycle as opaque bytes.
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub enum BoxType {
            $($(#[$attr])* $boxenum),*,
            UnknownBox(u32),
        }

        impl From<u32> for BoxType {
            fn from(t: u32) -> BoxType {
                use self::BoxType::*;
                match t {
                    $($(#[$attr])* $boxtype => $boxenum),*,
                    _ => UnknownBox(t),
                }
            }
        }

        impl From<BoxType> for u32 {
            fn from(b: BoxType) -> u32 {
                use self::BoxType::*;
                match b {
                    $($(#[$attr])* $boxenum => $boxtype),*,
                    UnknownBox(t) => t,
                }
            }
        }
    }
}

impl fmt::Debug for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fourcc: FourCC = From::from(*self);
        fourcc.fmt(f)
    }
}

#[derive(Default, PartialEq, Eq, Clone, Copy, Hash)]
pub struct FourCC {
    pub value: [u8; 4],
}

impl fallible_collections::TryClone for FourCC {
    fn try_clone(&self) -> Result<Self, fallible_collections::TryReserveError> {
        Ok(*self)
    }
}

impl FourCC {
    pub const fn new(value: &[u8; 4]) -> Self {
        Self { value: *value }
    }

    /// Parse a four-character code from a string of exactly four bytes.
    pub fn from_str_exact(s: &str) -> Option<Self> {
        let value: [u8; 4] = s.as_bytes().try_into().ok()?;
        Some(Self { value })
    }

    // Item types
    pub const GRID: FourCC = FourCC::new(b"grid");
    pub const IOVL: FourCC = FourCC::new(b"iovl");
    pub const IDEN: FourCC = FourCC::new(b"iden");
    pub const HVC1: FourCC = FourCC::new(b"hvc1");
    pub const AVC1: FourCC = FourCC::new(b"avc1");
    pub const AV01: FourCC = FourCC::new(b"av01");
    pub const JPEG: FourCC = FourCC::new(b"jpeg");
    pub const EXIF: FourCC = FourCC::new(b"Exif");
    pub const MIME: FourCC = FourCC::new(b"mime");
    pub const URI: FourCC = FourCC::new(b"uri ");

    // Reference types
    pub const DIMG: FourCC = FourCC::new(b"dimg");
    pub const THMB: FourCC = FourCC::new(b"thmb");
    pub const CDSC: FourCC = FourCC::new(b"cdsc");
    pub const AUXL: FourCC = FourCC::new(b"auxl");

    // Handler types
    pub const PICT: FourCC = FourCC::new(b"pict");
    pub const VIDE: FourCC = FourCC::new(b"vide");

    /// Item types whose payload is a coded image.
    pub fn is_coded_image_type(self) -> bool {
        matches!(self, Self::HVC1 | Self::AVC1 | Self::AV01 | Self::JPEG)
    }

    /// Item types whose payload is computed from other images.
    pub fn is_derived_image_type(self) -> bool {
        matches!(self, Self::GRID | Self::IOVL | Self::IDEN)
    }
}

impl From<u32> for FourCC {
    fn from(number: u32) -> Self {
        Self {
            value: number.to_be_bytes(),
        }
    }
}

impl From<FourCC> for u32 {
    fn from(fourcc: FourCC) -> Self {
        u32::from_be_bytes(fourcc.value)
    }
}

impl From<BoxType> for FourCC {
    fn from(t: BoxType) -> Self {
        let box_num: u32 = Into::into(t);
        From::from(box_num)
    }
}

impl From<FourCC> for BoxType {
    fn from(fourcc: FourCC) -> Self {
        BoxType::from(u32::from(fourcc))
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(v: [u8; 4]) -> Self {
        Self { value: v }
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(v: &[u8; 4]) -> Self {
        Self { value: *v }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{self}'")
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.value {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        self.value.eq(*other)
    }
}

box_database!(
    FileTypeBox                       0x6674_7970, // "ftyp"
    MetadataBox                       0x6d65_7461, // "meta"
    HandlerBox                        0x6864_6c72, // "hdlr"
    PrimaryItemBox                    0x7069_746d, // "pitm"
    ItemInfoBox                       0x6969_6e66, // "iinf"
    ItemInfoEntry                     0x696e_6665, // "infe"
    ItemReferenceBox                  0x6972_6566, // "iref"
    ItemLocationBox                   0x696c_6f63, // "iloc"
    ItemDataBox                       0x6964_6174, // "idat"
    ItemPropertiesBox                 0x6970_7270, // "iprp"
    ItemPropertyContainerBox          0x6970_636f, // "ipco"
    ItemPropertyAssociationBox        0x6970_6d61, // "ipma"
    ImageSpatialExtentsBox            0x6973_7065, // "ispe"
    HevcConfigurationBox              0x6876_6343, // "hvcC"
    AvcConfigurationBox               0x6176_6343, // "avcC"
    Av1ConfigurationBox               0x6176_3143, // "av1C"
    JpegConfigurationBox              0x6a70_6743, // "jpgC"
    ItemProtectionBox                 0x6970_726f, // "ipro"
    ProtectionSchemeInfoBox           0x7369_6e66, // "sinf"
    OriginalFormatBox                 0x6672_6d61, // "frma"
    SchemeTypeBox                     0x7363_686d, // "schm"
    SchemeInformationBox              0x7363_6869, // "schi"
    MovieBox                          0x6d6f_6f76, // "moov"
    MovieHeaderBox                    0x6d76_6864, // "mvhd"
    TrackBox                          0x7472_616b, // "trak"
    TrackHeaderBox                    0x746b_6864, // "tkhd"
    EditBox                           0x6564_7473, // "edts"
    MediaBox                          0x6d64_6961, // "mdia"
    MediaHeaderBox                    0x6d64_6864, // "mdhd"
    MediaInformationBox               0x6d69_6e66, // "minf"
    DataInformationBox                0x6469_6e66, // "dinf"
    SampleTableBox                    0x7374_626c, // "stbl"
    SampleDescriptionBox              0x7374_7364, // "stsd"
    TimeToSampleBox                   0x7374_7473, // "stts"
    SampleToChunkBox                  0x7374_7363, // "stsc"
    SampleSizeBox                     0x7374_737a, // "stsz"
    ChunkOffsetBox                    0x7374_636f, // "stco"
    ChunkLargeOffsetBox               0x636f_3634, // "co64"
    MediaDataBox                      0x6d64_6174, // "mdat"
    FreeSpaceBox                      0x6672_6565, // "free"
    SkipBox                           0x736b_6970, // "skip"
    UuidBox                           0x7575_6964, // "uuid"
);

#[test]
fn box_type_round_trips_through_fourcc() {
    let fourcc = FourCC::from(BoxType::ItemLocationBox);
    assert_eq!(fourcc, b"iloc");
    assert_eq!(BoxType::from(fourcc), BoxType::ItemLocationBox);
    assert_eq!(BoxType::from(0x7878_7878), BoxType::UnknownBox(0x7878_7878));
    assert_eq!(FourCC::from(BoxType::UnknownBox(0x7878_7878)), b"xxxx");
}

#[test]
fn fourcc_display_escapes_binary() {
    assert_eq!(FourCC::new(b"uri ").to_string(), "uri ");
    assert_eq!(FourCC::from(0x6869_0001).to_string(), "hi\\x00\\x01");
    assert_eq!(FourCC::from_str_exact("grid"), Some(FourCC::GRID));
    assert_eq!(FourCC::from_str_exact("master"), None);
}
