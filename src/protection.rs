// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Item protection boxes.
//!
//! See ISO 14496-12:2015 § 8.11.5 and § 8.12

use crate::bitstream::BitStreamWriter;
use crate::bmff::{
    check_parser_state, read_children, write_box, write_children, BMFFBox, BoxBody, BoxCodec, FullBoxHeader, IsoBox,
    SizeField,
};
use crate::{BoxType, Error, FourCC, Result, TryString, TryVec};

/// `frma`: the format of the content before protection was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalFormatBox {
    pub data_format: FourCC,
}

impl BoxCodec for OriginalFormatBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(Self { data_format: src.read_fourcc()? })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        w.write_fourcc(self.data_format)
    }
}

/// `schm`: which protection scheme applies.
#[derive(Debug, PartialEq)]
pub struct SchemeTypeBox {
    pub version: u8,
    /// Bit 0 signals a scheme URI.
    pub flags: u32,
    pub scheme_type: FourCC,
    pub scheme_version: u32,
    pub scheme_uri: Option<TryString>,
}

impl SchemeTypeBox {
    #[must_use]
    pub fn new(scheme_type: FourCC, scheme_version: u32) -> Self {
        Self { version: 0, flags: 0, scheme_type, scheme_version, scheme_uri: None }
    }
}

impl BoxCodec for SchemeTypeBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let scheme_type = src.read_fourcc()?;
        let scheme_version = src.read_u32()?;
        let scheme_uri = if flags & 1 == 1 {
            let uri = src.read_cstring()?;
            let mut s = TryVec::with_capacity(uri.len())?;
            s.extend_from_slice(uri)?;
            Some(s)
        } else {
            None
        };
        Ok(Self { version, flags, scheme_type, scheme_version, scheme_uri })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        if (self.flags & 1 == 1) != self.scheme_uri.is_some() {
            return Err(Error::InvalidArgument("schm flags disagree with scheme URI presence"));
        }
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        w.write_fourcc(self.scheme_type)?;
        w.write_u32(self.scheme_version)?;
        if let Some(uri) = &self.scheme_uri {
            w.write_cstring(uri)?;
        }
        Ok(())
    }
}

/// `schi`: scheme-specific boxes, interpreted by the scheme's consumer.
#[derive(Debug, PartialEq, Default)]
pub struct SchemeInformationBox {
    pub children: TryVec<IsoBox>,
}

impl BoxCodec for SchemeInformationBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(Self { children: read_children(src)? })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        write_children(w, &self.children)
    }
}

/// `sinf`: one protection scheme description.
#[derive(Debug, PartialEq, Default)]
pub struct ProtectionSchemeInfoBox {
    pub children: TryVec<IsoBox>,
}

impl ProtectionSchemeInfoBox {
    /// A description holding the scheme type, and the original format when
    /// given.
    pub fn new(scheme: SchemeTypeBox, original_format: Option<FourCC>) -> Result<Self> {
        let mut children = TryVec::new();
        if let Some(data_format) = original_format {
            children.push(IsoBox::new(BoxBody::OriginalFormat(OriginalFormatBox { data_format }))?)?;
        }
        children.push(IsoBox::new(BoxBody::SchemeType(scheme))?)?;
        Ok(Self { children })
    }

    pub fn original_format(&self) -> Option<FourCC> {
        self.children.iter().find_map(|b| match &b.body {
            BoxBody::OriginalFormat(f) => Some(f.data_format),
            _ => None,
        })
    }

    pub fn scheme_type(&self) -> Option<&SchemeTypeBox> {
        self.children.iter().find_map(|b| match &b.body {
            BoxBody::SchemeType(s) => Some(s),
            _ => None,
        })
    }

    pub fn scheme_information(&self) -> Option<&SchemeInformationBox> {
        self.children.iter().find_map(|b| match &b.body {
            BoxBody::SchemeInformation(s) => Some(s),
            _ => None,
        })
    }
}

impl BoxCodec for ProtectionSchemeInfoBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(Self { children: read_children(src)? })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        write_children(w, &self.children)
    }
}

/// `ipro`: the protection schemes items point into.
///
/// Entries are addressed 0-based here; an item's protection index is
/// 1-based so that 0 can mean "unprotected".
#[derive(Debug, PartialEq, Default)]
pub struct ItemProtectionBox {
    pub version: u8,
    pub flags: u32,
    entries: TryVec<ProtectionSchemeInfoBox>,
    /// Header encoding of each `sinf`, parallel to `entries`.
    size_fields: TryVec<SizeField>,
}

impl ItemProtectionBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scheme, returning its 0-based index.
    pub fn add_entry(&mut self, scheme: ProtectionSchemeInfoBox) -> Result<u16> {
        let index = u16::try_from(self.entries.len())
            .ok()
            .filter(|&i| i < u16::MAX)
            .ok_or(Error::Overflow("ipro entry count exceeds 16 bits"))?;
        self.entries.push(scheme)?;
        self.size_fields.push(SizeField::Compact)?;
        Ok(index)
    }

    pub fn get_entry(&self, index: usize) -> Result<&ProtectionSchemeInfoBox> {
        self.entries.get(index).ok_or(Error::IndexOutOfRange { index, count: self.entries.len() })
    }

    #[must_use]
    pub fn protection_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProtectionSchemeInfoBox> {
        self.entries.iter()
    }

    pub(crate) fn into_entries(self) -> TryVec<ProtectionSchemeInfoBox> {
        self.entries
    }
}

impl BoxCodec for ItemProtectionBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let count = src.read_u16()?;
        let capacity = crate::bmff::bounded_count(count, src, 8)?;
        let mut entries = TryVec::with_capacity(capacity)?;
        let mut size_fields = TryVec::with_capacity(capacity)?;
        let mut iter = src.box_iter();
        for _ in 0..count {
            let mut b = iter.next_box()?.ok_or(Error::InvalidData("ipro holds fewer entries than its count"))?;
            if b.head.name != BoxType::ProtectionSchemeInfoBox {
                return Err(Error::InvalidData("ipro box should contain only sinf boxes"));
            }
            let entry = ProtectionSchemeInfoBox::read_body(&mut b)
                .and_then(|e| check_parser_state(&b).map(|()| e))
                .map_err(|e| e.in_box(b.head.fourcc(), b.head.start))?;
            entries.push(entry)?;
            size_fields.push(b.head.size_field)?;
        }
        Ok(Self { version, flags, entries, size_fields })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        let count = u16::try_from(self.entries.len()).map_err(|_| Error::Overflow("ipro entry count exceeds 16 bits"))?;
        w.write_u16(count)?;
        for (i, entry) in self.entries.iter().enumerate() {
            let size_field = self.size_fields.get(i).copied().unwrap_or_default();
            let start = w.position();
            write_box(w, start, BoxType::ProtectionSchemeInfoBox.into(), size_field, None, |w| entry.write_body(w))?;
        }
        Ok(())
    }
}

#[cfg(test)]
fn scheme(tag: &[u8; 4]) -> ProtectionSchemeInfoBox {
    ProtectionSchemeInfoBox::new(SchemeTypeBox::new(FourCC::from(tag), 0x0001_0000), Some(FourCC::HVC1)).unwrap()
}

#[test]
fn add_entry_returns_sequential_indices() {
    let mut ipro = ItemProtectionBox::new();
    assert_eq!(ipro.add_entry(scheme(b"cenc")).unwrap(), 0);
    assert_eq!(ipro.add_entry(scheme(b"cbcs")).unwrap(), 1);
    assert_eq!(ipro.protection_count(), 2);
    assert_eq!(ipro.get_entry(1).unwrap().scheme_type().unwrap().scheme_type, b"cbcs");
    assert_eq!(ipro.get_entry(0).unwrap().original_format(), Some(FourCC::HVC1));
    assert!(matches!(ipro.get_entry(2), Err(Error::IndexOutOfRange { index: 2, count: 2 })));
}

#[test]
fn add_entry_overflows_at_u16_max() {
    let mut ipro = ItemProtectionBox::new();
    for _ in 0..u16::MAX {
        ipro.add_entry(ProtectionSchemeInfoBox::default()).unwrap();
    }
    assert_eq!(ipro.protection_count(), usize::from(u16::MAX));
    assert!(matches!(ipro.add_entry(ProtectionSchemeInfoBox::default()), Err(Error::Overflow(_))));

    let bytes = crate::write_boxes(&[IsoBox::new(BoxBody::ItemProtection(ipro)).unwrap()]).unwrap();
    assert_eq!(bytes.len(), 14 + 8 * usize::from(u16::MAX));
    assert_eq!(&bytes[12..14], &[0xff, 0xff]);
    let boxes = crate::read_boxes(&bytes).unwrap();
    let BoxBody::ItemProtection(reread) = &boxes[0].body else { panic!("not ipro") };
    assert_eq!(reread.protection_count(), usize::from(u16::MAX));
    assert_eq!(crate::write_boxes(&boxes).unwrap(), bytes);
}

#[test]
fn ipro_round_trip() {
    let mut ipro = ItemProtectionBox::new();
    ipro.add_entry(scheme(b"cenc")).unwrap();
    let mut with_uri = SchemeTypeBox::new(FourCC::from(b"abcd"), 1);
    with_uri.flags = 1;
    let mut uri = TryVec::new();
    uri.extend_from_slice(b"urn:x").unwrap();
    with_uri.scheme_uri = Some(uri);
    ipro.add_entry(ProtectionSchemeInfoBox::new(with_uri, None).unwrap()).unwrap();

    let bytes = crate::write_boxes(&[IsoBox::new(BoxBody::ItemProtection(ipro)).unwrap()]).unwrap();
    let boxes = crate::read_boxes(&bytes).unwrap();
    assert_eq!(crate::write_boxes(&boxes).unwrap(), bytes);
    let BoxBody::ItemProtection(reread) = &boxes[0].body else { panic!("not ipro") };
    assert_eq!(reread.protection_count(), 2);
    let schm = reread.get_entry(1).unwrap().scheme_type().unwrap();
    assert_eq!(schm.scheme_uri.as_deref(), Some(&b"urn:x"[..]));
}

#[test]
fn ipro_count_larger_than_entries_is_rejected() {
    let data = b"\0\0\0\x0eipro\0\0\0\0\0\x01";
    let err = crate::read_boxes(data).unwrap_err();
    assert!(matches!(err.root_cause(), Error::InvalidData(_)));
}

#[test]
fn empty_ipro_round_trip() {
    let data = b"\0\0\0\x0eipro\0\0\0\0\0\0";
    let boxes = crate::read_boxes(data).unwrap();
    let BoxBody::ItemProtection(ipro) = &boxes[0].body else { panic!("not ipro") };
    assert_eq!(ipro.protection_count(), 0);
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
}

#[test]
fn schi_keeps_scheme_specific_children() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 61, b'i', b'p', b'r', b'o', 0, 0, 0, 0, 0, 1,
        0, 0, 0, 47, b's', b'i', b'n', b'f',
        0, 0, 0, 20, b's', b'c', b'h', b'm', 0, 0, 0, 0, b'c', b'e', b'n', b'c', 0, 1, 0, 0,
        0, 0, 0, 19, b's', b'c', b'h', b'i',
        0, 0, 0, 11, b'z', b'z', b'z', b'z', 7, 8, 9,
    ];
    let boxes = crate::read_boxes(&data).unwrap();
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
    let BoxBody::ItemProtection(ipro) = &boxes[0].body else { panic!("not ipro") };
    let schi = ipro.get_entry(0).unwrap().scheme_information().unwrap();
    assert_eq!(schi.children.len(), 1);
    assert_eq!(schi.children[0].fourcc(), b"zzzz");
    assert!(matches!(&schi.children[0].body, BoxBody::Unknown(p) if &p[..] == &[7, 8, 9]));
}

#[test]
fn ipro_keeps_large_entry_headers() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 50, b'i', b'p', b'r', b'o', 0, 0, 0, 0, 0, 1,
        0, 0, 0, 1, b's', b'i', b'n', b'f', 0, 0, 0, 0, 0, 0, 0, 36,
        0, 0, 0, 20, b's', b'c', b'h', b'm', 0, 0, 0, 0, b'c', b'b', b'c', b's', 0, 1, 0, 0,
    ];
    let boxes = crate::read_boxes(&data).unwrap();
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
    let BoxBody::ItemProtection(ipro) = &boxes[0].body else { panic!("not ipro") };
    assert_eq!(ipro.get_entry(0).unwrap().scheme_type().unwrap().scheme_type, b"cbcs");
}
