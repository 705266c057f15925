// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::bitstream::BitStreamWriter;
use crate::bmff::{bounded_count, check_parser_state, read_children, write_children, BMFFBox, BoxBody, BoxCodec};
use crate::bmff::{write_box, FullBoxHeader, IsoBox, SizeField};
use crate::protection::ItemProtectionBox;
use crate::{BoxType, Error, FourCC, Result, ToU64 as _, ToUsize as _, TryString, TryVec};
use log::debug;
use std::ops::{Range, RangeFrom};

/// Parse an ftyp box.
/// See ISO 14496-12:2015 § 4.3
#[derive(Debug, PartialEq)]
pub struct FileTypeBox {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: TryVec<FourCC>,
}

impl FileTypeBox {
    /// Whether `brand` is the major brand or one of the compatible ones.
    pub fn has_brand(&self, brand: FourCC) -> bool {
        self.major_brand == brand || self.compatible_brands.iter().any(|b| *b == brand)
    }
}

impl BoxCodec for FileTypeBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let major = src.read_fourcc()?;
        let minor = src.read_u32()?;
        let bytes_left = src.remaining();
        if bytes_left % 4 != 0 {
            return Err(Error::InvalidData("invalid ftyp size"));
        }
        // Is a brand_count of zero valid?
        let brand_count = bytes_left / 4;
        let mut brands = TryVec::with_capacity(brand_count)?;
        for _ in 0..brand_count {
            brands.push(src.read_fourcc()?)?;
        }
        Ok(Self {
            major_brand: major,
            minor_version: minor,
            compatible_brands: brands,
        })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        w.write_fourcc(self.major_brand)?;
        w.write_u32(self.minor_version)?;
        for brand in self.compatible_brands.iter() {
            w.write_fourcc(*brand)?;
        }
        Ok(())
    }
}

/// The `meta` box: an ordered list of child boxes, at most one of each
/// item-level kind.
///
/// See ISO 14496-12:2015 § 8.11.1
#[derive(Debug, PartialEq, Default)]
pub struct MetaBox {
    pub version: u8,
    pub flags: u32,
    pub children: TryVec<IsoBox>,
}

const META_SINGLETONS: [BoxType; 8] = [
    BoxType::HandlerBox,
    BoxType::PrimaryItemBox,
    BoxType::ItemInfoBox,
    BoxType::ItemReferenceBox,
    BoxType::ItemLocationBox,
    BoxType::ItemDataBox,
    BoxType::ItemPropertiesBox,
    BoxType::ItemProtectionBox,
];

macro_rules! meta_child {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&self) -> Option<&$ty> {
            self.children.iter().find_map(|b| match &b.body {
                BoxBody::$variant(inner) => Some(inner),
                _ => None,
            })
        }
    };
}

impl MetaBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a child box.
    pub fn push(&mut self, child: IsoBox) -> Result<()> {
        if META_SINGLETONS.contains(&child.header.name) && self.children.iter().any(|c| c.header.name == child.header.name) {
            return Err(Error::InvalidArgument("meta already holds a box of this type"));
        }
        self.children.push(child)?;
        Ok(())
    }

    meta_child!(handler, Handler, HandlerBox);
    meta_child!(primary_item, PrimaryItem, PrimaryItemBox);
    meta_child!(item_info, ItemInfo, ItemInfoBox);
    meta_child!(item_references, ItemReference, ItemReferenceBox);
    meta_child!(item_location, ItemLocation, ItemLocationBox);
    meta_child!(item_data, ItemData, ItemDataBox);
    meta_child!(item_properties, ItemProperties, ItemPropertiesBox);
    meta_child!(item_protection, ItemProtection, ItemProtectionBox);
}

impl BoxCodec for MetaBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let children = read_children(src)?;
        for (i, child) in children.iter().enumerate() {
            if META_SINGLETONS.contains(&child.header.name)
                && children[..i].iter().any(|c| c.header.name == child.header.name)
            {
                return Err(Error::InvalidData("duplicate item-level box in 'meta'"));
            }
        }
        Ok(Self { version, flags, children })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        write_children(w, &self.children)
    }
}

/// See ISO 14496-12:2015 § 8.4.3
#[derive(Debug, PartialEq)]
pub struct HandlerBox {
    pub version: u8,
    pub flags: u32,
    pub pre_defined: u32,
    pub handler_type: FourCC,
    pub reserved: [u32; 3],
    /// Name bytes as stored, terminator included when present.
    pub name: TryString,
}

impl HandlerBox {
    pub fn new(handler_type: FourCC) -> Result<Self> {
        let mut name = TryVec::new();
        name.push(0)?;
        Ok(Self {
            version: 0,
            flags: 0,
            pre_defined: 0,
            handler_type,
            reserved: [0; 3],
            name,
        })
    }
}

impl BoxCodec for HandlerBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let pre_defined = src.read_u32()?;
        let handler_type = src.read_fourcc()?;
        let reserved = [src.read_u32()?, src.read_u32()?, src.read_u32()?];
        let name = src.read_into_try_vec()?;
        Ok(Self { version, flags, pre_defined, handler_type, reserved, name })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        w.write_u32(self.pre_defined)?;
        w.write_fourcc(self.handler_type)?;
        for r in self.reserved {
            w.write_u32(r)?;
        }
        w.write_bytes(&self.name)
    }
}

/// See ISO 14496-12:2015 § 8.11.4
#[derive(Debug, PartialEq)]
pub struct PrimaryItemBox {
    pub version: u8,
    pub flags: u32,
    pub item_id: u32,
}

impl PrimaryItemBox {
    #[must_use]
    pub fn new(item_id: u32) -> Self {
        Self {
            version: u8::from(item_id > u32::from(u16::MAX)),
            flags: 0,
            item_id,
        }
    }
}

impl BoxCodec for PrimaryItemBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let item_id = match version {
            0 => src.read_u16()?.into(),
            1 => src.read_u32()?,
            _ => return Err(Error::Unsupported("unsupported pitm version")),
        };
        Ok(Self { version, flags, item_id })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        write_item_id(w, self.version == 0, self.item_id)
    }
}

fn write_item_id(w: &mut BitStreamWriter, narrow: bool, item_id: u32) -> Result<()> {
    if narrow {
        let id = u16::try_from(item_id).map_err(|_| Error::Overflow("item id does not fit in 16 bits"))?;
        w.write_u16(id)
    } else {
        w.write_u32(item_id)
    }
}

/// Item Information Box
/// See ISO 14496-12:2015 § 8.11.6
#[derive(Debug, PartialEq, Default)]
pub struct ItemInfoBox {
    pub version: u8,
    pub flags: u32,
    pub entries: TryVec<ItemInfoEntry>,
}

impl ItemInfoBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: ItemInfoEntry) -> Result<()> {
        if self.entries.iter().any(|e| e.item_id == entry.item_id) {
            return Err(Error::InvalidArgument("duplicate item id"));
        }
        if self.version == 0 && self.entries.len() >= usize::from(u16::MAX) {
            self.version = 1;
        }
        self.entries.push(entry)?;
        Ok(())
    }
}

impl BoxCodec for ItemInfoBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let entry_count = match version {
            0 => src.read_u16()?.to_usize(),
            1 => src.read_u32()?.to_usize(),
            _ => return Err(Error::Unsupported("unsupported iinf version")),
        };
        // infe is a full box with at least a 16-bit id, so 14 bytes minimum
        let mut entries = TryVec::with_capacity(bounded_count(entry_count, src, 14)?)?;

        let mut iter = src.box_iter();
        while let Some(mut b) = iter.next_box()? {
            if b.head.name != BoxType::ItemInfoEntry {
                return Err(Error::InvalidData("iinf box should contain only infe boxes"));
            }
            let mut entry = ItemInfoEntry::read_body(&mut b)
                .and_then(|e| check_parser_state(&b).map(|()| e))
                .map_err(|e| e.in_box(b.head.fourcc(), b.head.start))?;
            entry.size_field = b.head.size_field;
            entries.push(entry)?;
        }
        if entries.len() != entry_count {
            return Err(Error::InvalidData("iinf entry count does not match its infe boxes"));
        }
        Ok(Self { version, flags, entries })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        if self.version == 0 {
            let count = u16::try_from(self.entries.len()).map_err(|_| Error::Overflow("too many items for iinf v0"))?;
            w.write_u16(count)?;
        } else {
            w.write_u32(u32::try_from(self.entries.len())?)?;
        }
        for entry in self.entries.iter() {
            let start = w.position();
            write_box(w, start, BoxType::ItemInfoEntry.into(), entry.size_field, None, |w| entry.write_body(w))?;
        }
        Ok(())
    }
}

/// Item Info Entry
/// See ISO 14496-12:2015 § 8.11.6.2
#[derive(Debug, PartialEq)]
pub struct ItemInfoEntry {
    pub version: u8,
    /// Bit 0 marks the item hidden.
    pub flags: u32,
    pub item_id: u32,
    /// 1-based index into the `ipro` box, 0 when unprotected.
    pub item_protection_index: u16,
    /// Zero for version 0 and 1 entries, which carry no type.
    pub item_type: FourCC,
    /// `None` when the box ends before the name, which some writers do for
    /// unnamed items.
    pub item_name: Option<TryString>,
    /// Present for `mime` items and version 0/1 entries.
    pub content_type: TryString,
    pub content_encoding: Option<TryString>,
    /// Present for `uri ` items.
    pub item_uri_type: TryString,
    /// Version 1 extension bytes, kept verbatim.
    pub extension: TryString,
    /// Header encoding of the `infe` box inside `iinf`.
    pub size_field: SizeField,
}

impl ItemInfoEntry {
    /// A version 2 (or 3, for ids past 16 bits) entry without a name.
    #[must_use]
    pub fn new(item_id: u32, item_type: FourCC) -> Self {
        Self {
            version: if item_id > u32::from(u16::MAX) { 3 } else { 2 },
            flags: 0,
            item_id,
            item_protection_index: 0,
            item_type,
            item_name: Some(TryVec::new()),
            content_type: TryVec::new(),
            content_encoding: None,
            item_uri_type: TryVec::new(),
            extension: TryVec::new(),
            size_field: SizeField::Compact,
        }
    }

    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        if hidden {
            self.flags |= 1;
        } else {
            self.flags &= !1;
        }
        self
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.flags & 1 == 1
    }
}

fn try_string(bytes: &[u8]) -> Result<TryString> {
    let mut s = TryVec::with_capacity(bytes.len())?;
    s.extend_from_slice(bytes)?;
    Ok(s)
}

/// A trailing string the box may leave out entirely.
fn read_optional_cstring(src: &mut BMFFBox<'_>) -> Result<Option<TryString>> {
    if src.is_empty() {
        return Ok(None);
    }
    Ok(Some(try_string(src.read_cstring()?)?))
}

impl BoxCodec for ItemInfoEntry {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        // According to the standard, it seems the flags field should be 0 or 1,
        // but the hidden bit is the only one we interpret.
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let mut entry = Self::new(0, FourCC::default());
        entry.version = version;
        entry.flags = flags;
        match version {
            0 | 1 => {
                entry.item_id = src.read_u16()?.into();
                entry.item_protection_index = src.read_u16()?;
                entry.item_name = read_optional_cstring(src)?;
                if entry.item_name.is_some() {
                    entry.content_type = try_string(src.read_cstring()?)?;
                    entry.content_encoding = read_optional_cstring(src)?;
                }
                if version == 1 {
                    entry.extension = src.read_into_try_vec()?;
                }
            },
            2 | 3 => {
                entry.item_id = if version == 2 { src.read_u16()?.into() } else { src.read_u32()? };
                entry.item_protection_index = src.read_u16()?;
                entry.item_type = src.read_fourcc()?;
                entry.item_name = read_optional_cstring(src)?;
                if entry.item_name.is_none() {
                    debug!("infe {} has no item_name", entry.item_id);
                } else if entry.item_type == FourCC::MIME {
                    entry.content_type = try_string(src.read_cstring()?)?;
                    entry.content_encoding = read_optional_cstring(src)?;
                } else if entry.item_type == FourCC::URI {
                    entry.item_uri_type = try_string(src.read_cstring()?)?;
                }
            },
            _ => return Err(Error::Unsupported("unsupported version in 'infe' box")),
        }
        debug!("infe item_id {} item_type: {}", entry.item_id, entry.item_type);
        Ok(entry)
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        match self.version {
            0 | 1 => {
                write_item_id(w, true, self.item_id)?;
                w.write_u16(self.item_protection_index)?;
                if let Some(name) = &self.item_name {
                    w.write_cstring(name)?;
                    w.write_cstring(&self.content_type)?;
                    if let Some(encoding) = &self.content_encoding {
                        w.write_cstring(encoding)?;
                    }
                }
                if self.version == 1 {
                    w.write_bytes(&self.extension)?;
                }
            },
            2 | 3 => {
                write_item_id(w, self.version == 2, self.item_id)?;
                w.write_u16(self.item_protection_index)?;
                w.write_fourcc(self.item_type)?;
                let Some(name) = &self.item_name else {
                    return Ok(());
                };
                w.write_cstring(name)?;
                if self.item_type == FourCC::MIME {
                    w.write_cstring(&self.content_type)?;
                    if let Some(encoding) = &self.content_encoding {
                        w.write_cstring(encoding)?;
                    }
                } else if self.item_type == FourCC::URI {
                    w.write_cstring(&self.item_uri_type)?;
                }
            },
            _ => return Err(Error::Unsupported("unsupported version in 'infe' box")),
        }
        Ok(())
    }
}

/// A typed, ordered edge list from one item.
///
/// See ISO 14496-12:2015 § 8.11.12
#[derive(Debug, PartialEq)]
pub struct ItemReference {
    pub reference_type: FourCC,
    pub from_item_id: u32,
    /// Order is significant, e.g. tile placement for `dimg`.
    pub to_item_ids: TryVec<u32>,
    /// Header encoding of this entry's box inside `iref`.
    pub size_field: SizeField,
}

/// See ISO 14496-12:2015 § 8.11.12
#[derive(Debug, PartialEq, Default)]
pub struct ItemReferenceBox {
    pub version: u8,
    pub flags: u32,
    pub references: TryVec<ItemReference>,
}

impl ItemReferenceBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference. Switches to 32-bit ids when any id needs them.
    pub fn add_reference(&mut self, reference_type: FourCC, from_item_id: u32, to_item_ids: &[u32]) -> Result<()> {
        if to_item_ids.len() > usize::from(u16::MAX) {
            return Err(Error::Overflow("too many targets for one reference"));
        }
        if to_item_ids.contains(&from_item_id) {
            return Err(Error::InvalidArgument("an item cannot reference itself"));
        }
        let wide = std::iter::once(&from_item_id)
            .chain(to_item_ids)
            .any(|&id| id > u32::from(u16::MAX));
        if wide {
            self.version = 1;
        }
        self.references.push(ItemReference {
            reference_type,
            from_item_id,
            to_item_ids: try_ids(to_item_ids)?,
            size_field: SizeField::Compact,
        })?;
        Ok(())
    }
}

/// Body of one `SingleItemTypeReferenceBox`: the source id and its targets.
fn read_reference_targets(b: &mut BMFFBox<'_>, narrow: bool) -> Result<(u32, TryVec<u32>)> {
    let id_size = if narrow { 2 } else { 4 };
    let from_item_id = if narrow { b.read_u16()?.into() } else { b.read_u32()? };
    let reference_count = b.read_u16()?;
    let mut to_item_ids = TryVec::with_capacity(bounded_count(reference_count, b, id_size)?)?;
    for _ in 0..reference_count {
        let to_item_id = if narrow { b.read_u16()?.into() } else { b.read_u32()? };
        if from_item_id == to_item_id {
            return Err(Error::InvalidData("from_item_id and to_item_id must be different"));
        }
        to_item_ids.push(to_item_id)?;
    }
    check_parser_state(b)?;
    Ok((from_item_id, to_item_ids))
}

fn try_ids(ids: &[u32]) -> Result<TryVec<u32>> {
    let mut v = TryVec::with_capacity(ids.len())?;
    v.extend_from_slice(ids)?;
    Ok(v)
}

impl BoxCodec for ItemReferenceBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        if version > 1 {
            return Err(Error::Unsupported("iref version"));
        }
        let mut references = TryVec::new();
        let mut iter = src.box_iter();
        while let Some(mut b) = iter.next_box()? {
            let reference_type = b.head.fourcc();
            let size_field = b.head.size_field;
            let (from_item_id, to_item_ids) = read_reference_targets(&mut b, version == 0)
                .map_err(|e| e.in_box(reference_type, b.head.start))?;
            references.push(ItemReference { reference_type, from_item_id, to_item_ids, size_field })?;
        }
        Ok(Self { version, flags, references })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        let narrow = self.version == 0;
        for reference in self.references.iter() {
            let start = w.position();
            write_box(w, start, reference.reference_type, reference.size_field, None, |w| {
                write_item_id(w, narrow, reference.from_item_id)?;
                let count = u16::try_from(reference.to_item_ids.len())
                    .map_err(|_| Error::Overflow("too many targets for one reference"))?;
                w.write_u16(count)?;
                for &id in reference.to_item_ids.iter() {
                    write_item_id(w, narrow, id)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// Where an item's extents are read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructionMethod {
    File,
    Idat,
    Item,
}

impl ConstructionMethod {
    const fn to_u16(self) -> u16 {
        match self {
            Self::File => 0,
            Self::Idat => 1,
            Self::Item => 2,
        }
    }
}

/// One extent as stored; `length` 0 means "to the end of the source".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ItemLocationExtent {
    /// Only meaningful for `ConstructionMethod::Item`.
    pub index: u64,
    pub offset: u64,
    pub length: u64,
}

/// A resolved byte range within a file or an `idat` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtentRange {
    WithLength(Range<u64>),
    ToEnd(RangeFrom<u64>),
}

impl ExtentRange {
    #[must_use]
    pub const fn start(&self) -> u64 {
        match self {
            Self::WithLength(r) => r.start,
            Self::ToEnd(r) => r.start,
        }
    }

    /// The bytes of this range within `data`.
    pub fn slice<'d>(&self, data: &'d [u8]) -> Result<&'d [u8]> {
        let start = usize::try_from(self.start())?;
        let slice = match self {
            Self::WithLength(r) => {
                let end = usize::try_from(r.end)?;
                data.get(start..end)
            },
            Self::ToEnd(_) => data.get(start..),
        };
        slice.ok_or(Error::InvalidData("extent out of bounds"))
    }
}

/// Used for 'iloc' boxes
/// See ISO 14496-12:2015 § 8.11.3
#[derive(Debug, PartialEq)]
pub struct ItemLocation {
    pub item_id: u32,
    pub construction_method: ConstructionMethod,
    /// Only 0 (this file) is resolvable.
    pub data_reference_index: u16,
    pub base_offset: u64,
    pub extents: TryVec<ItemLocationExtent>,
}

impl ItemLocation {
    #[must_use]
    pub fn new(item_id: u32, construction_method: ConstructionMethod) -> Self {
        Self {
            item_id,
            construction_method,
            data_reference_index: 0,
            base_offset: 0,
            extents: TryVec::new(),
        }
    }

    pub fn add_extent(&mut self, offset: u64, length: u64) -> Result<()> {
        self.extents.push(ItemLocationExtent { index: 0, offset, length })?;
        Ok(())
    }

    /// Extents with the base offset folded in.
    pub fn ranges(&self) -> Result<TryVec<ExtentRange>> {
        let mut ranges = TryVec::with_capacity(self.extents.len())?;
        for extent in self.extents.iter() {
            let start = self
                .base_offset
                .checked_add(extent.offset)
                .ok_or(Error::InvalidData("offset calculation overflow"))?;
            // "If the length is not specified, or specified as zero, then the entire length of
            //  the source is implied"
            let range = if extent.length == 0 {
                ExtentRange::ToEnd(RangeFrom { start })
            } else {
                let end = start
                    .checked_add(extent.length)
                    .ok_or(Error::InvalidData("end calculation overflow"))?;
                ExtentRange::WithLength(Range { start, end })
            };
            ranges.push(range)?;
        }
        Ok(ranges)
    }
}

/// See ISO 14496-12:2015 § 8.11.3
#[derive(Debug, PartialEq)]
pub struct ItemLocationBox {
    pub version: u8,
    pub flags: u32,
    /// Field widths in bytes, each one of 0, 4 or 8.
    pub offset_size: u8,
    pub length_size: u8,
    pub base_offset_size: u8,
    /// Reserved in version 0.
    pub index_size: u8,
    pub items: TryVec<ItemLocation>,
}

impl Default for ItemLocationBox {
    fn default() -> Self {
        Self {
            version: 1,
            flags: 0,
            offset_size: 4,
            length_size: 4,
            base_offset_size: 0,
            index_size: 0,
            items: TryVec::new(),
        }
    }
}

fn field_size_for(value: u64) -> u8 {
    match value {
        0 => 0,
        v if v <= u64::from(u32::MAX) => 4,
        _ => 8,
    }
}

impl ItemLocationBox {
    /// Version 1 with 32-bit offsets and lengths, widened as items need.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(&self, item_id: u32) -> Option<&ItemLocation> {
        self.items.iter().find(|l| l.item_id == item_id)
    }

    /// Append an item's location, widening field sizes and the version as
    /// needed to encode it.
    pub fn add_item(&mut self, location: ItemLocation) -> Result<()> {
        if self.location(location.item_id).is_some() {
            return Err(Error::InvalidArgument("item already has a location"));
        }
        if location.extents.len() > usize::from(u16::MAX) {
            return Err(Error::Overflow("too many extents for one item"));
        }
        if location.item_id > u32::from(u16::MAX) || self.items.len() >= usize::from(u16::MAX) {
            self.version = 2;
        } else if location.construction_method != ConstructionMethod::File && self.version == 0 {
            self.version = 1;
        }
        self.base_offset_size = self.base_offset_size.max(field_size_for(location.base_offset));
        for extent in location.extents.iter() {
            self.offset_size = self.offset_size.max(field_size_for(extent.offset));
            self.length_size = self.length_size.max(field_size_for(extent.length));
            if self.version > 0 {
                self.index_size = self.index_size.max(field_size_for(extent.index));
            }
        }
        self.items.push(location)?;
        Ok(())
    }
}

fn iloc_field_size(value: u64) -> Result<u8> {
    match value {
        0 | 4 | 8 => Ok(value as u8),
        _ => Err(Error::InvalidData("value must be in the set {0, 4, 8}")),
    }
}

impl BoxCodec for ItemLocationBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        if version > 2 {
            return Err(Error::Unsupported("unsupported version in 'iloc' box"));
        }

        let offset_size = iloc_field_size(src.read_bits(4)?)?;
        let length_size = iloc_field_size(src.read_bits(4)?)?;
        let base_offset_size = iloc_field_size(src.read_bits(4)?)?;
        let index_size = match version {
            0 => src.read_bits(4)? as u8,
            _ => iloc_field_size(src.read_bits(4)?)?,
        };

        let id_bits = if version < 2 { 16 } else { 32 };
        let item_count = src.read_bits(id_bits)?;
        // id + data_reference_index + extent_count at minimum
        let mut items = TryVec::with_capacity(bounded_count(item_count, src, 6)?)?;

        for _ in 0..item_count {
            let item_id = src.read_bits(id_bits)? as u32;

            // ISO 14496-12 is not explicit about how an `iloc` should be interpreted for version 0,
            // which has no `construction_method` field. We take this to imply version 0 can be
            // interpreted as using file offsets.
            let construction_method = match version {
                0 => ConstructionMethod::File,
                _ => {
                    let _reserved = src.read_bits(12)?;
                    match src.read_bits(4)? {
                        0 => ConstructionMethod::File,
                        1 => ConstructionMethod::Idat,
                        2 => ConstructionMethod::Item,
                        _ => return Err(Error::InvalidData("construction_method is taken from the set 0, 1 or 2")),
                    }
                },
            };

            let data_reference_index = src.read_u16()?;
            let base_offset = src.read_bits(base_offset_size * 8)?;
            let extent_count = src.read_u16()?;
            if extent_count < 1 {
                return Err(Error::InvalidData("extent_count must have a value 1 or greater"));
            }

            let per_extent = usize::from(offset_size + length_size) + if version > 0 { usize::from(index_size) } else { 0 };
            let mut extents = TryVec::with_capacity(bounded_count(extent_count, src, per_extent)?)?;
            for _ in 0..extent_count {
                let index = if version > 0 { src.read_bits(index_size * 8)? } else { 0 };
                // "If the offset is not identified (the field has a length of zero), then the
                //  beginning of the source (offset 0) is implied"
                let offset = src.read_bits(offset_size * 8)?;
                let length = src.read_bits(length_size * 8)?;
                extents.push(ItemLocationExtent { index, offset, length })?;
            }

            items.push(ItemLocation {
                item_id,
                construction_method,
                data_reference_index,
                base_offset,
                extents,
            })?;
        }

        Ok(Self {
            version,
            flags,
            offset_size,
            length_size,
            base_offset_size,
            index_size,
            items,
        })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        for size in [self.offset_size, self.length_size, self.base_offset_size] {
            iloc_field_size(u64::from(size))?;
        }
        w.write_bits(u64::from(self.offset_size), 4)?;
        w.write_bits(u64::from(self.length_size), 4)?;
        w.write_bits(u64::from(self.base_offset_size), 4)?;
        w.write_bits(u64::from(self.index_size), 4)?;

        let id_bits = if self.version < 2 { 16 } else { 32 };
        w.write_bits(self.items.len().to_u64(), id_bits)
            .map_err(|_| Error::Overflow("too many items for this iloc version"))?;
        for item in self.items.iter() {
            w.write_bits(u64::from(item.item_id), id_bits)
                .map_err(|_| Error::Overflow("item id does not fit this iloc version"))?;
            if self.version > 0 {
                w.write_bits(0, 12)?;
                w.write_bits(u64::from(item.construction_method.to_u16()), 4)?;
            } else if item.construction_method != ConstructionMethod::File {
                return Err(Error::InvalidArgument("iloc version 0 only locates file data"));
            }
            w.write_u16(item.data_reference_index)?;
            w.write_bits(item.base_offset, self.base_offset_size * 8)?;
            let count = u16::try_from(item.extents.len()).map_err(|_| Error::Overflow("too many extents for one item"))?;
            w.write_u16(count)?;
            for extent in item.extents.iter() {
                if self.version > 0 {
                    w.write_bits(extent.index, self.index_size * 8)?;
                }
                w.write_bits(extent.offset, self.offset_size * 8)?;
                w.write_bits(extent.length, self.length_size * 8)?;
            }
        }
        Ok(())
    }
}

/// Item data stored inside the `meta` box.
///
/// See ISO 14496-12:2015 § 8.11.11
#[derive(Debug, PartialEq, Default)]
pub struct ItemDataBox {
    pub data: TryVec<u8>,
}

impl BoxCodec for ItemDataBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(Self { data: src.read_into_try_vec()? })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        w.write_bytes(&self.data)
    }
}

/// Media payload bytes, kept verbatim.
///
/// See ISO 14496-12:2015 § 8.1.1
#[derive(Debug, PartialEq, Default)]
pub struct MediaDataBox {
    pub data: TryVec<u8>,
}

impl BoxCodec for MediaDataBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(Self { data: src.read_into_try_vec()? })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        w.write_bytes(&self.data)
    }
}

/// `iprp`: the property container followed by one or more association
/// boxes.
///
/// See ISO 23008-12:2017 § 9.3.1
#[derive(Debug, PartialEq, Default)]
pub struct ItemPropertiesBox {
    pub children: TryVec<IsoBox>,
}

impl ItemPropertiesBox {
    pub fn property_container(&self) -> Option<&ItemPropertyContainerBox> {
        self.children.iter().find_map(|b| match &b.body {
            BoxBody::ItemPropertyContainer(c) => Some(c),
            _ => None,
        })
    }

    pub fn associations(&self) -> impl Iterator<Item = &ItemPropertyAssociationBox> {
        self.children.iter().filter_map(|b| match &b.body {
            BoxBody::ItemPropertyAssociation(a) => Some(a),
            _ => None,
        })
    }
}

impl BoxCodec for ItemPropertiesBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let children = read_children(src)?;
        let containers = children.iter().filter(|c| c.header.name == BoxType::ItemPropertyContainerBox).count();
        if containers > 1 {
            return Err(Error::InvalidData("iprp holds more than one ipco"));
        }
        Ok(Self { children })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        write_children(w, &self.children)
    }
}

/// `ipco`: properties addressed by 1-based position.
#[derive(Debug, PartialEq, Default)]
pub struct ItemPropertyContainerBox {
    pub properties: TryVec<IsoBox>,
}

impl ItemPropertyContainerBox {
    /// Property by its 1-based association index; 0 means "none".
    pub fn get(&self, index: u16) -> Option<&IsoBox> {
        let index = usize::from(index).checked_sub(1)?;
        self.properties.get(index)
    }
}

impl BoxCodec for ItemPropertyContainerBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(Self { properties: read_children(src)? })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        write_children(w, &self.properties)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAssociation {
    pub essential: bool,
    /// 1-based index into `ipco`.
    pub property_index: u16,
}

#[derive(Debug, PartialEq)]
pub struct ItemPropertyAssociation {
    pub item_id: u32,
    pub associations: TryVec<PropertyAssociation>,
}

/// See ISO 23008-12:2017 § 9.3.1
#[derive(Debug, PartialEq, Default)]
pub struct ItemPropertyAssociationBox {
    pub version: u8,
    /// Bit 0 selects 15-bit property indices.
    pub flags: u32,
    pub entries: TryVec<ItemPropertyAssociation>,
}

impl ItemPropertyAssociationBox {
    fn index_bits(&self) -> u8 {
        if self.flags & 1 == 1 { 15 } else { 7 }
    }
}

impl BoxCodec for ItemPropertyAssociationBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let mut this = Self { version, flags, entries: TryVec::new() };
        let entry_count = src.read_u32()?;
        let id_size = if version == 0 { 2 } else { 4 };
        this.entries = TryVec::with_capacity(bounded_count(entry_count, src, id_size + 1)?)?;
        for _ in 0..entry_count {
            let item_id = if version == 0 { src.read_u16()?.into() } else { src.read_u32()? };
            let association_count = src.read_u8()?;
            let mut associations = TryVec::with_capacity(usize::from(association_count))?;
            for _ in 0..association_count {
                let essential = src.read_bool()?;
                let property_index = src.read_bits(this.index_bits())? as u16;
                associations.push(PropertyAssociation { essential, property_index })?;
            }
            this.entries.push(ItemPropertyAssociation { item_id, associations })?;
        }
        Ok(this)
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        w.write_u32(u32::try_from(self.entries.len())?)?;
        for entry in self.entries.iter() {
            write_item_id(w, self.version == 0, entry.item_id)?;
            let count = u8::try_from(entry.associations.len())
                .map_err(|_| Error::Overflow("too many properties for one item"))?;
            w.write_u8(count)?;
            for a in entry.associations.iter() {
                w.write_bool(a.essential)?;
                w.write_bits(u64::from(a.property_index), self.index_bits())?;
            }
        }
        Ok(())
    }
}

/// Image spatial extents (dimensions)
///
/// See ISO 23008-12:2017 § 6.5.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageSpatialExtentsProperty {
    pub version: u8,
    pub flags: u32,
    pub width: u32,
    pub height: u32,
}

impl ImageSpatialExtentsProperty {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { version: 0, flags: 0, width, height }
    }
}

impl BoxCodec for ImageSpatialExtentsProperty {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let width = src.read_u32()?;
        let height = src.read_u32()?;
        Ok(Self { version, flags, width, height })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        w.write_u32(self.width)?;
        w.write_u32(self.height)
    }
}

#[cfg(test)]
fn parse_single(data: &[u8]) -> IsoBox {
    let boxes = crate::read_boxes(data).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
    boxes.into_iter().next().unwrap()
}

#[test]
fn iloc_v1_with_idat_and_index() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 36, b'i', b'l', b'o', b'c',
        1, 0, 0, 0,
        0x44, 0x04, // offset 4, length 4, base 0, index 4
        0, 1,       // one item
        0, 7,       // item id
        0, 1,       // construction method idat
        0, 0,       // data reference index
        0, 1,       // one extent
        0, 0, 0, 0, // index
        0, 0, 0, 2, // offset
        0, 0, 0, 5, // length
    ];
    let b = parse_single(&data);
    let BoxBody::ItemLocation(iloc) = &b.body else { panic!("not iloc") };
    let loc = iloc.location(7).unwrap();
    assert_eq!(loc.construction_method, ConstructionMethod::Idat);
    assert_eq!(loc.ranges().unwrap()[0], ExtentRange::WithLength(2..7));
}

#[test]
fn iloc_rejects_bad_field_size() {
    let data = [0, 0, 0, 16, b'i', b'l', b'o', b'c', 0, 0, 0, 0, 0x34, 0x00, 0, 0];
    let err = crate::read_boxes(&data).unwrap_err();
    assert!(matches!(err.root_cause(), Error::InvalidData(_)));
}

#[test]
fn iloc_add_item_widens_fields() {
    let mut iloc = ItemLocationBox::new();
    let mut loc = ItemLocation::new(1, ConstructionMethod::File);
    loc.add_extent(1 << 33, 10).unwrap();
    iloc.add_item(loc).unwrap();
    assert_eq!(iloc.offset_size, 8);
    assert_eq!(iloc.length_size, 4);
    assert!(iloc.add_item(ItemLocation::new(1, ConstructionMethod::File)).is_err());

    let boxes = [IsoBox::new(BoxBody::ItemLocation(iloc)).unwrap()];
    let bytes = crate::write_boxes(&boxes).unwrap();
    let reread = parse_single(&bytes);
    let BoxBody::ItemLocation(iloc) = &reread.body else { panic!("not iloc") };
    assert_eq!(iloc.items[0].extents[0].offset, 1 << 33);
}

#[test]
fn iref_v0_round_trip_and_order() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 42, b'i', b'r', b'e', b'f', 0, 0, 0, 0,
        0, 0, 0, 16, b'd', b'i', b'm', b'g', 0, 1, 0, 2, 0, 3, 0, 2,
        0, 0, 0, 14, b'c', b'd', b's', b'c', 0, 4, 0, 1, 0, 1,
    ];
    let b = parse_single(&data);
    let BoxBody::ItemReference(iref) = &b.body else { panic!("not iref") };
    assert_eq!(iref.references.len(), 2);
    assert_eq!(iref.references[0].reference_type, FourCC::DIMG);
    assert_eq!(&iref.references[0].to_item_ids[..], &[3, 2]);
    assert_eq!(iref.references[1].from_item_id, 4);
}

#[test]
fn iref_add_reference_switches_to_wide_ids() {
    let mut iref = ItemReferenceBox::new();
    iref.add_reference(FourCC::THMB, 2, &[1]).unwrap();
    assert_eq!(iref.version, 0);
    iref.add_reference(FourCC::DIMG, 70_000, &[1, 2]).unwrap();
    assert_eq!(iref.version, 1);
    assert!(iref.add_reference(FourCC::DIMG, 5, &[5]).is_err());
}

#[test]
fn infe_versions() {
    // v2 hidden hvc1 item named "a"
    let v2 = [0, 0, 0, 22, b'i', b'n', b'f', b'e', 2, 0, 0, 1, 0, 9, 0, 0, b'h', b'v', b'c', b'1', b'a', 0];
    let b = parse_single(&v2);
    let BoxBody::ItemInfoEntry(infe) = &b.body else { panic!("not infe") };
    assert!(infe.is_hidden());
    assert_eq!((infe.item_id, infe.item_type), (9, FourCC::HVC1));
    assert_eq!(infe.item_name.as_deref(), Some(&b"a"[..]));

    // v3 mime item with encoding
    let mut v3 = std::vec::Vec::new();
    v3.extend_from_slice(b"\0\0\0\0infe\x03\0\0\0\0\x01\0\0\0\0mimexmp\0application/rdf+xml\0gzip\0");
    v3[3] = v3.len() as u8;
    let b = parse_single(&v3);
    let BoxBody::ItemInfoEntry(infe) = &b.body else { panic!("not infe") };
    assert_eq!(infe.item_id, 0x0001_0000);
    assert_eq!(&infe.content_type[..], b"application/rdf+xml");
    assert_eq!(infe.content_encoding.as_deref(), Some(&b"gzip"[..]));
}

#[test]
fn meta_rejects_duplicate_singletons() {
    let mut data = std::vec::Vec::new();
    data.extend_from_slice(b"\0\0\0\x1cmeta\0\0\0\0");
    data.extend_from_slice(b"\0\0\0\x08idat");
    data.extend_from_slice(b"\0\0\0\x08idat");
    let err = crate::read_boxes(&data).unwrap_err();
    assert!(matches!(err.root_cause(), Error::InvalidData(_)));

    let mut meta = MetaBox::new();
    meta.push(IsoBox::new(BoxBody::ItemData(ItemDataBox::default())).unwrap()).unwrap();
    assert!(meta.push(IsoBox::new(BoxBody::ItemData(ItemDataBox::default())).unwrap()).is_err());
    assert!(meta.item_data().is_some());
}

#[test]
fn ipma_wide_indices() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 23, b'i', b'p', b'm', b'a', 0, 0, 0, 1,
        0, 0, 0, 1,
        0, 1, 2,
        0x80, 0x01,
        0x01, 0x00,
    ];
    let b = parse_single(&data);
    let BoxBody::ItemPropertyAssociation(ipma) = &b.body else { panic!("not ipma") };
    let a = &ipma.entries[0].associations;
    assert_eq!(a[0], PropertyAssociation { essential: true, property_index: 1 });
    assert_eq!(a[1], PropertyAssociation { essential: false, property_index: 256 });
}

#[test]
fn infe_without_name() {
    let infe = [0, 0, 0, 20, b'i', b'n', b'f', b'e', 2, 0, 0, 0, 0, 1, 0, 0, b'h', b'v', b'c', b'1'];
    let b = parse_single(&infe);
    let BoxBody::ItemInfoEntry(entry) = &b.body else { panic!("not infe") };
    assert_eq!((entry.item_id, entry.item_type), (1, FourCC::HVC1));
    assert_eq!(entry.item_name, None);

    let mut iinf = std::vec::Vec::new();
    iinf.extend_from_slice(&[0, 0, 0, 34, b'i', b'i', b'n', b'f', 0, 0, 0, 0, 0, 1]);
    iinf.extend_from_slice(&infe);
    let b = parse_single(&iinf);
    let BoxBody::ItemInfo(iinf) = &b.body else { panic!("not iinf") };
    assert_eq!(iinf.entries.len(), 1);
    assert!(iinf.entries[0].item_name.is_none());
}

#[test]
fn empty_entry_lists_round_trip() {
    let b = parse_single(b"\0\0\0\x0eiinf\0\0\0\0\0\0");
    let BoxBody::ItemInfo(iinf) = &b.body else { panic!("not iinf") };
    assert!(iinf.entries.is_empty());

    let b = parse_single(b"\0\0\0\x0ciref\0\0\0\0");
    let BoxBody::ItemReference(iref) = &b.body else { panic!("not iref") };
    assert!(iref.references.is_empty());
}

#[test]
fn entry_lists_keep_large_child_headers() {
    #[rustfmt::skip]
    let iinf = [
        0, 0, 0, 43, b'i', b'i', b'n', b'f', 0, 0, 0, 0, 0, 1,
        0, 0, 0, 1, b'i', b'n', b'f', b'e', 0, 0, 0, 0, 0, 0, 0, 29,
        2, 0, 0, 0, 0, 1, 0, 0, b'h', b'v', b'c', b'1', 0,
    ];
    let b = parse_single(&iinf);
    let BoxBody::ItemInfo(iinf) = &b.body else { panic!("not iinf") };
    assert_eq!(iinf.entries[0].size_field, SizeField::Large);

    #[rustfmt::skip]
    let iref = [
        0, 0, 0, 34, b'i', b'r', b'e', b'f', 0, 0, 0, 0,
        0, 0, 0, 1, b't', b'h', b'm', b'b', 0, 0, 0, 0, 0, 0, 0, 22,
        0, 2, 0, 1, 0, 1,
    ];
    let b = parse_single(&iref);
    let BoxBody::ItemReference(iref) = &b.body else { panic!("not iref") };
    assert_eq!(iref.references[0].size_field, SizeField::Large);
    assert_eq!(&iref.references[0].to_item_ids[..], &[1]);
}

#[test]
fn iref_errors_name_the_reference_box() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 24, b'i', b'r', b'e', b'f', 0, 0, 0, 0,
        0, 0, 0, 12, b'c', b'd', b's', b'c', 0, 4, 0, 1, // one target announced, none present
    ];
    let err = crate::read_boxes(&data).unwrap_err();
    let mut chain = std::vec::Vec::new();
    let mut e = &err;
    while let Error::InBox { box_type, offset, source } = e {
        chain.push((*box_type, *offset));
        e = source;
    }
    assert_eq!(chain, [(FourCC::from(b"iref"), 0), (FourCC::from(b"cdsc"), 12)]);
    assert!(matches!(e, Error::InvalidData(_)));
}
