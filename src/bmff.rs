// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The generic box model: headers, bounded child iteration, the typed
//! [`BoxBody`] dispatch and the write path with size patch-back.
//!
//! See ISO 14496-12:2015 § 4.2

use crate::bitstream::{BitStream, BitStreamWriter};
use crate::codec::{Av1ConfigurationBox, AvcConfigurationBox, HevcConfigurationBox, JpegConfigurationBox};
use crate::meta::{
    FileTypeBox, HandlerBox, ImageSpatialExtentsProperty, ItemDataBox, ItemInfoBox, ItemInfoEntry, ItemLocationBox,
    ItemPropertiesBox, ItemPropertyAssociationBox, ItemPropertyContainerBox, ItemReferenceBox, MediaDataBox, MetaBox,
    PrimaryItemBox,
};
use crate::protection::{
    ItemProtectionBox, OriginalFormatBox, ProtectionSchemeInfoBox, SchemeInformationBox, SchemeTypeBox,
};
use crate::track::{
    ChunkOffsetBox, MediaHeaderBox, SampleSizeBox, SampleToChunkBox, TimeToSampleBox, TrackHeaderBox,
};
use crate::{BoxType, Error, FourCC, Result, ToU64 as _, TryVec};
use log::debug;
use std::ops::{Deref, DerefMut};

/// How the size of a box was (or will be) encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeField {
    /// 32-bit size.
    #[default]
    Compact,
    /// 32-bit size of 1 followed by a 64-bit size.
    Large,
    /// 32-bit size of 0: the box extends to the end of its enclosing range.
    UntilEof,
}

/// Basic ISO box structure.
///
/// mp4 files are a sequence of possibly-nested 'box' structures.  Each box
/// begins with a header describing the length of the box's data and a
/// four-byte box type which identifies the type of the box. Together these
/// are enough to interpret the contents of that section of the file.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Box type.
    pub name: BoxType,
    /// Size of the box in bytes, header included.
    pub size: u64,
    /// Header size in bytes.
    pub offset: u64,
    /// Uuid for extended type.
    pub uuid: Option<[u8; 16]>,
    /// Absolute position of the first header byte.
    pub start: u64,
    pub size_field: SizeField,
}

impl BoxHeader {
    pub(crate) const MIN_SIZE: u64 = 8; // 4-byte size + 4-byte type
    pub(crate) const MIN_LARGE_SIZE: u64 = 16; // 4-byte size + 4-byte type + 8-byte size

    /// A compact header for a box about to be written.
    pub fn new(name: impl Into<BoxType>) -> Self {
        Self {
            name: name.into(),
            size: Self::MIN_SIZE,
            offset: Self::MIN_SIZE,
            uuid: None,
            start: 0,
            size_field: SizeField::Compact,
        }
    }

    #[must_use]
    pub fn fourcc(&self) -> FourCC {
        self.name.into()
    }

    /// Payload length: declared size minus header length.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        self.size - self.offset
    }
}

/// Version and flags of a full box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullBoxHeader {
    pub version: u8,
    /// Only the low 24 bits are meaningful.
    pub flags: u32,
}

impl FullBoxHeader {
    #[must_use]
    pub const fn new(version: u8, flags: u32) -> Self {
        Self { version, flags }
    }

    /// Parse the extra header fields for a full box.
    pub(crate) fn read(src: &mut BitStream<'_>) -> Result<Self> {
        let version = src.read_u8()?;
        let flags = src.read_u24()?;
        Ok(Self { version, flags })
    }

    pub(crate) fn write(&self, w: &mut BitStreamWriter) -> Result<()> {
        w.write_u8(self.version)?;
        w.write_u24(self.flags)
    }
}

/// Read and parse a box header.
///
/// Call this first to determine the type of a particular box and its
/// length. A size of 0 is resolved against the bytes left in `src`.
///
/// See ISO 14496-12:2015 § 4.2
pub(crate) fn read_box_header(src: &mut BitStream<'_>) -> Result<BoxHeader> {
    let start = src.offset();
    let size32 = src.read_u32()?;
    let name = BoxType::from(src.read_u32()?);
    let (size_field, mut size) = match size32 {
        // valid only for the last box in its range, usually mdat.
        0 => (SizeField::UntilEof, 0),
        1 => {
            let size64 = src.read_u64()?;
            if size64 < BoxHeader::MIN_LARGE_SIZE {
                return Err(Error::InvalidData("malformed wide size"));
            }
            (SizeField::Large, size64)
        },
        _ => {
            if u64::from(size32) < BoxHeader::MIN_SIZE {
                return Err(Error::InvalidData("malformed size"));
            }
            (SizeField::Compact, u64::from(size32))
        },
    };
    let uuid = if name == BoxType::UuidBox {
        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(src.read_bytes(16)?);
        Some(buffer)
    } else {
        None
    };
    let offset = src.offset() - start;
    if size_field == SizeField::UntilEof {
        size = offset + src.remaining().to_u64();
    }
    if size < offset {
        return Err(Error::InvalidData("box size smaller than its header"));
    }
    Ok(BoxHeader { name, size, offset, uuid, start, size_field })
}

/// A box header together with a cursor bounded to exactly its payload.
///
/// See ISO 14496-12:2015 § 4.2
pub(crate) struct BMFFBox<'a> {
    pub(crate) head: BoxHeader,
    pub(crate) content: BitStream<'a>,
}

impl<'a> Deref for BMFFBox<'a> {
    type Target = BitStream<'a>;

    fn deref(&self) -> &Self::Target {
        &self.content
    }
}

impl DerefMut for BMFFBox<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.content
    }
}

impl<'a> BMFFBox<'a> {
    pub(crate) const fn get_header(&self) -> &BoxHeader {
        &self.head
    }

    pub(crate) fn box_iter(&mut self) -> BoxIter<'a, '_> {
        BoxIter::new(&mut self.content)
    }

    /// Copy the rest of the payload into a fallible buffer.
    pub(crate) fn read_into_try_vec(&mut self) -> Result<TryVec<u8>> {
        let rest = self.content.read_to_end()?;
        let mut vec = TryVec::with_capacity(rest.len())?;
        vec.extend_from_slice(rest)?;
        Ok(vec)
    }
}

impl Drop for BMFFBox<'_> {
    fn drop(&mut self) {
        if !self.content.is_empty() {
            let name: FourCC = From::from(self.head.name);
            debug!("Dropping {} bytes in '{}'", self.content.remaining(), name);
        }
    }
}

pub(crate) struct BoxIter<'a, 'b> {
    src: &'b mut BitStream<'a>,
}

impl<'a, 'b> BoxIter<'a, 'b> {
    pub(crate) fn new(src: &'b mut BitStream<'a>) -> Self {
        BoxIter { src }
    }

    /// The next child box, or `None` once the range is used up exactly.
    pub(crate) fn next_box(&mut self) -> Result<Option<BMFFBox<'a>>> {
        if self.src.is_empty() {
            return Ok(None);
        }
        let head = read_box_header(self.src)?;
        let len = usize::try_from(head.payload_len()).map_err(|_| Error::Truncated { offset: self.src.offset() })?;
        let content = self.src.take(len)?;
        Ok(Some(BMFFBox { head, content }))
    }
}

#[cfg_attr(debug_assertions, track_caller)]
pub(crate) fn check_parser_state(src: &BMFFBox<'_>) -> Result<(), Error> {
    if src.content.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidData("unread box content or bad parser sync"))
    }
}

/// Check that `count` entries of at least `min_entry_size` bytes each can fit
/// in what is left of the box before allocating for them.
pub(crate) fn bounded_count<T: TryInto<usize>>(count: T, src: &BitStream<'_>, min_entry_size: usize) -> Result<usize> {
    let count: usize = count.try_into().map_err(|_| Error::InvalidData("entry count exceeds box payload"))?;
    if count.checked_mul(min_entry_size).is_none_or(|n| n > src.remaining()) {
        return Err(Error::InvalidData("entry count exceeds box payload"));
    }
    Ok(count)
}

/// Per-type payload codec. The header has already been consumed when
/// `read_body` runs and is written by [`IsoBox::write`] around `write_body`.
pub(crate) trait BoxCodec: Sized {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self>;
    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()>;
}

/// Generic container for boxes that only hold other boxes: `moov`, `trak`,
/// `mdia`, `minf`, `stbl`, `dinf` and `edts`.
#[derive(Debug, PartialEq)]
pub struct ContainerBox {
    pub box_type: BoxType,
    pub children: TryVec<IsoBox>,
}

impl ContainerBox {
    #[must_use]
    pub fn new(box_type: BoxType) -> Self {
        Self { box_type, children: TryVec::new() }
    }

    /// First direct child of the given type.
    pub fn child(&self, box_type: BoxType) -> Option<&IsoBox> {
        self.children.iter().find(|b| b.header.name == box_type)
    }

    /// First direct child container of the given type.
    pub fn container(&self, box_type: BoxType) -> Option<&ContainerBox> {
        match &self.child(box_type)?.body {
            BoxBody::Container(c) => Some(c),
            _ => None,
        }
    }
}

impl BoxCodec for ContainerBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(Self {
            box_type: src.head.name,
            children: read_children(src)?,
        })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        write_children(w, &self.children)
    }
}

/// Decoded payload of a box.
///
/// Every box type not listed here is kept as [`BoxBody::Unknown`] with its
/// payload bytes verbatim.
#[derive(Debug, PartialEq)]
pub enum BoxBody {
    FileType(FileTypeBox),
    Meta(MetaBox),
    Handler(HandlerBox),
    PrimaryItem(PrimaryItemBox),
    ItemInfo(ItemInfoBox),
    ItemInfoEntry(ItemInfoEntry),
    ItemReference(ItemReferenceBox),
    ItemLocation(ItemLocationBox),
    ItemData(ItemDataBox),
    ItemProperties(ItemPropertiesBox),
    ItemPropertyContainer(ItemPropertyContainerBox),
    ItemPropertyAssociation(ItemPropertyAssociationBox),
    ImageSpatialExtents(ImageSpatialExtentsProperty),
    HevcConfig(HevcConfigurationBox),
    AvcConfig(AvcConfigurationBox),
    Av1Config(Av1ConfigurationBox),
    JpegConfig(JpegConfigurationBox),
    ItemProtection(ItemProtectionBox),
    ProtectionSchemeInfo(ProtectionSchemeInfoBox),
    OriginalFormat(OriginalFormatBox),
    SchemeType(SchemeTypeBox),
    SchemeInformation(SchemeInformationBox),
    Container(ContainerBox),
    TrackHeader(TrackHeaderBox),
    MediaHeader(MediaHeaderBox),
    TimeToSample(TimeToSampleBox),
    SampleToChunk(SampleToChunkBox),
    SampleSize(SampleSizeBox),
    ChunkOffset(ChunkOffsetBox),
    MediaData(MediaDataBox),
    Unknown(TryVec<u8>),
}

impl BoxBody {
    fn read(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(match src.head.name {
            BoxType::FileTypeBox => Self::FileType(FileTypeBox::read_body(src)?),
            BoxType::MetadataBox => Self::Meta(MetaBox::read_body(src)?),
            BoxType::HandlerBox => Self::Handler(HandlerBox::read_body(src)?),
            BoxType::PrimaryItemBox => Self::PrimaryItem(PrimaryItemBox::read_body(src)?),
            BoxType::ItemInfoBox => Self::ItemInfo(ItemInfoBox::read_body(src)?),
            BoxType::ItemInfoEntry => Self::ItemInfoEntry(ItemInfoEntry::read_body(src)?),
            BoxType::ItemReferenceBox => Self::ItemReference(ItemReferenceBox::read_body(src)?),
            BoxType::ItemLocationBox => Self::ItemLocation(ItemLocationBox::read_body(src)?),
            BoxType::ItemDataBox => Self::ItemData(ItemDataBox::read_body(src)?),
            BoxType::ItemPropertiesBox => Self::ItemProperties(ItemPropertiesBox::read_body(src)?),
            BoxType::ItemPropertyContainerBox => Self::ItemPropertyContainer(ItemPropertyContainerBox::read_body(src)?),
            BoxType::ItemPropertyAssociationBox => {
                Self::ItemPropertyAssociation(ItemPropertyAssociationBox::read_body(src)?)
            },
            BoxType::ImageSpatialExtentsBox => Self::ImageSpatialExtents(ImageSpatialExtentsProperty::read_body(src)?),
            BoxType::HevcConfigurationBox => Self::HevcConfig(HevcConfigurationBox::read_body(src)?),
            BoxType::AvcConfigurationBox => Self::AvcConfig(AvcConfigurationBox::read_body(src)?),
            BoxType::Av1ConfigurationBox => Self::Av1Config(Av1ConfigurationBox::read_body(src)?),
            BoxType::JpegConfigurationBox => Self::JpegConfig(JpegConfigurationBox::read_body(src)?),
            BoxType::ItemProtectionBox => Self::ItemProtection(ItemProtectionBox::read_body(src)?),
            BoxType::ProtectionSchemeInfoBox => Self::ProtectionSchemeInfo(ProtectionSchemeInfoBox::read_body(src)?),
            BoxType::OriginalFormatBox => Self::OriginalFormat(OriginalFormatBox::read_body(src)?),
            BoxType::SchemeTypeBox => Self::SchemeType(SchemeTypeBox::read_body(src)?),
            BoxType::SchemeInformationBox => Self::SchemeInformation(SchemeInformationBox::read_body(src)?),
            BoxType::MovieBox
            | BoxType::TrackBox
            | BoxType::MediaBox
            | BoxType::MediaInformationBox
            | BoxType::SampleTableBox
            | BoxType::DataInformationBox
            | BoxType::EditBox => Self::Container(ContainerBox::read_body(src)?),
            BoxType::TrackHeaderBox => Self::TrackHeader(TrackHeaderBox::read_body(src)?),
            BoxType::MediaHeaderBox => Self::MediaHeader(MediaHeaderBox::read_body(src)?),
            BoxType::TimeToSampleBox => Self::TimeToSample(TimeToSampleBox::read_body(src)?),
            BoxType::SampleToChunkBox => Self::SampleToChunk(SampleToChunkBox::read_body(src)?),
            BoxType::SampleSizeBox => Self::SampleSize(SampleSizeBox::read_body(src)?),
            BoxType::ChunkOffsetBox | BoxType::ChunkLargeOffsetBox => {
                Self::ChunkOffset(ChunkOffsetBox::read_body(src)?)
            },
            BoxType::MediaDataBox => Self::MediaData(MediaDataBox::read_body(src)?),
            _ => {
                debug!("{:?} (kept opaque)", src.get_header());
                Self::Unknown(src.read_into_try_vec()?)
            },
        })
    }

    fn write(&self, w: &mut BitStreamWriter) -> Result<()> {
        match self {
            Self::FileType(b) => b.write_body(w),
            Self::Meta(b) => b.write_body(w),
            Self::Handler(b) => b.write_body(w),
            Self::PrimaryItem(b) => b.write_body(w),
            Self::ItemInfo(b) => b.write_body(w),
            Self::ItemInfoEntry(b) => b.write_body(w),
            Self::ItemReference(b) => b.write_body(w),
            Self::ItemLocation(b) => b.write_body(w),
            Self::ItemData(b) => b.write_body(w),
            Self::ItemProperties(b) => b.write_body(w),
            Self::ItemPropertyContainer(b) => b.write_body(w),
            Self::ItemPropertyAssociation(b) => b.write_body(w),
            Self::ImageSpatialExtents(b) => b.write_body(w),
            Self::HevcConfig(b) => b.write_body(w),
            Self::AvcConfig(b) => b.write_body(w),
            Self::Av1Config(b) => b.write_body(w),
            Self::JpegConfig(b) => b.write_body(w),
            Self::ItemProtection(b) => b.write_body(w),
            Self::ProtectionSchemeInfo(b) => b.write_body(w),
            Self::OriginalFormat(b) => b.write_body(w),
            Self::SchemeType(b) => b.write_body(w),
            Self::SchemeInformation(b) => b.write_body(w),
            Self::Container(b) => b.write_body(w),
            Self::TrackHeader(b) => b.write_body(w),
            Self::MediaHeader(b) => b.write_body(w),
            Self::TimeToSample(b) => b.write_body(w),
            Self::SampleToChunk(b) => b.write_body(w),
            Self::SampleSize(b) => b.write_body(w),
            Self::ChunkOffset(b) => b.write_body(w),
            Self::MediaData(b) => b.write_body(w),
            Self::Unknown(payload) => w.write_bytes(payload),
        }
    }

    /// The box type this body serializes as, or `None` for opaque payloads
    /// whose type lives only in their header.
    #[must_use]
    pub fn box_type(&self) -> Option<BoxType> {
        Some(match self {
            Self::FileType(_) => BoxType::FileTypeBox,
            Self::Meta(_) => BoxType::MetadataBox,
            Self::Handler(_) => BoxType::HandlerBox,
            Self::PrimaryItem(_) => BoxType::PrimaryItemBox,
            Self::ItemInfo(_) => BoxType::ItemInfoBox,
            Self::ItemInfoEntry(_) => BoxType::ItemInfoEntry,
            Self::ItemReference(_) => BoxType::ItemReferenceBox,
            Self::ItemLocation(_) => BoxType::ItemLocationBox,
            Self::ItemData(_) => BoxType::ItemDataBox,
            Self::ItemProperties(_) => BoxType::ItemPropertiesBox,
            Self::ItemPropertyContainer(_) => BoxType::ItemPropertyContainerBox,
            Self::ItemPropertyAssociation(_) => BoxType::ItemPropertyAssociationBox,
            Self::ImageSpatialExtents(_) => BoxType::ImageSpatialExtentsBox,
            Self::HevcConfig(_) => BoxType::HevcConfigurationBox,
            Self::AvcConfig(_) => BoxType::AvcConfigurationBox,
            Self::Av1Config(_) => BoxType::Av1ConfigurationBox,
            Self::JpegConfig(_) => BoxType::JpegConfigurationBox,
            Self::ItemProtection(_) => BoxType::ItemProtectionBox,
            Self::ProtectionSchemeInfo(_) => BoxType::ProtectionSchemeInfoBox,
            Self::OriginalFormat(_) => BoxType::OriginalFormatBox,
            Self::SchemeType(_) => BoxType::SchemeTypeBox,
            Self::SchemeInformation(_) => BoxType::SchemeInformationBox,
            Self::Container(c) => c.box_type,
            Self::TrackHeader(_) => BoxType::TrackHeaderBox,
            Self::MediaHeader(_) => BoxType::MediaHeaderBox,
            Self::TimeToSample(_) => BoxType::TimeToSampleBox,
            Self::SampleToChunk(_) => BoxType::SampleToChunkBox,
            Self::SampleSize(_) => BoxType::SampleSizeBox,
            Self::ChunkOffset(c) if c.large => BoxType::ChunkLargeOffsetBox,
            Self::ChunkOffset(_) => BoxType::ChunkOffsetBox,
            Self::MediaData(_) => BoxType::MediaDataBox,
            Self::Unknown(_) => return None,
        })
    }
}

/// One node of the box tree.
#[derive(Debug, PartialEq)]
pub struct IsoBox {
    pub header: BoxHeader,
    pub body: BoxBody,
}

impl IsoBox {
    /// Wrap a typed body with a fresh compact header.
    pub fn new(body: BoxBody) -> Result<Self> {
        let name = body
            .box_type()
            .ok_or(Error::InvalidArgument("opaque bodies need an explicit type, use IsoBox::opaque"))?;
        Ok(Self { header: BoxHeader::new(name), body })
    }

    /// A box whose payload is carried verbatim.
    pub fn opaque(fourcc: FourCC, payload: TryVec<u8>) -> Self {
        Self {
            header: BoxHeader::new(fourcc),
            body: BoxBody::Unknown(payload),
        }
    }

    #[must_use]
    pub fn fourcc(&self) -> FourCC {
        self.header.fourcc()
    }

    /// Parse the body of a box whose header has been read.
    pub(crate) fn read(src: &mut BMFFBox<'_>) -> Result<Self> {
        fn parse(src: &mut BMFFBox<'_>) -> Result<BoxBody> {
            let body = BoxBody::read(src)?;
            check_parser_state(src)?;
            Ok(body)
        }
        let header = *src.get_header();
        let body = parse(src).map_err(|e| e.in_box(header.fourcc(), header.start))?;
        Ok(Self { header, body })
    }

    /// Serialize header and body, then patch the size field with the number
    /// of bytes produced.
    pub fn write(&self, w: &mut BitStreamWriter) -> Result<()> {
        let start = w.position();
        self.write_unwrapped(w, start)
            .map_err(|e| e.in_box(self.fourcc(), start.to_u64()))
    }

    fn write_unwrapped(&self, w: &mut BitStreamWriter, start: usize) -> Result<()> {
        let uuid = match (self.header.name, self.header.uuid) {
            (BoxType::UuidBox, Some(uuid)) => Some(uuid),
            (BoxType::UuidBox, None) => return Err(Error::InvalidArgument("uuid box without extended type")),
            _ => None,
        };
        write_box(w, start, self.fourcc(), self.header.size_field, uuid, |w| self.body.write(w))
    }
}

/// Write a box header in the given size encoding, the body, then patch the
/// size. Entry lists that keep their children as bare bodies (`iinf`, `iref`,
/// `ipro`) go through here too so they reproduce the encoding they were read
/// with.
pub(crate) fn write_box(
    w: &mut BitStreamWriter,
    start: usize,
    fourcc: FourCC,
    size_field: SizeField,
    uuid: Option<[u8; 16]>,
    body: impl FnOnce(&mut BitStreamWriter) -> Result<()>,
) -> Result<()> {
    w.write_u32(if size_field == SizeField::Large { 1 } else { 0 })?;
    w.write_fourcc(fourcc)?;
    if size_field == SizeField::Large {
        w.write_u64(0)?;
    }
    if let Some(uuid) = uuid {
        w.write_bytes(&uuid)?;
    }
    body(w)?;
    let size = (w.position() - start).to_u64();
    match size_field {
        SizeField::Compact => {
            let size = u32::try_from(size).map_err(|_| Error::Overflow("box too large for a 32-bit size"))?;
            w.patch_u32(start, size)
        },
        SizeField::Large => w.patch_u64(start + 8, size),
        SizeField::UntilEof => Ok(()),
    }
}

/// Parse every child box of `src` into typed nodes.
pub(crate) fn read_children(src: &mut BMFFBox<'_>) -> Result<TryVec<IsoBox>> {
    let mut children = TryVec::new();
    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        children.push(IsoBox::read(&mut b)?)?;
    }
    Ok(children)
}

pub(crate) fn write_children(w: &mut BitStreamWriter, children: &[IsoBox]) -> Result<()> {
    for child in children {
        child.write(w)?;
    }
    Ok(())
}

/// Parse a buffer holding a sequence of boxes.
///
/// The whole sequence is returned or nothing is: any failure inside a box
/// aborts the parse and is reported with the box type and offset.
pub fn read_boxes(data: &[u8]) -> Result<TryVec<IsoBox>> {
    let mut src = BitStream::new(data);
    let mut boxes = TryVec::new();
    let mut iter = BoxIter::new(&mut src);
    while let Some(mut b) = iter.next_box()? {
        boxes.push(IsoBox::read(&mut b)?)?;
    }
    Ok(boxes)
}

/// Serialize a sequence of boxes.
pub fn write_boxes(boxes: &[IsoBox]) -> Result<std::vec::Vec<u8>> {
    let mut w = BitStreamWriter::new();
    write_children(&mut w, boxes)?;
    w.into_inner()
}

#[test]
fn header_size_encodings() {
    let mut compact = BitStream::new(b"\0\0\0\x0cfree\0\0\0\0");
    let h = read_box_header(&mut compact).unwrap();
    assert_eq!((h.size, h.offset, h.size_field), (12, 8, SizeField::Compact));

    let mut large = BitStream::new(b"\0\0\0\x01free\0\0\0\0\0\0\0\x10");
    let h = read_box_header(&mut large).unwrap();
    assert_eq!((h.size, h.offset, h.size_field), (16, 16, SizeField::Large));

    let mut eof = BitStream::new(b"\0\0\0\0mdatabcdef");
    let h = read_box_header(&mut eof).unwrap();
    assert_eq!((h.size, h.offset, h.size_field), (14, 8, SizeField::UntilEof));

    let mut tiny = BitStream::new(b"\0\0\0\x04free");
    assert!(matches!(read_box_header(&mut tiny), Err(Error::InvalidData(_))));
}

#[test]
fn uuid_box_round_trips() {
    let mut data = std::vec::Vec::new();
    data.extend_from_slice(b"\0\0\0\x1buuid");
    data.extend_from_slice(&[0xa5; 16]);
    data.extend_from_slice(b"xyz");
    let boxes = read_boxes(&data).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].header.uuid, Some([0xa5; 16]));
    assert!(matches!(&boxes[0].body, BoxBody::Unknown(p) if &p[..] == b"xyz"));
    assert_eq!(write_boxes(&boxes).unwrap(), data);
}

#[test]
fn large_and_until_eof_sizes_are_preserved() {
    let mut data = std::vec::Vec::new();
    data.extend_from_slice(b"\0\0\0\x01skip\0\0\0\0\0\0\0\x12hi");
    data.extend_from_slice(b"\0\0\0\0mdat\x01\x02\x03");
    let boxes = read_boxes(&data).unwrap();
    assert_eq!(boxes[0].header.size_field, SizeField::Large);
    assert_eq!(boxes[1].header.size_field, SizeField::UntilEof);
    assert_eq!(write_boxes(&boxes).unwrap(), data);
}

#[test]
fn child_overrunning_parent_is_rejected() {
    // 'moov' claims 16 bytes but its child claims 12 of the 8 left
    let data = b"\0\0\0\x10moov\0\0\0\x0cfree\0\0\0\0";
    match read_boxes(data) {
        Err(Error::InBox { box_type, offset: 0, source }) => {
            assert_eq!(box_type, b"moov");
            assert!(matches!(*source, Error::Truncated { .. }));
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn trailing_partial_header_is_truncation() {
    let data = b"\0\0\0\x08free\0\0";
    assert!(matches!(read_boxes(data), Err(Error::Truncated { offset: 8 })));
}
