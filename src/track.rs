// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Movie and track boxes, and the sample table that locates each sample of
//! an image sequence.

use crate::bitstream::BitStreamWriter;
use crate::bmff::{bounded_count, BMFFBox, BoxBody, BoxCodec, ContainerBox, FullBoxHeader};
use crate::{BoxType, Error, FourCC, Result, ToU64 as _, ToUsize as _, TryVec};
use log::debug;

/// Write a value that is 32 bits wide in version 0 and 64 bits in version 1.
fn write_versioned(w: &mut BitStreamWriter, version: u8, value: u64) -> Result<()> {
    if version == 1 {
        w.write_u64(value)
    } else {
        let value = u32::try_from(value).map_err(|_| Error::Overflow("value needs a version 1 box"))?;
        w.write_u32(value)
    }
}

fn read_versioned(src: &mut BMFFBox<'_>, version: u8) -> Result<u64> {
    match version {
        0 => Ok(u64::from(src.read_u32()?)),
        1 => src.read_u64(),
        _ => Err(Error::Unsupported("unknown full box version")),
    }
}

/// Track header box 'tkhd'
/// See ISO 14496-12:2015 § 8.3.2
#[derive(Debug, PartialEq)]
pub struct TrackHeaderBox {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: u16,
    pub alternate_group: u16,
    pub volume: u16,
    pub matrix: [u32; 9],
    /// 16.16 fixed point.
    pub width: u32,
    /// 16.16 fixed point.
    pub height: u32,
    /// The reserved fields after track_id, after duration (two), and after
    /// volume, as found.
    pub reserved: [u32; 4],
}

impl TrackHeaderBox {
    /// A visual track header; `width` and `height` are whole pixels and must
    /// fit the 16.16 fixed-point fields.
    pub fn new(track_id: u32, width: u32, height: u32) -> Result<Self> {
        let fixed = |v: u32| v.checked_mul(0x1_0000).ok_or(Error::Overflow("tkhd size needs more than 16 integer bits"));
        Ok(Self {
            version: 0,
            flags: 0x7,
            creation_time: 0,
            modification_time: 0,
            track_id,
            duration: 0,
            layer: 0,
            alternate_group: 0,
            volume: 0,
            matrix: [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000],
            width: fixed(width)?,
            height: fixed(height)?,
            reserved: [0; 4],
        })
    }
}

impl BoxCodec for TrackHeaderBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let creation_time = read_versioned(src, version)?;
        let modification_time = read_versioned(src, version)?;
        let track_id = src.read_u32()?;
        let r0 = src.read_u32()?;
        let duration = read_versioned(src, version)?;
        let r1 = src.read_u32()?;
        let r2 = src.read_u32()?;
        let layer = src.read_u16()?;
        let alternate_group = src.read_u16()?;
        let volume = src.read_u16()?;
        let r3 = u32::from(src.read_u16()?);
        let mut matrix = [0; 9];
        for m in &mut matrix {
            *m = src.read_u32()?;
        }
        let width = src.read_u32()?;
        let height = src.read_u32()?;
        Ok(Self {
            version,
            flags,
            creation_time,
            modification_time,
            track_id,
            duration,
            layer,
            alternate_group,
            volume,
            matrix,
            width,
            height,
            reserved: [r0, r1, r2, r3],
        })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        write_versioned(w, self.version, self.creation_time)?;
        write_versioned(w, self.version, self.modification_time)?;
        w.write_u32(self.track_id)?;
        w.write_u32(self.reserved[0])?;
        write_versioned(w, self.version, self.duration)?;
        w.write_u32(self.reserved[1])?;
        w.write_u32(self.reserved[2])?;
        w.write_u16(self.layer)?;
        w.write_u16(self.alternate_group)?;
        w.write_u16(self.volume)?;
        let r3 = u16::try_from(self.reserved[3]).map_err(|_| Error::Overflow("tkhd reserved field is 16 bits"))?;
        w.write_u16(r3)?;
        for m in self.matrix {
            w.write_u32(m)?;
        }
        w.write_u32(self.width)?;
        w.write_u32(self.height)
    }
}

/// Media header box 'mdhd'
/// See ISO 14496-12:2015 § 8.4.2
#[derive(Debug, PartialEq)]
pub struct MediaHeaderBox {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// Padding bit plus three 5-bit ISO-639-2/T letters.
    pub language: u16,
    pub pre_defined: u16,
}

impl MediaHeaderBox {
    #[must_use]
    pub fn new(timescale: u32, duration: u64) -> Self {
        Self {
            version: if duration > u64::from(u32::MAX) { 1 } else { 0 },
            flags: 0,
            creation_time: 0,
            modification_time: 0,
            timescale,
            duration,
            language: 0x55c4, // "und"
            pre_defined: 0,
        }
    }
}

impl BoxCodec for MediaHeaderBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let creation_time = read_versioned(src, version)?;
        let modification_time = read_versioned(src, version)?;
        let timescale = src.read_u32()?;
        let duration = read_versioned(src, version)?;
        let language = src.read_u16()?;
        let pre_defined = src.read_u16()?;
        Ok(Self { version, flags, creation_time, modification_time, timescale, duration, language, pre_defined })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        write_versioned(w, self.version, self.creation_time)?;
        write_versioned(w, self.version, self.modification_time)?;
        w.write_u32(self.timescale)?;
        write_versioned(w, self.version, self.duration)?;
        w.write_u16(self.language)?;
        w.write_u16(self.pre_defined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSampleEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Time to sample box 'stts'
/// See ISO 14496-12:2015 § 8.6.1.2
#[derive(Debug, PartialEq, Default)]
pub struct TimeToSampleBox {
    pub version: u8,
    pub flags: u32,
    pub entries: TryVec<TimeToSampleEntry>,
}

impl BoxCodec for TimeToSampleBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let entry_count = src.read_u32()?;
        let mut entries = TryVec::with_capacity(bounded_count(entry_count, src, 8)?)?;
        for _ in 0..entry_count {
            entries.push(TimeToSampleEntry {
                sample_count: src.read_u32()?,
                sample_delta: src.read_u32()?,
            })?;
        }
        Ok(Self { version, flags, entries })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        w.write_u32(u32::try_from(self.entries.len())?)?;
        for e in self.entries.iter() {
            w.write_u32(e.sample_count)?;
            w.write_u32(e.sample_delta)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    /// 1-based.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Sample to chunk box 'stsc'
/// See ISO 14496-12:2015 § 8.7.4
#[derive(Debug, PartialEq, Default)]
pub struct SampleToChunkBox {
    pub version: u8,
    pub flags: u32,
    pub entries: TryVec<SampleToChunkEntry>,
}

impl BoxCodec for SampleToChunkBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let entry_count = src.read_u32()?;
        let mut entries = TryVec::with_capacity(bounded_count(entry_count, src, 12)?)?;
        for _ in 0..entry_count {
            entries.push(SampleToChunkEntry {
                first_chunk: src.read_u32()?,
                samples_per_chunk: src.read_u32()?,
                sample_description_index: src.read_u32()?,
            })?;
        }
        Ok(Self { version, flags, entries })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        w.write_u32(u32::try_from(self.entries.len())?)?;
        for e in self.entries.iter() {
            w.write_u32(e.first_chunk)?;
            w.write_u32(e.samples_per_chunk)?;
            w.write_u32(e.sample_description_index)?;
        }
        Ok(())
    }
}

/// Sample size box 'stsz'
/// See ISO 14496-12:2015 § 8.7.3
#[derive(Debug, PartialEq, Default)]
pub struct SampleSizeBox {
    pub version: u8,
    pub flags: u32,
    /// Size shared by every sample, or 0 when sizes are listed.
    pub sample_size: u32,
    pub sample_count: u32,
    pub entry_sizes: TryVec<u32>,
}

impl SampleSizeBox {
    pub fn size_of(&self, index: usize) -> Result<u32> {
        let count = self.sample_count.to_usize();
        if index >= count {
            return Err(Error::IndexOutOfRange { index, count });
        }
        if self.sample_size != 0 {
            return Ok(self.sample_size);
        }
        self.entry_sizes.get(index).copied().ok_or(Error::InvalidData("stsz lists fewer sizes than samples"))
    }
}

impl BoxCodec for SampleSizeBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let sample_size = src.read_u32()?;
        let sample_count = src.read_u32()?;
        let mut entry_sizes = TryVec::new();
        if sample_size == 0 {
            entry_sizes = TryVec::with_capacity(bounded_count(sample_count, src, 4)?)?;
            for _ in 0..sample_count {
                entry_sizes.push(src.read_u32()?)?;
            }
        }
        Ok(Self { version, flags, sample_size, sample_count, entry_sizes })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        if self.sample_size == 0 && self.entry_sizes.len() != self.sample_count.to_usize() {
            return Err(Error::InvalidArgument("stsz sample count disagrees with listed sizes"));
        }
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        w.write_u32(self.sample_size)?;
        w.write_u32(self.sample_count)?;
        if self.sample_size == 0 {
            for &size in self.entry_sizes.iter() {
                w.write_u32(size)?;
            }
        }
        Ok(())
    }
}

/// Chunk offset box 'stco' or 'co64'
/// See ISO 14496-12:2015 § 8.7.5
#[derive(Debug, PartialEq, Default)]
pub struct ChunkOffsetBox {
    pub version: u8,
    pub flags: u32,
    /// Serialize as 'co64'.
    pub large: bool,
    pub offsets: TryVec<u64>,
}

impl BoxCodec for ChunkOffsetBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let large = src.head.name == BoxType::ChunkLargeOffsetBox;
        let FullBoxHeader { version, flags } = FullBoxHeader::read(src)?;
        let entry_count = src.read_u32()?;
        let mut offsets = TryVec::with_capacity(bounded_count(entry_count, src, if large { 8 } else { 4 })?)?;
        for _ in 0..entry_count {
            let offset = if large { src.read_u64()? } else { u64::from(src.read_u32()?) };
            offsets.push(offset)?;
        }
        Ok(Self { version, flags, large, offsets })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        FullBoxHeader::new(self.version, self.flags).write(w)?;
        w.write_u32(u32::try_from(self.offsets.len())?)?;
        for &offset in self.offsets.iter() {
            if self.large {
                w.write_u64(offset)?;
            } else {
                w.write_u32(u32::try_from(offset).map_err(|_| Error::Overflow("chunk offset needs co64"))?)?;
            }
        }
        Ok(())
    }
}

/// The resolved sample tables of one track.
#[derive(Debug, Default)]
pub struct SampleTable {
    time_to_sample: TryVec<TimeToSampleEntry>,
    sample_to_chunk: TryVec<SampleToChunkEntry>,
    sample_size: u32,
    sample_count: u32,
    sample_sizes: TryVec<u32>,
    chunk_offsets: TryVec<u64>,
}

impl SampleTable {
    /// Collect the tables of an `stbl` box. Missing tables are treated as
    /// empty.
    pub fn from_stbl(stbl: &ContainerBox) -> Result<Self> {
        let mut table = Self::default();
        for child in stbl.children.iter() {
            match &child.body {
                BoxBody::TimeToSample(stts) => {
                    for &e in stts.entries.iter() {
                        table.time_to_sample.push(e)?;
                    }
                },
                BoxBody::SampleToChunk(stsc) => {
                    for &e in stsc.entries.iter() {
                        table.sample_to_chunk.push(e)?;
                    }
                },
                BoxBody::SampleSize(stsz) => {
                    table.sample_size = stsz.sample_size;
                    table.sample_count = stsz.sample_count;
                    table.sample_sizes.extend_from_slice(&stsz.entry_sizes)?;
                },
                BoxBody::ChunkOffset(stco) => {
                    table.chunk_offsets.extend_from_slice(&stco.offsets)?;
                },
                _ => debug!("ignoring '{}' in stbl", child.fourcc()),
            }
        }
        Ok(table)
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let count = self.sample_count.to_usize();
        if index < count { Ok(()) } else { Err(Error::IndexOutOfRange { index, count }) }
    }

    pub fn sample_size(&self, index: usize) -> Result<u32> {
        self.check_index(index)?;
        if self.sample_size != 0 {
            return Ok(self.sample_size);
        }
        self.sample_sizes.get(index).copied().ok_or(Error::InvalidData("stsz lists fewer sizes than samples"))
    }

    /// Absolute file offset and size of a sample, found by walking the
    /// sample-to-chunk runs.
    pub fn sample_location(&self, index: usize) -> Result<(u64, u32)> {
        let size = self.sample_size(index)?;
        let chunk_count = self.chunk_offsets.len().to_u64();
        let target = index.to_u64();
        let mut first_sample = 0u64;
        for (i, entry) in self.sample_to_chunk.iter().enumerate() {
            if entry.first_chunk == 0 {
                return Err(Error::InvalidData("stsc chunk numbers are 1-based"));
            }
            let next_first_chunk = self
                .sample_to_chunk
                .get(i + 1)
                .map_or(chunk_count + 1, |e| u64::from(e.first_chunk));
            let chunks = next_first_chunk.saturating_sub(u64::from(entry.first_chunk));
            let per_chunk = u64::from(entry.samples_per_chunk);
            let run = chunks.checked_mul(per_chunk).ok_or(Error::InvalidData("stsc run overflow"))?;
            if per_chunk == 0 || target >= first_sample + run {
                first_sample += run;
                continue;
            }
            let within_run = target - first_sample;
            let chunk = u64::from(entry.first_chunk) + within_run / per_chunk;
            let first_in_chunk = index - (within_run % per_chunk) as usize;
            let chunk_offset = *self
                .chunk_offsets
                .get(usize::try_from(chunk - 1)?)
                .ok_or(Error::InvalidData("stsc refers past the last chunk"))?;
            let mut offset = chunk_offset;
            for prev in first_in_chunk..index {
                offset = offset
                    .checked_add(u64::from(self.sample_size(prev)?))
                    .ok_or(Error::InvalidData("sample offset overflow"))?;
            }
            return Ok((offset, size));
        }
        Err(Error::InvalidData("sample not found in chunk table"))
    }

    /// Duration of a sample in media timescale units.
    pub fn sample_duration(&self, index: usize) -> Result<u32> {
        self.check_index(index)?;
        let target = index.to_u64();
        let mut first_sample = 0u64;
        for entry in self.time_to_sample.iter() {
            first_sample += u64::from(entry.sample_count);
            if target < first_sample {
                return Ok(entry.sample_delta);
            }
        }
        Err(Error::InvalidData("sample not covered by stts"))
    }
}

/// What a track Context knows about its track beyond its metadata items.
#[derive(Debug)]
pub struct TrackInfo {
    pub track_id: u32,
    /// `pict` for image sequences, `vide` for video.
    pub handler_type: Option<FourCC>,
    pub timescale: u32,
    pub duration: u64,
    /// Integer part of the 16.16 presentation size.
    pub width: u32,
    pub height: u32,
    pub sample_table: SampleTable,
}

impl TrackInfo {
    /// Gather the header, media header, handler and sample tables of a
    /// `trak` box.
    pub fn from_trak(trak: &ContainerBox) -> Result<Self> {
        let tkhd = match trak.child(BoxType::TrackHeaderBox).map(|b| &b.body) {
            Some(BoxBody::TrackHeader(tkhd)) => tkhd,
            _ => return Err(Error::InvalidData("trak without tkhd")),
        };
        if tkhd.track_id == 0 {
            return Err(Error::InvalidData("track id 0 is reserved"));
        }
        let mut info = Self {
            track_id: tkhd.track_id,
            handler_type: None,
            timescale: 0,
            duration: tkhd.duration,
            width: tkhd.width >> 16,
            height: tkhd.height >> 16,
            sample_table: SampleTable::default(),
        };
        let Some(mdia) = trak.container(BoxType::MediaBox) else {
            debug!("track {} has no mdia", info.track_id);
            return Ok(info);
        };
        for child in mdia.children.iter() {
            match &child.body {
                BoxBody::MediaHeader(mdhd) => {
                    info.timescale = mdhd.timescale;
                    info.duration = mdhd.duration;
                },
                BoxBody::Handler(hdlr) => info.handler_type = Some(hdlr.handler_type),
                _ => {},
            }
        }
        if let Some(stbl) = mdia
            .container(BoxType::MediaInformationBox)
            .and_then(|minf| minf.container(BoxType::SampleTableBox))
        {
            info.sample_table = SampleTable::from_stbl(stbl)?;
        }
        Ok(info)
    }

    /// Whether this is an image sequence or video track.
    #[must_use]
    pub fn is_visual(&self) -> bool {
        self.handler_type.is_some_and(|h| h == FourCC::PICT || h == FourCC::VIDE)
    }
}

#[cfg(test)]
fn stbl(stsc: &[(u32, u32)], sizes: &[u32], offsets: &[u64], stts: &[(u32, u32)]) -> ContainerBox {
    use crate::bmff::IsoBox;

    let mut table = ContainerBox::new(BoxType::SampleTableBox);
    let mut b = SampleToChunkBox::default();
    for &(first_chunk, samples_per_chunk) in stsc {
        b.entries
            .push(SampleToChunkEntry { first_chunk, samples_per_chunk, sample_description_index: 1 })
            .unwrap();
    }
    table.children.push(IsoBox::new(BoxBody::SampleToChunk(b)).unwrap()).unwrap();
    let mut b = SampleSizeBox { sample_count: sizes.len() as u32, ..Default::default() };
    b.entry_sizes.extend_from_slice(sizes).unwrap();
    table.children.push(IsoBox::new(BoxBody::SampleSize(b)).unwrap()).unwrap();
    let mut b = ChunkOffsetBox::default();
    b.offsets.extend_from_slice(offsets).unwrap();
    table.children.push(IsoBox::new(BoxBody::ChunkOffset(b)).unwrap()).unwrap();
    let mut b = TimeToSampleBox::default();
    for &(sample_count, sample_delta) in stts {
        b.entries.push(TimeToSampleEntry { sample_count, sample_delta }).unwrap();
    }
    table.children.push(IsoBox::new(BoxBody::TimeToSample(b)).unwrap()).unwrap();
    table
}

#[test]
fn sample_locations_follow_chunk_runs() {
    // chunks 1-2 hold two samples each, chunk 3 holds one
    let table = SampleTable::from_stbl(&stbl(
        &[(1, 2), (3, 1)],
        &[10, 20, 30, 40, 50],
        &[1000, 2000, 3000],
        &[(3, 100), (2, 50)],
    ))
    .unwrap();
    assert_eq!(table.sample_count(), 5);
    assert_eq!(table.sample_location(0).unwrap(), (1000, 10));
    assert_eq!(table.sample_location(1).unwrap(), (1010, 20));
    assert_eq!(table.sample_location(2).unwrap(), (2000, 30));
    assert_eq!(table.sample_location(3).unwrap(), (2030, 40));
    assert_eq!(table.sample_location(4).unwrap(), (3000, 50));
    assert!(matches!(table.sample_location(5), Err(Error::IndexOutOfRange { index: 5, count: 5 })));
    assert_eq!(table.sample_duration(2).unwrap(), 100);
    assert_eq!(table.sample_duration(3).unwrap(), 50);
}

#[test]
fn sample_past_last_chunk_is_invalid() {
    let table = SampleTable::from_stbl(&stbl(&[(1, 1)], &[4, 4], &[8], &[(2, 1)])).unwrap();
    assert_eq!(table.sample_location(0).unwrap(), (8, 4));
    assert!(matches!(table.sample_location(1), Err(Error::InvalidData(_))));
}

#[test]
fn track_boxes_round_trip() {
    use crate::bmff::IsoBox;

    let mut tkhd = TrackHeaderBox::new(1, 640, 480).unwrap();
    tkhd.version = 1;
    tkhd.duration = u64::from(u32::MAX) + 1;
    let boxes = [
        IsoBox::new(BoxBody::TrackHeader(tkhd)).unwrap(),
        IsoBox::new(BoxBody::MediaHeader(MediaHeaderBox::new(90000, 3000))).unwrap(),
        IsoBox::new(BoxBody::ChunkOffset(ChunkOffsetBox {
            large: true,
            offsets: {
                let mut o = TryVec::new();
                o.push(1 << 40).unwrap();
                o
            },
            ..Default::default()
        }))
        .unwrap(),
        IsoBox::new(BoxBody::SampleSize(SampleSizeBox { sample_size: 7, sample_count: 3, ..Default::default() })).unwrap(),
    ];
    let bytes = crate::write_boxes(&boxes).unwrap();
    let reread = crate::read_boxes(&bytes).unwrap();
    assert!(reread.iter().map(|b| &b.body).eq(boxes.iter().map(|b| &b.body)));
    assert_eq!(reread[2].fourcc(), b"co64");
    assert_eq!(crate::write_boxes(&reread).unwrap(), bytes);
}

#[test]
fn stco_rejects_wide_offsets() {
    use crate::bmff::IsoBox;

    let mut stco = ChunkOffsetBox::default();
    stco.offsets.push(u64::from(u32::MAX) + 1).unwrap();
    let err = crate::write_boxes(&[IsoBox::new(BoxBody::ChunkOffset(stco)).unwrap()]).unwrap_err();
    assert!(matches!(err.root_cause(), Error::Overflow(_)));
}

#[test]
fn tkhd_size_must_fit_fixed_point() {
    let tkhd = TrackHeaderBox::new(1, 65535, 1).unwrap();
    assert_eq!(tkhd.width, 0xffff_0000);
    assert!(matches!(TrackHeaderBox::new(1, 65536, 1), Err(Error::Overflow(_))));
    assert!(matches!(TrackHeaderBox::new(1, 1, u32::MAX), Err(Error::Overflow(_))));
}

#[test]
fn empty_sample_tables_round_trip() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 16, b's', b't', b't', b's', 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 20, b's', b't', b's', b'z', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ];
    let boxes = crate::read_boxes(&data).unwrap();
    let BoxBody::TimeToSample(stts) = &boxes[0].body else { panic!("not stts") };
    assert!(stts.entries.is_empty());
    let BoxBody::SampleSize(stsz) = &boxes[1].body else { panic!("not stsz") };
    assert_eq!((stsz.sample_size, stsz.sample_count), (0, 0));
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
}
