// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder configuration records carried as item properties, and the
//! conversion of item payloads into self-contained elementary streams.

use crate::bitstream::{BitStream, BitStreamWriter};
use crate::bmff::{bounded_count, BMFFBox, BoxBody, BoxCodec, IsoBox};
use crate::{Error, Result, TryVec};

const START_CODE: [u8; 4] = [0, 0, 0, 1];

fn read_nal(src: &mut BitStream<'_>) -> Result<TryVec<u8>> {
    let len = src.read_u16()?;
    let bytes = src.read_bytes(usize::from(len))?;
    let mut nal = TryVec::with_capacity(bytes.len())?;
    nal.extend_from_slice(bytes)?;
    Ok(nal)
}

fn write_nal(w: &mut BitStreamWriter, nal: &[u8]) -> Result<()> {
    let len = u16::try_from(nal.len()).map_err(|_| Error::Overflow("parameter set longer than 64 KiB"))?;
    w.write_u16(len)?;
    w.write_bytes(nal)
}

#[derive(Debug, PartialEq)]
pub struct HevcNalArray {
    pub array_completeness: bool,
    pub reserved: bool,
    pub nal_unit_type: u8,
    pub nal_units: TryVec<TryVec<u8>>,
}

/// `hvcC`: HEVC decoder configuration record.
///
/// See ISO 14496-15:2017 § 8.3.3.1
#[derive(Debug, PartialEq)]
pub struct HevcConfigurationBox {
    pub configuration_version: u8,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_constraint_indicator_flags: u64,
    pub general_level_idc: u8,
    pub min_spatial_segmentation_idc: u16,
    pub parallelism_type: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub avg_frame_rate: u16,
    pub constant_frame_rate: u8,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
    pub length_size_minus_one: u8,
    pub arrays: TryVec<HevcNalArray>,
    /// Reserved bit runs before min_spatial_segmentation_idc, parallelism_type,
    /// chroma_format_idc and the two bit depths, in that order. All ones when
    /// written by a conforming muxer.
    pub reserved_bits: [u8; 5],
}

impl Default for HevcConfigurationBox {
    fn default() -> Self {
        Self {
            configuration_version: 1,
            general_profile_space: 0,
            general_tier_flag: false,
            general_profile_idc: 0,
            general_profile_compatibility_flags: 0,
            general_constraint_indicator_flags: 0,
            general_level_idc: 0,
            min_spatial_segmentation_idc: 0,
            parallelism_type: 0,
            chroma_format_idc: 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            avg_frame_rate: 0,
            constant_frame_rate: 0,
            num_temporal_layers: 1,
            temporal_id_nested: false,
            length_size_minus_one: 3,
            arrays: TryVec::new(),
            reserved_bits: [0xf, 0x3f, 0x3f, 0x1f, 0x1f],
        }
    }
}

impl BoxCodec for HevcConfigurationBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let configuration_version = src.read_u8()?;
        if configuration_version != 1 {
            return Err(Error::Unsupported("hvcC configuration version"));
        }
        let general_profile_space = src.read_bits(2)? as u8;
        let general_tier_flag = src.read_bool()?;
        let general_profile_idc = src.read_bits(5)? as u8;
        let general_profile_compatibility_flags = src.read_u32()?;
        let general_constraint_indicator_flags = src.read_bits(48)?;
        let general_level_idc = src.read_u8()?;
        let r0 = src.read_bits(4)? as u8;
        let min_spatial_segmentation_idc = src.read_bits(12)? as u16;
        let r1 = src.read_bits(6)? as u8;
        let parallelism_type = src.read_bits(2)? as u8;
        let r2 = src.read_bits(6)? as u8;
        let chroma_format_idc = src.read_bits(2)? as u8;
        let r3 = src.read_bits(5)? as u8;
        let bit_depth_luma_minus8 = src.read_bits(3)? as u8;
        let r4 = src.read_bits(5)? as u8;
        let bit_depth_chroma_minus8 = src.read_bits(3)? as u8;
        let avg_frame_rate = src.read_u16()?;
        let constant_frame_rate = src.read_bits(2)? as u8;
        let num_temporal_layers = src.read_bits(3)? as u8;
        let temporal_id_nested = src.read_bool()?;
        let length_size_minus_one = src.read_bits(2)? as u8;
        if length_size_minus_one == 2 {
            return Err(Error::InvalidData("hvcC NAL length size of 3 bytes"));
        }

        let num_arrays = src.read_u8()?;
        let mut arrays = TryVec::with_capacity(bounded_count(num_arrays, src, 3)?)?;
        for _ in 0..num_arrays {
            let array_completeness = src.read_bool()?;
            let reserved = src.read_bool()?;
            let nal_unit_type = src.read_bits(6)? as u8;
            let num_nalus = src.read_u16()?;
            let mut nal_units = TryVec::with_capacity(bounded_count(num_nalus, src, 2)?)?;
            for _ in 0..num_nalus {
                nal_units.push(read_nal(src)?)?;
            }
            arrays.push(HevcNalArray { array_completeness, reserved, nal_unit_type, nal_units })?;
        }

        Ok(Self {
            configuration_version,
            general_profile_space,
            general_tier_flag,
            general_profile_idc,
            general_profile_compatibility_flags,
            general_constraint_indicator_flags,
            general_level_idc,
            min_spatial_segmentation_idc,
            parallelism_type,
            chroma_format_idc,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            avg_frame_rate,
            constant_frame_rate,
            num_temporal_layers,
            temporal_id_nested,
            length_size_minus_one,
            arrays,
            reserved_bits: [r0, r1, r2, r3, r4],
        })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        let [r0, r1, r2, r3, r4] = self.reserved_bits.map(u64::from);
        w.write_u8(self.configuration_version)?;
        w.write_bits(u64::from(self.general_profile_space), 2)?;
        w.write_bool(self.general_tier_flag)?;
        w.write_bits(u64::from(self.general_profile_idc), 5)?;
        w.write_u32(self.general_profile_compatibility_flags)?;
        w.write_bits(self.general_constraint_indicator_flags, 48)?;
        w.write_u8(self.general_level_idc)?;
        w.write_bits(r0, 4)?;
        w.write_bits(u64::from(self.min_spatial_segmentation_idc), 12)?;
        w.write_bits(r1, 6)?;
        w.write_bits(u64::from(self.parallelism_type), 2)?;
        w.write_bits(r2, 6)?;
        w.write_bits(u64::from(self.chroma_format_idc), 2)?;
        w.write_bits(r3, 5)?;
        w.write_bits(u64::from(self.bit_depth_luma_minus8), 3)?;
        w.write_bits(r4, 5)?;
        w.write_bits(u64::from(self.bit_depth_chroma_minus8), 3)?;
        w.write_u16(self.avg_frame_rate)?;
        w.write_bits(u64::from(self.constant_frame_rate), 2)?;
        w.write_bits(u64::from(self.num_temporal_layers), 3)?;
        w.write_bool(self.temporal_id_nested)?;
        w.write_bits(u64::from(self.length_size_minus_one), 2)?;

        let num_arrays = u8::try_from(self.arrays.len()).map_err(|_| Error::Overflow("too many hvcC NAL arrays"))?;
        w.write_u8(num_arrays)?;
        for array in self.arrays.iter() {
            w.write_bool(array.array_completeness)?;
            w.write_bool(array.reserved)?;
            w.write_bits(u64::from(array.nal_unit_type), 6)?;
            let count = u16::try_from(array.nal_units.len()).map_err(|_| Error::Overflow("too many NAL units in array"))?;
            w.write_u16(count)?;
            for nal in array.nal_units.iter() {
                write_nal(w, nal)?;
            }
        }
        Ok(())
    }
}

/// `avcC`: AVC decoder configuration record.
///
/// See ISO 14496-15:2017 § 5.3.3.1
#[derive(Debug, PartialEq)]
pub struct AvcConfigurationBox {
    pub configuration_version: u8,
    pub avc_profile_indication: u8,
    pub profile_compatibility: u8,
    pub avc_level_indication: u8,
    pub length_size_minus_one: u8,
    pub sequence_parameter_sets: TryVec<TryVec<u8>>,
    pub picture_parameter_sets: TryVec<TryVec<u8>>,
    /// Profile-dependent trailing fields, kept verbatim.
    pub extension: TryVec<u8>,
    /// Reserved bits above the length size and the SPS count.
    pub reserved_bits: [u8; 2],
}

impl BoxCodec for AvcConfigurationBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let configuration_version = src.read_u8()?;
        if configuration_version != 1 {
            return Err(Error::Unsupported("avcC configuration version"));
        }
        let avc_profile_indication = src.read_u8()?;
        let profile_compatibility = src.read_u8()?;
        let avc_level_indication = src.read_u8()?;
        let r0 = src.read_bits(6)? as u8;
        let length_size_minus_one = src.read_bits(2)? as u8;
        if length_size_minus_one == 2 {
            return Err(Error::InvalidData("avcC NAL length size of 3 bytes"));
        }
        let r1 = src.read_bits(3)? as u8;
        let num_sps = src.read_bits(5)?;
        let mut sequence_parameter_sets = TryVec::with_capacity(bounded_count(num_sps, src, 2)?)?;
        for _ in 0..num_sps {
            sequence_parameter_sets.push(read_nal(src)?)?;
        }
        let num_pps = src.read_u8()?;
        let mut picture_parameter_sets = TryVec::with_capacity(bounded_count(num_pps, src, 2)?)?;
        for _ in 0..num_pps {
            picture_parameter_sets.push(read_nal(src)?)?;
        }
        let extension = src.read_into_try_vec()?;
        Ok(Self {
            configuration_version,
            avc_profile_indication,
            profile_compatibility,
            avc_level_indication,
            length_size_minus_one,
            sequence_parameter_sets,
            picture_parameter_sets,
            extension,
            reserved_bits: [r0, r1],
        })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        w.write_u8(self.configuration_version)?;
        w.write_u8(self.avc_profile_indication)?;
        w.write_u8(self.profile_compatibility)?;
        w.write_u8(self.avc_level_indication)?;
        w.write_bits(u64::from(self.reserved_bits[0]), 6)?;
        w.write_bits(u64::from(self.length_size_minus_one), 2)?;
        w.write_bits(u64::from(self.reserved_bits[1]), 3)?;
        let num_sps = self.sequence_parameter_sets.len();
        if num_sps > 31 {
            return Err(Error::Overflow("too many sequence parameter sets"));
        }
        w.write_bits(num_sps as u64, 5)?;
        for nal in self.sequence_parameter_sets.iter() {
            write_nal(w, nal)?;
        }
        let num_pps = u8::try_from(self.picture_parameter_sets.len())
            .map_err(|_| Error::Overflow("too many picture parameter sets"))?;
        w.write_u8(num_pps)?;
        for nal in self.picture_parameter_sets.iter() {
            write_nal(w, nal)?;
        }
        w.write_bytes(&self.extension)
    }
}

/// `av1C`: AV1 codec configuration record.
///
/// See AV1-ISOBMFF § 2.3.3
#[derive(Debug, PartialEq)]
pub struct Av1ConfigurationBox {
    pub marker: bool,
    pub version: u8,
    pub profile: u8,
    pub level: u8,
    pub tier: u8,
    pub high_bitdepth: bool,
    pub twelve_bit: bool,
    pub monochrome: bool,
    pub chroma_subsampling_x: u8,
    pub chroma_subsampling_y: u8,
    pub chroma_sample_position: u8,
    pub reserved: u8,
    pub initial_presentation_delay_present: bool,
    /// Reserved bits when no delay is present.
    pub initial_presentation_delay_minus_one: u8,
    pub config_obus: TryVec<u8>,
}

impl Av1ConfigurationBox {
    #[must_use]
    pub fn bit_depth(&self) -> u8 {
        match (self.high_bitdepth, self.twelve_bit) {
            (true, true) => 12,
            (true, false) => 10,
            _ => 8,
        }
    }
}

impl BoxCodec for Av1ConfigurationBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        let marker = src.read_bool()?;
        let version = src.read_bits(7)? as u8;
        if !marker || version != 1 {
            return Err(Error::Unsupported("av1C marker or version"));
        }
        Ok(Self {
            marker,
            version,
            profile: src.read_bits(3)? as u8,
            level: src.read_bits(5)? as u8,
            tier: src.read_bits(1)? as u8,
            high_bitdepth: src.read_bool()?,
            twelve_bit: src.read_bool()?,
            monochrome: src.read_bool()?,
            chroma_subsampling_x: src.read_bits(1)? as u8,
            chroma_subsampling_y: src.read_bits(1)? as u8,
            chroma_sample_position: src.read_bits(2)? as u8,
            reserved: src.read_bits(3)? as u8,
            initial_presentation_delay_present: src.read_bool()?,
            initial_presentation_delay_minus_one: src.read_bits(4)? as u8,
            config_obus: src.read_into_try_vec()?,
        })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        w.write_bool(self.marker)?;
        w.write_bits(u64::from(self.version), 7)?;
        w.write_bits(u64::from(self.profile), 3)?;
        w.write_bits(u64::from(self.level), 5)?;
        w.write_bits(u64::from(self.tier), 1)?;
        w.write_bool(self.high_bitdepth)?;
        w.write_bool(self.twelve_bit)?;
        w.write_bool(self.monochrome)?;
        w.write_bits(u64::from(self.chroma_subsampling_x), 1)?;
        w.write_bits(u64::from(self.chroma_subsampling_y), 1)?;
        w.write_bits(u64::from(self.chroma_sample_position), 2)?;
        w.write_bits(u64::from(self.reserved), 3)?;
        w.write_bool(self.initial_presentation_delay_present)?;
        w.write_bits(u64::from(self.initial_presentation_delay_minus_one), 4)?;
        w.write_bytes(&self.config_obus)
    }
}

/// `jpgC`: JPEG header bytes shared by the items that carry this property.
///
/// See ISO 23008-12:2017 Annex H
#[derive(Debug, PartialEq, Default)]
pub struct JpegConfigurationBox {
    pub prefix: TryVec<u8>,
}

impl BoxCodec for JpegConfigurationBox {
    fn read_body(src: &mut BMFFBox<'_>) -> Result<Self> {
        Ok(Self { prefix: src.read_into_try_vec()? })
    }

    fn write_body(&self, w: &mut BitStreamWriter) -> Result<()> {
        w.write_bytes(&self.prefix)
    }
}

/// A decoder configuration property attached to an item.
#[derive(Debug, Clone, Copy)]
pub enum DecoderConfig<'a> {
    Hevc(&'a HevcConfigurationBox),
    Avc(&'a AvcConfigurationBox),
    Av1(&'a Av1ConfigurationBox),
    Jpeg(&'a JpegConfigurationBox),
}

impl<'a> DecoderConfig<'a> {
    /// The configuration held by `property`, if it is one.
    pub fn from_property(property: &'a IsoBox) -> Option<Self> {
        match &property.body {
            BoxBody::HevcConfig(c) => Some(Self::Hevc(c)),
            BoxBody::AvcConfig(c) => Some(Self::Avc(c)),
            BoxBody::Av1Config(c) => Some(Self::Av1(c)),
            BoxBody::JpegConfig(c) => Some(Self::Jpeg(c)),
            _ => None,
        }
    }

    /// Size of the big-endian length field in front of each NAL unit of a
    /// sample, for NAL-based codecs.
    #[must_use]
    pub fn nal_length_size(&self) -> Option<u8> {
        match self {
            Self::Hevc(c) => Some(c.length_size_minus_one + 1),
            Self::Avc(c) => Some(c.length_size_minus_one + 1),
            Self::Av1(_) | Self::Jpeg(_) => None,
        }
    }

    /// Out-of-band decoder setup bytes: start-code prefixed parameter sets
    /// for HEVC and AVC, configuration OBUs for AV1, header bytes for JPEG.
    pub fn parameter_bytes(&self) -> Result<TryVec<u8>> {
        let mut out = TryVec::new();
        match self {
            Self::Hevc(c) => {
                for nal in c.arrays.iter().flat_map(|a| a.nal_units.iter()) {
                    out.extend_from_slice(&START_CODE)?;
                    out.extend_from_slice(nal)?;
                }
            },
            Self::Avc(c) => {
                for nal in c.sequence_parameter_sets.iter().chain(c.picture_parameter_sets.iter()) {
                    out.extend_from_slice(&START_CODE)?;
                    out.extend_from_slice(nal)?;
                }
            },
            Self::Av1(c) => out.extend_from_slice(&c.config_obus)?,
            Self::Jpeg(c) => out.extend_from_slice(&c.prefix)?,
        }
        Ok(out)
    }

    /// Parameter bytes followed by `data`, with length-prefixed NAL units
    /// rewritten to start codes.
    pub fn elementary_stream(&self, data: &[u8]) -> Result<TryVec<u8>> {
        let mut out = self.parameter_bytes()?;
        match self.nal_length_size() {
            Some(length_size) => append_annex_b(&mut out, data, length_size)?,
            None => out.extend_from_slice(data)?,
        }
        Ok(out)
    }
}

/// Rewrite a sequence of length-prefixed NAL units as start-code prefixed
/// ones.
fn append_annex_b(out: &mut TryVec<u8>, data: &[u8], length_size: u8) -> Result<()> {
    let mut src = BitStream::new(data);
    while !src.is_empty() {
        let len = src.read_bits(length_size * 8)?;
        let len = usize::try_from(len)?;
        let nal = src
            .read_bytes(len)
            .map_err(|_| Error::InvalidData("NAL unit length exceeds item data"))?;
        out.extend_from_slice(&START_CODE)?;
        out.extend_from_slice(nal)?;
    }
    Ok(())
}

#[cfg(test)]
fn hvcc_fixture() -> std::vec::Vec<u8> {
    #[rustfmt::skip]
    let body: &[u8] = &[
        1,                      // configuration version
        0x01,                   // profile space 0, tier 0, profile idc 1
        0x60, 0, 0, 0,          // compatibility flags
        0x90, 0, 0, 0, 0, 0,    // constraint flags
        90,                     // level
        0xf0, 0x00,             // min spatial segmentation
        0xfc,                   // parallelism
        0xfd,                   // chroma 4:2:0
        0xf8, 0xf8,             // bit depths 8
        0, 0,                   // frame rate
        0x0f,                   // 1 temporal layer, nested, 4-byte lengths
        2,                      // arrays
        0xa0, 0, 1, 0, 3, 0x40, 0x01, 0x0c, // VPS
        0x22, 0, 1, 0, 2, 0x44, 0x01,       // PPS, not complete
    ];
    let mut data = std::vec::Vec::new();
    data.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
    data.extend_from_slice(b"hvcC");
    data.extend_from_slice(body);
    data
}

#[test]
fn hvcc_round_trip_and_parameters() {
    let data = hvcc_fixture();
    let boxes = crate::read_boxes(&data).unwrap();
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
    let BoxBody::HevcConfig(hvcc) = &boxes[0].body else { panic!("not hvcC") };
    assert_eq!(hvcc.general_level_idc, 90);
    assert_eq!(hvcc.chroma_format_idc, 1);
    assert_eq!(hvcc.length_size_minus_one, 3);
    assert!(!hvcc.arrays[1].array_completeness);

    let config = DecoderConfig::from_property(&boxes[0]).unwrap();
    assert_eq!(
        &config.parameter_bytes().unwrap()[..],
        &[0, 0, 0, 1, 0x40, 0x01, 0x0c, 0, 0, 0, 1, 0x44, 0x01]
    );
    let stream = config.elementary_stream(&[0, 0, 0, 2, 0x26, 0x01]).unwrap();
    assert_eq!(&stream[13..], &[0, 0, 0, 1, 0x26, 0x01]);
}

#[test]
fn hvcc_preserves_nonstandard_reserved_bits() {
    let mut data = hvcc_fixture();
    data[8 + 13] = 0x00; // reserved bits before min_spatial_segmentation_idc
    let boxes = crate::read_boxes(&data).unwrap();
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
}

#[test]
fn annex_b_rejects_overlong_nal() {
    let config = JpegConfigurationBox::default();
    assert!(DecoderConfig::Jpeg(&config).elementary_stream(&[1, 2, 3]).is_ok());

    let mut hvcc = HevcConfigurationBox::default();
    hvcc.length_size_minus_one = 1;
    let err = DecoderConfig::Hevc(&hvcc).elementary_stream(&[0, 5, 1, 2]).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
}

#[test]
fn avcc_round_trip() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 25, b'a', b'v', b'c', b'C',
        1, 0x64, 0, 0x1f, 0xff, 0xe1,
        0, 3, 0x67, 0x64, 0x00,
        1, 0, 2, 0x68, 0xee,
        0xfd, // start of the high-profile extension
    ];
    let boxes = crate::read_boxes(&data).unwrap();
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
    let BoxBody::AvcConfig(avcc) = &boxes[0].body else { panic!("not avcC") };
    assert_eq!(avcc.length_size_minus_one, 3);
    assert_eq!(&avcc.extension[..], &[0xfd]);
    let params = DecoderConfig::Avc(avcc).parameter_bytes().unwrap();
    assert_eq!(&params[..], &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0, 0, 0, 1, 0x68, 0xee]);
}

#[test]
fn av1c_round_trip() {
    #[rustfmt::skip]
    let data = [
        0, 0, 0, 15, b'a', b'v', b'1', b'C',
        0x81,             // marker, version 1
        0x08,             // profile 0, level 8
        0x4c,             // 10-bit, 4:2:0
        0x00,             // no presentation delay
        0x0a, 0x0b, 0x00, // sequence header OBU
    ];
    let boxes = crate::read_boxes(&data).unwrap();
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
    let BoxBody::Av1Config(av1c) = &boxes[0].body else { panic!("not av1C") };
    assert_eq!(av1c.level, 8);
    assert_eq!(av1c.bit_depth(), 10);
    assert_eq!((av1c.chroma_subsampling_x, av1c.chroma_subsampling_y), (1, 1));
    assert!(!av1c.initial_presentation_delay_present);
    assert_eq!(&av1c.config_obus[..], &[0x0a, 0x0b, 0x00]);
}

#[test]
fn av1c_rejects_unknown_version() {
    let data = [0, 0, 0, 12, b'a', b'v', b'1', b'C', 0x82, 0, 0, 0];
    assert!(matches!(crate::read_boxes(&data).unwrap_err().root_cause(), Error::Unsupported(_)));
}

#[test]
fn jpgc_round_trip() {
    let data = [0, 0, 0, 12, b'j', b'p', b'g', b'C', 0xff, 0xd8, 0xff, 0xdb];
    let boxes = crate::read_boxes(&data).unwrap();
    assert_eq!(crate::write_boxes(&boxes).unwrap(), data);
    let BoxBody::JpegConfig(jpgc) = &boxes[0].body else { panic!("not jpgC") };
    assert_eq!(&jpgc.prefix[..], &[0xff, 0xd8, 0xff, 0xdb]);
    let stream = DecoderConfig::Jpeg(jpgc).elementary_stream(&[0xff, 0xd9]).unwrap();
    assert_eq!(&stream[..], &[0xff, 0xd8, 0xff, 0xdb, 0xff, 0xd9]);
}
