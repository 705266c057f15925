// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Error, FourCC, Result, ToU64 as _};
use bitreader::BitReader;
use byteorder::{BigEndian, ByteOrder as _, WriteBytesExt as _};

/// Big-endian read cursor over an in-memory buffer.
///
/// Offsets reported in errors are absolute: a cursor produced by
/// [`BitStream::take`] remembers where its first byte sits in the outermost
/// buffer.
#[derive(Clone, Copy)]
pub struct BitStream<'a> {
    data: &'a [u8],
    pos: usize,
    /// Bits already consumed from `data[pos]`, always < 8.
    bit: u8,
    base: u64,
}

impl std::fmt::Debug for BitStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitStream")
            .field("offset", &self.offset())
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl<'a> BitStream<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Cursor whose first byte is at absolute offset `base`.
    #[must_use]
    pub const fn with_base(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, bit: 0, base }
    }

    /// Absolute offset of the next unread byte.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.base + self.pos.to_u64()
    }

    /// Whole bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    #[cold]
    fn truncated(&self) -> Error {
        Error::Truncated { offset: self.offset() }
    }

    fn advance(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bit != 0 {
            return Err(Error::InvalidData("byte read from unaligned bit position"));
        }
        let end = self.pos.checked_add(len).ok_or_else(|| self.truncated())?;
        let bytes = self.data.get(self.pos..end).ok_or_else(|| self.truncated())?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.advance(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.advance(2)?))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u24(self.advance(3)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.advance(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.advance(8)?))
    }

    /// Read an `n`-bit field, most significant bit first. `n` is 1..=64;
    /// zero-width reads return 0 without consuming anything.
    pub fn read_bits(&mut self, n: u8) -> Result<u64> {
        if n == 0 {
            return Ok(0);
        }
        if n > 64 {
            return Err(Error::InvalidArgument("bit field wider than 64 bits"));
        }
        let available = self.remaining().to_u64() * 8 - u64::from(self.bit);
        if u64::from(n) > available {
            return Err(self.truncated());
        }
        let mut reader = BitReader::new(&self.data[self.pos..]);
        reader.skip(u64::from(self.bit))?;
        let value = reader.read_u64(n)?;
        let consumed = usize::from(self.bit) + usize::from(n);
        self.pos += consumed / 8;
        self.bit = (consumed % 8) as u8;
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        Ok(FourCC::from(self.read_u32()?))
    }

    /// Read a NUL-terminated string; the terminator is consumed but not
    /// returned.
    pub fn read_cstring(&mut self) -> Result<&'a [u8]> {
        if self.bit != 0 {
            return Err(Error::InvalidData("string read from unaligned bit position"));
        }
        let rest = &self.data[self.pos..];
        let len = rest.iter().position(|&b| b == 0).ok_or(Error::Truncated {
            offset: self.base + self.data.len().to_u64(),
        })?;
        let s = &rest[..len];
        self.pos += len + 1;
        Ok(s)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.advance(len)
    }

    pub fn read_to_end(&mut self) -> Result<&'a [u8]> {
        self.advance(self.remaining())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.advance(len).map(drop)
    }

    /// Split off the next `len` bytes as their own cursor and move past
    /// them.
    pub fn take(&mut self, len: usize) -> Result<BitStream<'a>> {
        let base = self.offset();
        let data = self.advance(len)?;
        Ok(Self::with_base(data, base))
    }
}

/// Big-endian writer producing a byte buffer.
///
/// Sub-byte fields go through [`BitStreamWriter::write_bits`]; byte-wide
/// writes require the bit accumulator to be empty.
#[derive(Default)]
pub struct BitStreamWriter {
    buf: std::vec::Vec<u8>,
    partial: u8,
    partial_bits: u8,
}

impl BitStreamWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of whole bytes written so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    fn aligned(&mut self) -> Result<&mut std::vec::Vec<u8>> {
        if self.partial_bits != 0 {
            return Err(Error::InvalidState("byte write at unaligned bit position"));
        }
        Ok(&mut self.buf)
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.aligned()?.write_u8(v)?;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.aligned()?.write_u16::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_u24(&mut self, v: u32) -> Result<()> {
        if v > 0x00ff_ffff {
            return Err(Error::Overflow("value does not fit in 24 bits"));
        }
        self.aligned()?.write_u24::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.aligned()?.write_u32::<BigEndian>(v)?;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.aligned()?.write_u64::<BigEndian>(v)?;
        Ok(())
    }

    /// Write the low `n` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, n: u8) -> Result<()> {
        if n > 64 {
            return Err(Error::InvalidArgument("bit field wider than 64 bits"));
        }
        if n < 64 && value >> n != 0 {
            return Err(Error::Overflow("value does not fit in bit field"));
        }
        for i in (0..n).rev() {
            self.partial = (self.partial << 1) | ((value >> i) & 1) as u8;
            self.partial_bits += 1;
            if self.partial_bits == 8 {
                self.buf.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
                self.buf.push(self.partial);
                self.partial = 0;
                self.partial_bits = 0;
            }
        }
        Ok(())
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_bits(u64::from(v), 1)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let buf = self.aligned()?;
        buf.try_reserve(bytes.len()).map_err(|_| Error::OutOfMemory)?;
        buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_fourcc(&mut self, fourcc: FourCC) -> Result<()> {
        self.write_bytes(&fourcc.value)
    }

    /// Write `s` followed by a NUL terminator.
    pub fn write_cstring(&mut self, s: &[u8]) -> Result<()> {
        if s.contains(&0) {
            return Err(Error::InvalidArgument("string contains an interior NUL"));
        }
        self.write_bytes(s)?;
        self.write_u8(0)
    }

    /// Overwrite four already-written bytes at `pos`.
    pub fn patch_u32(&mut self, pos: usize, v: u32) -> Result<()> {
        let dst = self
            .buf
            .get_mut(pos..pos.saturating_add(4))
            .filter(|d| d.len() == 4)
            .ok_or(Error::InvalidArgument("patch position outside written range"))?;
        BigEndian::write_u32(dst, v);
        Ok(())
    }

    /// Overwrite eight already-written bytes at `pos`.
    pub fn patch_u64(&mut self, pos: usize, v: u64) -> Result<()> {
        let dst = self
            .buf
            .get_mut(pos..pos.saturating_add(8))
            .filter(|d| d.len() == 8)
            .ok_or(Error::InvalidArgument("patch position outside written range"))?;
        BigEndian::write_u64(dst, v);
        Ok(())
    }

    pub fn into_inner(self) -> Result<std::vec::Vec<u8>> {
        if self.partial_bits != 0 {
            return Err(Error::InvalidState("bit writer finished mid-byte"));
        }
        Ok(self.buf)
    }
}

#[test]
fn read_past_end_reports_absolute_offset() {
    let data = [0u8, 1, 2, 3, 4, 5];
    let mut outer = BitStream::with_base(&data, 100);
    outer.skip(2).unwrap();
    let mut inner = outer.take(3).unwrap();
    assert_eq!(inner.offset(), 102);
    assert_eq!(inner.read_u16().unwrap(), 0x0203);
    match inner.read_u16() {
        Err(Error::Truncated { offset }) => assert_eq!(offset, 104),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(outer.remaining(), 1);
}

#[test]
fn bit_fields_straddle_bytes() {
    let data = [0b1011_0011, 0b1100_0000, 0xff];
    let mut bs = BitStream::new(&data);
    assert_eq!(bs.read_bits(4).unwrap(), 0b1011);
    assert_eq!(bs.read_bits(6).unwrap(), 0b0011_11);
    assert!(bs.read_u8().is_err());
    assert_eq!(bs.read_bits(6).unwrap(), 0);
    assert_eq!(bs.read_u8().unwrap(), 0xff);
    assert!(matches!(bs.read_bits(1), Err(Error::Truncated { offset: 3 })));
}

#[test]
fn cstring_requires_terminator() {
    let mut bs = BitStream::new(b"abc\0de");
    assert_eq!(bs.read_cstring().unwrap(), b"abc");
    assert!(matches!(bs.read_cstring(), Err(Error::Truncated { offset: 6 })));
}

#[test]
fn writer_bits_and_patch() {
    let mut w = BitStreamWriter::new();
    w.write_u32(0).unwrap();
    w.write_bits(0b101, 3).unwrap();
    w.write_bits(0x1f, 5).unwrap();
    assert!(w.write_u8(1).is_ok());
    w.write_bits(1, 1).unwrap();
    assert!(w.write_u8(1).is_err());
    w.write_bits(0, 7).unwrap();
    w.patch_u32(0, 7).unwrap();
    assert!(w.patch_u32(4, 0).is_err());
    assert!(w.write_bits(4, 2).is_err());
    assert_eq!(w.into_inner().unwrap(), [0, 0, 0, 7, 0b1011_1111, 1, 0x80]);
}
