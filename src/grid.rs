// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::bitstream::{BitStream, BitStreamWriter};
use crate::context::{Context, ItemId};
use crate::reader::ParseConfig;
use crate::{Error, FourCC, Result, ToUsize as _, TryVec};
use log::warn;

/// A grid derived image: tiles of equal size placed in row-major order.
///
/// `output_width` and `output_height` give the size of the reconstructed
/// image, which may crop the right and bottom tiles.
///
/// See ISO 23008-12:2017 § 6.6.2.3
#[derive(Debug, PartialEq)]
pub struct ImageGrid {
    pub version: u8,
    /// Bit 0 selects 32-bit output dimensions.
    pub flags: u8,
    pub rows_minus_one: u8,
    pub columns_minus_one: u8,
    pub output_width: u32,
    pub output_height: u32,
    /// Tile items in row-major order; empty until resolved against a
    /// [`Context`].
    pub tile_item_ids: TryVec<ItemId>,
}

impl ImageGrid {
    /// A layout of `rows` × `columns` tiles, each count in 1..=256.
    pub fn new(rows: u16, columns: u16, output_width: u32, output_height: u32) -> Result<Self> {
        let minus_one = |n: u16| {
            n.checked_sub(1)
                .and_then(|n| u8::try_from(n).ok())
                .ok_or(Error::InvalidArgument("grid rows and columns must be in 1..=256"))
        };
        let wide = output_width > u32::from(u16::MAX) || output_height > u32::from(u16::MAX);
        Ok(Self {
            version: 0,
            flags: u8::from(wide),
            rows_minus_one: minus_one(rows)?,
            columns_minus_one: minus_one(columns)?,
            output_width,
            output_height,
            tile_item_ids: TryVec::new(),
        })
    }

    #[must_use]
    pub fn rows(&self) -> u16 {
        u16::from(self.rows_minus_one) + 1
    }

    #[must_use]
    pub fn columns(&self) -> u16 {
        u16::from(self.columns_minus_one) + 1
    }

    #[must_use]
    pub fn tile_count(&self) -> usize {
        usize::from(self.rows()) * usize::from(self.columns())
    }

    /// Parse the payload of a `grid` item.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut src = BitStream::new(data);
        let version = src.read_u8()?;
        if version != 0 {
            return Err(Error::Unsupported("grid version > 0"));
        }
        let flags = src.read_u8()?;
        let rows_minus_one = src.read_u8()?;
        let columns_minus_one = src.read_u8()?;
        let (output_width, output_height) = if flags & 1 == 0 {
            (u32::from(src.read_u16()?), u32::from(src.read_u16()?))
        } else {
            (src.read_u32()?, src.read_u32()?)
        };
        if !src.is_empty() {
            return Err(Error::MalformedGrid("trailing bytes after grid payload"));
        }
        Ok(Self {
            version,
            flags,
            rows_minus_one,
            columns_minus_one,
            output_width,
            output_height,
            tile_item_ids: TryVec::new(),
        })
    }

    /// Serialize as a `grid` item payload.
    pub fn to_bytes(&self) -> Result<std::vec::Vec<u8>> {
        let mut w = BitStreamWriter::new();
        w.write_u8(self.version)?;
        w.write_u8(self.flags)?;
        w.write_u8(self.rows_minus_one)?;
        w.write_u8(self.columns_minus_one)?;
        if self.flags & 1 == 0 {
            let narrow = |v: u32| u16::try_from(v).map_err(|_| Error::Overflow("grid size needs 32-bit fields"));
            w.write_u16(narrow(self.output_width)?)?;
            w.write_u16(narrow(self.output_height)?)?;
        } else {
            w.write_u32(self.output_width)?;
            w.write_u32(self.output_height)?;
        }
        w.into_inner()
    }
}

/// Parse a grid item and attach its tiles.
///
/// Tiles come from the grid's `dimg` reference when there is one. Files
/// without it get the context's hidden coded images, in declaration order.
pub(crate) fn resolve_grid(ctx: &Context, file: &[u8], id: ItemId, config: &ParseConfig) -> Result<ImageGrid> {
    if ctx.item(id)?.item_type != FourCC::GRID {
        return Err(Error::InvalidArgument("item is not a grid"));
    }
    let mut grid = ImageGrid::parse(&ctx.item_data(file, id)?)?;
    if let Some(max) = config.max_grid_tiles
        && grid.tile_count() > max.to_usize()
    {
        return Err(Error::ResourceLimitExceeded("grid tile count limit exceeded"));
    }

    let mut tiles = ctx.referenced_items_by_type(id, FourCC::DIMG)?;
    if tiles.is_empty() {
        warn!("grid {id} has no dimg reference, using hidden coded images");
        for item in ctx.items() {
            if item.hidden && item.item_type.is_coded_image_type() {
                tiles.push(item.id)?;
            }
        }
    }
    if tiles.len() != grid.tile_count() {
        warn!("grid {id} is {}x{} but has {} tiles", grid.rows(), grid.columns(), tiles.len());
        return Err(Error::MalformedGrid("tile count does not match rows × columns"));
    }
    grid.tile_item_ids = tiles;
    Ok(grid)
}

#[test]
fn payload_widths() {
    let g = ImageGrid::parse(&[0, 0, 1, 2, 0x01, 0x00, 0x00, 0xc0]).unwrap();
    assert_eq!((g.rows(), g.columns(), g.output_width, g.output_height), (2, 3, 256, 192));
    assert_eq!(g.to_bytes().unwrap(), [0, 0, 1, 2, 0x01, 0x00, 0x00, 0xc0]);

    let wide = ImageGrid::new(256, 1, 70_000, 10).unwrap();
    assert_eq!(wide.flags, 1);
    let bytes = wide.to_bytes().unwrap();
    assert_eq!(bytes.len(), 12);
    assert_eq!(ImageGrid::parse(&bytes).unwrap(), wide);

    assert!(ImageGrid::new(0, 1, 1, 1).is_err());
    assert!(ImageGrid::new(257, 1, 1, 1).is_err());
}

#[test]
fn malformed_payloads() {
    assert!(matches!(ImageGrid::parse(&[1, 0, 0, 0, 0, 1, 0, 1]), Err(Error::Unsupported(_))));
    assert!(matches!(ImageGrid::parse(&[0, 0, 0, 0, 0, 1]), Err(Error::Truncated { offset: 6 })));
    assert!(matches!(ImageGrid::parse(&[0, 0, 0, 0, 0, 1, 0, 1, 9]), Err(Error::MalformedGrid(_))));

    let mut narrow = ImageGrid::new(1, 1, 1, 1).unwrap();
    narrow.output_width = 1 << 20;
    assert!(matches!(narrow.to_bytes(), Err(Error::Overflow(_))));
}
