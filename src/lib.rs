#![deny(unsafe_code)]
//! Module for reading and writing HEIF files, i.e. the ISO Base Media File
//! Format box model as used by still images, image collections and image
//! sequences.
//!
//! The crate has two layers:
//!
//! - a lossless box tree ([`read_boxes`] / [`write_boxes`]) where every known
//!   box type is decoded into a typed variant and everything else is kept as
//!   opaque bytes, so `write_boxes(&read_boxes(bytes)?)? == bytes`;
//! - an item graph ([`Context`]) per metadata scope, exposed through the
//!   [`HeifReader`] facade which answers item, reference, grid and data
//!   queries.
//!
//! ```no_run
//! use heif_parse::{FourCC, HeifReader};
//!
//! let file = std::fs::File::open("image.heic")?;
//! let mut reader = HeifReader::new();
//! reader.initialize(file)?;
//!
//! let ctx = reader.get_file_properties()?.root_context.expect("no root meta");
//! for grid in reader.get_item_list_by_type(ctx, "grid")?.iter() {
//!     let layout = reader.get_item_grid(ctx, *grid)?;
//!     println!("{}x{} tiles", layout.rows(), layout.columns());
//! }
//! let exif = reader.get_referenced_item_data(ctx, 1, FourCC::CDSC);
//! # let _ = exif;
//! reader.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! This crate is written entirely in safe Rust code.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use fallible_collections::TryReserveError;
use std::convert::TryInto as _;

mod bitstream;
mod bmff;
mod boxes;
mod codec;
mod context;
mod grid;
mod meta;
mod protection;
mod reader;
mod track;

pub use crate::bitstream::{BitStream, BitStreamWriter};
pub use crate::bmff::{read_boxes, write_boxes, BoxBody, BoxHeader, ContainerBox, FullBoxHeader, IsoBox, SizeField};
pub use crate::boxes::{BoxType, FourCC};
pub use crate::codec::{
    Av1ConfigurationBox, AvcConfigurationBox, DecoderConfig, HevcConfigurationBox, HevcNalArray, JpegConfigurationBox,
};
pub use crate::context::{Context, ContextId, Item, ItemId, ItemTypeFilter};
pub use crate::grid::ImageGrid;
pub use crate::meta::{
    ConstructionMethod, ExtentRange, FileTypeBox, HandlerBox, ImageSpatialExtentsProperty, ItemDataBox, ItemInfoBox,
    ItemInfoEntry, ItemLocation, ItemLocationBox, ItemLocationExtent, ItemPropertiesBox, ItemPropertyAssociation,
    ItemPropertyAssociationBox, ItemPropertyContainerBox, ItemReference, ItemReferenceBox, MediaDataBox, MetaBox,
    PrimaryItemBox, PropertyAssociation,
};
pub use crate::protection::{
    ItemProtectionBox, OriginalFormatBox, ProtectionSchemeInfoBox, SchemeInformationBox, SchemeTypeBox,
};
pub use crate::reader::{FileFeatures, FileProperties, HeifReader, ParseConfig};
pub use crate::track::{
    ChunkOffsetBox, MediaHeaderBox, SampleSizeBox, SampleTable, SampleToChunkBox, SampleToChunkEntry, TimeToSampleBox,
    TimeToSampleEntry, TrackHeaderBox, TrackInfo,
};

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
/// If the size won't fit on the given platform, this will fail at compile time, but if a type
/// which can fail `TryInto<usize>` is used, it may panic.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        const _: () = assert!(std::mem::size_of::<usize>() <= std::mem::size_of::<u64>());
        self.try_into().ok().unwrap_or(u64::MAX)
    }
}

/// A trait to indicate a type can be infallibly converted to `usize`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

/// Statically verify that the given type can fit within a `usize`.
macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                const _: () = assert!(std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>());
                self.try_into().ok().unwrap_or(usize::MAX)
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

#[doc(hidden)]
pub type TryVec<T> = fallible_collections::TryVec<T>;
/// Byte string without a NUL terminator.
pub type TryString = fallible_collections::TryVec<u8>;

// To ensure we don't use stdlib allocating types by accident
#[allow(dead_code)]
struct Vec;
#[allow(dead_code)]
struct Box;
#[allow(dead_code)]
struct HashMap;
#[allow(dead_code)]
struct String;

/// Describes parser, lookup and usage failures.
///
/// Structural variants abort the parse of a whole scope. Lookup variants are
/// distinct from empty results so callers can tell "exists but empty" from
/// "does not exist".
#[derive(Debug)]
pub enum Error {
    /// Parse error caused by corrupt or malformed data.
    InvalidData(&'static str),
    /// Parse error caused by limited parser support rather than invalid data.
    Unsupported(&'static str),
    /// A read ran past the end of the available bytes.
    Truncated { offset: u64 },
    /// A failure inside a nested box, annotated with where it happened.
    InBox {
        box_type: FourCC,
        offset: u64,
        source: std::boxed::Box<Error>,
    },
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// No context with this id exists in the file.
    ContextNotFound(ContextId),
    /// No item with this id exists in the queried context.
    ItemNotFound(ItemId),
    /// The item exists but has no reference of the requested type.
    ReferenceNotFound { from: ItemId, reference_type: FourCC },
    /// The item exists but no location entry describes its data.
    NoItemData(ItemId),
    /// An index was outside `0..count`.
    IndexOutOfRange { index: usize, count: usize },
    /// A grid item is inconsistent with its references.
    MalformedGrid(&'static str),
    /// Content parsed fine structurally but violates an item-level rule.
    MalformedContent(&'static str),
    /// A counter would exceed the range of its serialized field.
    Overflow(&'static str),
    /// The reader has not been initialized, or has been closed.
    NotInitialized,
    /// The operation is not valid in the reader's current state.
    InvalidState(&'static str),
    /// A caller-supplied argument is malformed.
    InvalidArgument(&'static str),
    /// Out of memory
    OutOfMemory,
    /// Resource limit exceeded during parsing
    ResourceLimitExceeded(&'static str),
}

impl Error {
    /// Strip any [`Error::InBox`] wrappers.
    pub fn root_cause(&self) -> &Error {
        let mut err = self;
        while let Self::InBox { source, .. } = err {
            err = &**source;
        }
        err
    }

    /// Wrap with the box type and start offset of the box being parsed.
    #[cold]
    pub(crate) fn in_box(self, box_type: FourCC, offset: u64) -> Self {
        Self::InBox {
            box_type,
            offset,
            source: std::boxed::Box::new(self),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::InvalidData(s)
            | Self::Unsupported(s)
            | Self::ResourceLimitExceeded(s)
            | Self::MalformedGrid(s)
            | Self::MalformedContent(s)
            | Self::Overflow(s)
            | Self::InvalidState(s)
            | Self::InvalidArgument(s) => s,
            Self::Truncated { offset } => return write!(f, "truncated at offset {offset}"),
            Self::InBox { box_type, offset, source } => {
                return write!(f, "in '{box_type}' at offset {offset}: {source}");
            },
            Self::Io(err) => return err.fmt(f),
            Self::ContextNotFound(id) => return write!(f, "context {id} not found"),
            Self::ItemNotFound(id) => return write!(f, "item {id} not found"),
            Self::ReferenceNotFound { from, reference_type } => {
                return write!(f, "item {from} has no '{reference_type}' reference");
            },
            Self::NoItemData(id) => return write!(f, "item {id} has no location"),
            Self::IndexOutOfRange { index, count } => {
                return write!(f, "index {index} out of range for {count} entries");
            },
            Self::NotInitialized => "reader not initialized",
            Self::OutOfMemory => "OOM",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InBox { source, .. } => Some(source.as_ref()),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<bitreader::BitReaderError> for Error {
    #[cold]
    #[cfg_attr(debug_assertions, track_caller)]
    fn from(err: bitreader::BitReaderError) -> Self {
        log::warn!("bitreader: {err}");
        debug_assert!(!matches!(err, bitreader::BitReaderError::TooManyBitsForType { .. })); // bug
        Self::InvalidData("truncated bits")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::Unsupported("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.root_cause() {
            Error::InvalidData(_) | Error::MalformedGrid(_) | Error::MalformedContent(_) => {
                std::io::ErrorKind::InvalidData
            },
            Error::Truncated { .. } => std::io::ErrorKind::UnexpectedEof,
            Error::ItemNotFound(_) | Error::ContextNotFound(_) | Error::ReferenceNotFound { .. } => {
                std::io::ErrorKind::NotFound
            },
            _ => std::io::ErrorKind::Other,
        };
        if let Error::Io(io_err) = err {
            return io_err;
        }
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[test]
fn root_cause_unwraps_nested_boxes() {
    let err = Error::Truncated { offset: 40 }
        .in_box(FourCC::from(b"ispe"), 32)
        .in_box(FourCC::from(b"ipco"), 24);
    assert!(matches!(err.root_cause(), Error::Truncated { offset: 40 }));
    assert_eq!(err.to_string(), "in 'ipco' at offset 24: in 'ispe' at offset 32: truncated at offset 40");
}

#[test]
fn io_error_kind_follows_root_cause() {
    let err: std::io::Error = Error::Truncated { offset: 3 }.in_box(FourCC::from(b"ftyp"), 0).into();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}
