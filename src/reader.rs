// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reader facade: reads a file once, builds a [`Context`] per metadata
//! scope, then answers queries against them.

use crate::bitstream::BitStream;
use crate::bmff::{BoxIter, IsoBox};
use crate::context::{Context, ContextId, ItemId, ItemTypeFilter, MAX_REFERENCE_DEPTH};
use crate::grid::{resolve_grid, ImageGrid};
use crate::meta::MetaBox;
use crate::protection::ProtectionSchemeInfoBox;
use crate::track::TrackInfo;
use crate::{BoxBody, BoxType, Error, FourCC, Result, ToU64 as _, ToUsize as _, TryVec};
use log::debug;
use std::borrow::Cow;
use std::io::{Read, Seek, SeekFrom};
use std::ops::BitOr;

/// Limits applied while reading and querying a file.
///
/// The defaults are suitable for untrusted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConfig {
    /// Maximum number of bytes read from the stream.
    /// Default: 1GB (1,000,000,000 bytes)
    pub peak_memory_limit: Option<u64>,

    /// Maximum number of items in one metadata scope.
    /// Default: 65,535 items
    pub max_items: Option<u32>,

    /// Maximum number of grid tiles.
    /// Default: 1,000 tiles
    pub max_grid_tiles: Option<u32>,

    /// Maximum number of `dimg` edges followed from one item.
    /// Default: 16, never more than 32
    pub max_reference_depth: u32,

    /// Tolerate dangling references and out-of-range protection indices
    /// instead of failing.
    /// Default: false (strict validation)
    pub lenient: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            peak_memory_limit: Some(1_000_000_000),
            max_items: Some(65_535),
            max_grid_tiles: Some(1_000),
            max_reference_depth: 16,
            lenient: false,
        }
    }
}

impl ParseConfig {
    /// Create a configuration with no resource limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            peak_memory_limit: None,
            max_items: None,
            max_grid_tiles: None,
            max_reference_depth: MAX_REFERENCE_DEPTH as u32,
            lenient: false,
        }
    }

    /// Set the maximum number of bytes read from the stream
    #[must_use]
    pub fn with_peak_memory_limit(mut self, bytes: u64) -> Self {
        self.peak_memory_limit = Some(bytes);
        self
    }

    /// Set the maximum item count per metadata scope
    #[must_use]
    pub fn with_max_items(mut self, count: u32) -> Self {
        self.max_items = Some(count);
        self
    }

    /// Set the maximum grid tile count
    #[must_use]
    pub fn with_max_grid_tiles(mut self, count: u32) -> Self {
        self.max_grid_tiles = Some(count);
        self
    }

    /// Set the maximum derivation depth, capped at 32
    #[must_use]
    pub fn with_max_reference_depth(mut self, depth: u32) -> Self {
        self.max_reference_depth = depth.min(MAX_REFERENCE_DEPTH as u32);
        self
    }

    /// Enable or disable lenient parsing
    #[must_use]
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }
}

/// What kind of content a file holds. The flags are independent: a file
/// can be a single image and carry an image sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFeatures(u32);

impl FileFeatures {
    pub const SINGLE_IMAGE: Self = Self(1);
    pub const IMAGE_COLLECTION: Self = Self(1 << 1);
    pub const IMAGE_SEQUENCE: Self = Self(1 << 2);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FileFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, PartialEq)]
pub struct FileProperties {
    pub features: FileFeatures,
    /// The file-level metadata scope, when the file has a top-level `meta`.
    pub root_context: Option<ContextId>,
    /// One scope per track, in file order.
    pub track_contexts: TryVec<ContextId>,
    /// Major brand followed by the compatible brands.
    pub brands: TryVec<FourCC>,
}

struct Parsed<S> {
    #[allow(dead_code)]
    stream: S,
    data: std::vec::Vec<u8>,
    properties: FileProperties,
    root: Option<Context>,
    tracks: TryVec<Context>,
}

enum State<S> {
    Uninitialized,
    Initialized(Parsed<S>),
    Closed,
}

/// Reads a HEIF file and answers item, reference, grid and sample queries.
///
/// The stream is read once by [`HeifReader::initialize`]; every query after
/// that works on the in-memory copy.
pub struct HeifReader<S> {
    config: ParseConfig,
    state: State<S>,
}

impl<S: Read + Seek> Default for HeifReader<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Read + Seek> HeifReader<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ParseConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ParseConfig) -> Self {
        Self { config, state: State::Uninitialized }
    }

    #[must_use]
    pub fn config(&self) -> &ParseConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Initialized(_))
    }

    /// Read and parse the whole stream. On failure the reader stays
    /// uninitialized and may be given another stream.
    pub fn initialize(&mut self, mut stream: S) -> Result<()> {
        match self.state {
            State::Uninitialized => {},
            State::Initialized(_) => return Err(Error::InvalidState("reader already initialized")),
            State::Closed => return Err(Error::InvalidState("reader closed")),
        }

        stream.seek(SeekFrom::Start(0))?;
        let mut data = std::vec::Vec::new();
        match self.config.peak_memory_limit {
            Some(limit) => {
                stream.by_ref().take(limit.saturating_add(1)).read_to_end(&mut data)?;
                if data.len().to_u64() > limit {
                    return Err(Error::ResourceLimitExceeded("peak memory limit exceeded"));
                }
            },
            None => {
                stream.read_to_end(&mut data)?;
            },
        }

        let (properties, root, tracks) = parse_file(&data, &self.config)?;
        self.state = State::Initialized(Parsed { stream, data, properties, root, tracks });
        Ok(())
    }

    /// Drop the stream and everything parsed from it. The reader cannot be
    /// initialized again.
    pub fn close(&mut self) {
        self.state = State::Closed;
    }

    fn parsed(&self) -> Result<&Parsed<S>> {
        match &self.state {
            State::Initialized(parsed) => Ok(parsed),
            State::Uninitialized | State::Closed => Err(Error::NotInitialized),
        }
    }

    fn context(&self, id: ContextId) -> Result<&Context> {
        let parsed = self.parsed()?;
        if id == ContextId::ROOT {
            return parsed.root.as_ref().ok_or(Error::ContextNotFound(id));
        }
        parsed.tracks.iter().find(|c| c.id() == id).ok_or(Error::ContextNotFound(id))
    }

    fn track(&self, id: ContextId) -> Result<&TrackInfo> {
        self.context(id)?.track().ok_or(Error::InvalidArgument("not a track context"))
    }

    pub fn get_file_properties(&self) -> Result<&FileProperties> {
        Ok(&self.parsed()?.properties)
    }

    /// Items of a type (or `"master"`) in declaration order.
    pub fn get_item_list_by_type(&self, ctx: ContextId, item_type: &str) -> Result<TryVec<ItemId>> {
        let filter = ItemTypeFilter::parse(item_type)?;
        self.context(ctx)?.item_list_by_type(filter)
    }

    pub fn get_referenced_items_by_type(
        &self,
        ctx: ContextId,
        from: ItemId,
        reference_type: FourCC,
    ) -> Result<TryVec<ItemId>> {
        self.context(ctx)?.referenced_items_by_type(from, reference_type)
    }

    pub fn get_referencing_items_by_type(
        &self,
        ctx: ContextId,
        to: ItemId,
        reference_type: FourCC,
    ) -> Result<TryVec<ItemId>> {
        self.context(ctx)?.referencing_items_by_type(to, reference_type)
    }

    pub fn get_item_grid(&self, ctx: ContextId, id: ItemId) -> Result<ImageGrid> {
        resolve_grid(self.context(ctx)?, &self.parsed()?.data, id, &self.config)
    }

    pub fn get_item_data(&self, ctx: ContextId, id: ItemId) -> Result<Cow<'_, [u8]>> {
        self.context(ctx)?.item_data(&self.parsed()?.data, id)
    }

    pub fn get_item_data_with_decoder_parameters(&self, ctx: ContextId, id: ItemId) -> Result<TryVec<u8>> {
        self.context(ctx)?.item_data_with_decoder_parameters(&self.parsed()?.data, id)
    }

    /// Data of the first item `from` references with `reference_type`.
    pub fn get_referenced_item_data(
        &self,
        ctx: ContextId,
        from: ItemId,
        reference_type: FourCC,
    ) -> Result<Cow<'_, [u8]>> {
        let context = self.context(ctx)?;
        let target = *context
            .referenced_items_by_type(from, reference_type)?
            .first()
            .ok_or(Error::ReferenceNotFound { from, reference_type })?;
        context.item_data(&self.parsed()?.data, target)
    }

    pub fn get_item_type(&self, ctx: ContextId, id: ItemId) -> Result<FourCC> {
        Ok(self.context(ctx)?.item(id)?.item_type)
    }

    pub fn get_primary_item(&self, ctx: ContextId) -> Result<Option<ItemId>> {
        Ok(self.context(ctx)?.primary_item())
    }

    pub fn get_item_protection_scheme(&self, ctx: ContextId, id: ItemId) -> Result<Option<&ProtectionSchemeInfoBox>> {
        self.context(ctx)?.protection_scheme(id)
    }

    /// Width and height from `ispe`, or from the grid layout for grid items
    /// without one.
    pub fn get_item_dimensions(&self, ctx: ContextId, id: ItemId) -> Result<Option<(u32, u32)>> {
        let context = self.context(ctx)?;
        if let Some(dims) = context.item_dimensions(id)? {
            return Ok(Some(dims));
        }
        if context.item(id)?.item_type == FourCC::GRID {
            let grid = ImageGrid::parse(&context.item_data(&self.parsed()?.data, id)?)?;
            return Ok(Some((grid.output_width, grid.output_height)));
        }
        Ok(None)
    }

    pub fn get_derivation_sources(&self, ctx: ContextId, id: ItemId) -> Result<TryVec<ItemId>> {
        self.context(ctx)?.derivation_sources(id, self.config.max_reference_depth.to_usize())
    }

    pub fn get_track_sample_count(&self, ctx: ContextId) -> Result<u32> {
        Ok(self.track(ctx)?.sample_table.sample_count())
    }

    pub fn get_track_sample_data(&self, ctx: ContextId, index: usize) -> Result<&[u8]> {
        let (offset, size) = self.track(ctx)?.sample_table.sample_location(index)?;
        let start = usize::try_from(offset)?;
        let end = start.checked_add(size.to_usize()).ok_or(Error::InvalidData("sample end overflow"))?;
        self.parsed()?.data.get(start..end).ok_or(Error::InvalidData("sample outside file"))
    }

    /// Sample duration in the track's media timescale.
    pub fn get_track_sample_duration(&self, ctx: ContextId, index: usize) -> Result<u32> {
        self.track(ctx)?.sample_table.sample_duration(index)
    }
}

fn into_body(b: IsoBox) -> BoxBody {
    b.body
}

fn read_tracks(moov: IsoBox, config: &ParseConfig, tracks: &mut TryVec<Context>) -> Result<()> {
    let BoxBody::Container(mut moov) = into_body(moov) else {
        return Err(Error::InvalidData("moov is not a container"));
    };
    for trak in moov.children.iter_mut() {
        if trak.header.name != BoxType::TrackBox {
            continue;
        }
        let BoxBody::Container(mut trak) = std::mem::replace(&mut trak.body, BoxBody::Unknown(TryVec::new())) else {
            continue;
        };
        let info = TrackInfo::from_trak(&trak)?;
        let id = ContextId(info.track_id);
        if tracks.iter().any(|c| c.id() == id) {
            return Err(Error::InvalidData("duplicate track id"));
        }
        let mut meta = MetaBox::new();
        for child in trak.children.iter_mut() {
            if child.header.name == BoxType::MetadataBox
                && let BoxBody::Meta(m) = std::mem::replace(&mut child.body, BoxBody::Unknown(TryVec::new()))
            {
                meta = m;
            }
        }
        tracks.push(Context::from_meta(id, meta, Some(info), config)?)?;
    }
    Ok(())
}

/// Parse the top-level box sequence.
fn parse_file(data: &[u8], config: &ParseConfig) -> Result<(FileProperties, Option<Context>, TryVec<Context>)> {
    let mut src = BitStream::new(data);
    let mut iter = BoxIter::new(&mut src);

    // 'ftyp' box must occur first; see ISO 14496-12:2015 § 4.3.1
    let ftyp = match iter.next_box()? {
        Some(mut b) if b.head.name == BoxType::FileTypeBox => IsoBox::read(&mut b)?,
        _ => return Err(Error::InvalidData("'ftyp' box must occur first")),
    };
    let BoxBody::FileType(ftyp) = into_body(ftyp) else {
        return Err(Error::InvalidData("malformed ftyp"));
    };
    let mut brands = TryVec::with_capacity(ftyp.compatible_brands.len() + 1)?;
    brands.push(ftyp.major_brand)?;
    brands.extend_from_slice(&ftyp.compatible_brands)?;

    let mut root = None;
    let mut tracks = TryVec::new();
    while let Some(mut b) = iter.next_box()? {
        match b.head.name {
            BoxType::MetadataBox => {
                if root.is_some() {
                    return Err(Error::InvalidData(
                        "There should be zero or one meta boxes per ISO 14496-12:2015 § 8.11.1.1",
                    ));
                }
                let BoxBody::Meta(meta) = into_body(IsoBox::read(&mut b)?) else {
                    return Err(Error::InvalidData("malformed meta"));
                };
                root = Some(Context::from_meta(ContextId::ROOT, meta, None, config)?);
            },
            BoxType::MovieBox => read_tracks(IsoBox::read(&mut b)?, config, &mut tracks)?,
            _ => {
                // mdat and anything else is only addressed through offsets
                debug!("skipping top-level {:?}", b.get_header());
                let len = b.remaining();
                b.skip(len)?;
            },
        }
    }

    let mut features = FileFeatures::empty();
    if let Some(root) = &root {
        match root.top_level_images()?.len() {
            0 => {},
            1 => features = features | FileFeatures::SINGLE_IMAGE,
            _ => features = features | FileFeatures::IMAGE_COLLECTION,
        }
    }
    if tracks.iter().any(|c| c.track().is_some_and(TrackInfo::is_visual)) {
        features = features | FileFeatures::IMAGE_SEQUENCE;
    }
    debug!("file features {:#x}", features.bits());

    let mut track_contexts = TryVec::with_capacity(tracks.len())?;
    for c in tracks.iter() {
        track_contexts.push(c.id())?;
    }
    let properties = FileProperties {
        features,
        root_context: root.as_ref().map(Context::id),
        track_contexts,
        brands,
    };
    Ok((properties, root, tracks))
}

#[test]
fn config_depth_is_capped() {
    let config = ParseConfig::default().with_max_reference_depth(100);
    assert_eq!(config.max_reference_depth, 32);
    assert_eq!(ParseConfig::unlimited().max_grid_tiles, None);
}

#[test]
fn queries_before_initialize_fail() {
    let reader: HeifReader<std::io::Cursor<&[u8]>> = HeifReader::new();
    assert!(matches!(reader.get_file_properties(), Err(Error::NotInitialized)));
    assert!(matches!(reader.get_item_type(ContextId::ROOT, 1), Err(Error::NotInitialized)));
}

#[test]
fn missing_ftyp_leaves_reader_uninitialized() {
    let mut reader = HeifReader::new();
    let err = reader.initialize(std::io::Cursor::new(&b"\0\0\0\x08free"[..])).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
    assert!(!reader.is_initialized());

    let ftyp = b"\0\0\0\x10ftypheic\0\0\0\0";
    reader.initialize(std::io::Cursor::new(&ftyp[..])).unwrap();
    let props = reader.get_file_properties().unwrap();
    assert!(props.features.is_empty());
    assert_eq!(props.root_context, None);
    assert_eq!(&props.brands[..], &[FourCC::from(b"heic")]);
    assert!(matches!(reader.get_primary_item(ContextId::ROOT), Err(Error::ContextNotFound(_))));

    assert!(matches!(reader.initialize(std::io::Cursor::new(&ftyp[..])), Err(Error::InvalidState(_))));
    reader.close();
    assert!(matches!(reader.get_file_properties(), Err(Error::NotInitialized)));
    assert!(matches!(reader.initialize(std::io::Cursor::new(&ftyp[..])), Err(Error::InvalidState(_))));
}

#[test]
fn input_over_memory_limit_is_rejected() {
    let mut reader = HeifReader::with_config(ParseConfig::default().with_peak_memory_limit(8));
    let ftyp = b"\0\0\0\x10ftypheic\0\0\0\0";
    let err = reader.initialize(std::io::Cursor::new(&ftyp[..])).unwrap_err();
    assert!(matches!(err, Error::ResourceLimitExceeded(_)));
}
