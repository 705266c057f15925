// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The item graph of one metadata scope.
//!
//! A [`Context`] is built once from a `meta` box (file-level, or inside a
//! track) and is read-only afterwards. Items live in an arena in declaration
//! order; everything else refers to them by [`ItemId`].

use crate::bmff::{BoxBody, IsoBox};
use crate::codec::DecoderConfig;
use crate::meta::{ConstructionMethod, ItemLocation, ItemPropertyAssociation, ItemReference, MetaBox};
use crate::protection::ProtectionSchemeInfoBox;
use crate::reader::ParseConfig;
use crate::track::TrackInfo;
use crate::{Error, FourCC, Result, ToUsize as _, TryString, TryVec};
use arrayvec::ArrayVec;
use log::{debug, warn};
use std::borrow::Cow;
use std::fmt;

/// Item identifier, unique within one [`Context`].
pub type ItemId = u32;

/// Upper bound on derivation chain length any traversal will follow.
pub(crate) const MAX_REFERENCE_DEPTH: usize = 32;

/// Identifies a metadata scope: 0 for the file-level `meta`, the track id
/// for a track's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

impl ContextId {
    pub const ROOT: Self = Self(0);
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub item_type: FourCC,
    /// 1-based index into the scope's protection schemes, 0 when
    /// unprotected.
    pub protection_index: u16,
    pub name: TryString,
    pub content_type: TryString,
    pub hidden: bool,
    pub location: Option<ItemLocation>,
}

/// Selects items for [`Context::item_list_by_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTypeFilter {
    /// Coded images that are neither thumbnails nor auxiliary images.
    Master,
    Type(FourCC),
}

impl ItemTypeFilter {
    /// `"master"` or a four-byte item type such as `"grid"`.
    pub fn parse(s: &str) -> Result<Self> {
        if s == "master" {
            return Ok(Self::Master);
        }
        FourCC::from_str_exact(s)
            .map(Self::Type)
            .ok_or(Error::InvalidArgument("item type must be four bytes or \"master\""))
    }
}

impl From<FourCC> for ItemTypeFilter {
    fn from(fourcc: FourCC) -> Self {
        Self::Type(fourcc)
    }
}

fn take_body(b: &mut IsoBox) -> BoxBody {
    std::mem::replace(&mut b.body, BoxBody::Unknown(TryVec::new()))
}

#[derive(Debug)]
pub struct Context {
    id: ContextId,
    handler_type: Option<FourCC>,
    items: TryVec<Item>,
    /// (id, arena position), sorted by id.
    index: TryVec<(ItemId, usize)>,
    references: TryVec<ItemReference>,
    protection: TryVec<ProtectionSchemeInfoBox>,
    properties: TryVec<IsoBox>,
    associations: TryVec<ItemPropertyAssociation>,
    primary_item: Option<ItemId>,
    idat: TryVec<u8>,
    track: Option<TrackInfo>,
}

impl Context {
    /// Build the item graph of `meta`, taking ownership of its contents.
    pub fn from_meta(id: ContextId, mut meta: MetaBox, track: Option<TrackInfo>, config: &ParseConfig) -> Result<Self> {
        let mut this = Self {
            id,
            handler_type: None,
            items: TryVec::new(),
            index: TryVec::new(),
            references: TryVec::new(),
            protection: TryVec::new(),
            properties: TryVec::new(),
            associations: TryVec::new(),
            primary_item: None,
            idat: TryVec::new(),
            track,
        };
        let mut locations = TryVec::new();

        for child in meta.children.iter_mut() {
            match take_body(child) {
                BoxBody::Handler(hdlr) => this.handler_type = Some(hdlr.handler_type),
                BoxBody::PrimaryItem(pitm) => this.primary_item = Some(pitm.item_id),
                BoxBody::ItemInfo(mut iinf) => {
                    if let Some(max) = config.max_items
                        && iinf.entries.len() > max.to_usize()
                    {
                        return Err(Error::ResourceLimitExceeded("item count limit exceeded"));
                    }
                    this.items = TryVec::with_capacity(iinf.entries.len())?;
                    for entry in iinf.entries.iter_mut() {
                        this.items.push(Item {
                            id: entry.item_id,
                            item_type: entry.item_type,
                            protection_index: entry.item_protection_index,
                            name: entry.item_name.take().unwrap_or_default(),
                            content_type: std::mem::take(&mut entry.content_type),
                            hidden: entry.is_hidden(),
                            location: None,
                        })?;
                    }
                },
                BoxBody::ItemReference(mut iref) => this.references = std::mem::take(&mut iref.references),
                BoxBody::ItemLocation(mut iloc) => locations = std::mem::take(&mut iloc.items),
                BoxBody::ItemData(mut idat) => this.idat = std::mem::take(&mut idat.data),
                BoxBody::ItemProperties(mut iprp) => {
                    for b in iprp.children.iter_mut() {
                        match take_body(b) {
                            BoxBody::ItemPropertyContainer(mut ipco) => {
                                this.properties = std::mem::take(&mut ipco.properties);
                            },
                            BoxBody::ItemPropertyAssociation(mut ipma) => {
                                for entry in ipma.entries.iter_mut() {
                                    this.associations.push(ItemPropertyAssociation {
                                        item_id: entry.item_id,
                                        associations: std::mem::take(&mut entry.associations),
                                    })?;
                                }
                            },
                            _ => {},
                        }
                    }
                },
                BoxBody::ItemProtection(ipro) => this.protection = ipro.into_entries(),
                _ => {},
            }
        }

        this.build_index()?;
        this.attach_locations(locations, config)?;
        this.validate(config)?;
        debug!("context {}: {} items, {} references", this.id, this.items.len(), this.references.len());
        Ok(this)
    }

    fn build_index(&mut self) -> Result<()> {
        let mut index = TryVec::with_capacity(self.items.len())?;
        for (pos, item) in self.items.iter().enumerate() {
            index.push((item.id, pos))?;
        }
        index.sort_unstable_by_key(|&(id, _)| id);
        if index.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(Error::InvalidData("duplicate item id"));
        }
        self.index = index;
        Ok(())
    }

    fn attach_locations(&mut self, mut locations: TryVec<ItemLocation>, config: &ParseConfig) -> Result<()> {
        for loc in locations.iter_mut() {
            let Some(pos) = self.position(loc.item_id) else {
                if config.lenient {
                    warn!("iloc entry for unknown item {}", loc.item_id);
                    continue;
                }
                return Err(Error::InvalidData("iloc entry for unknown item"));
            };
            let item = &mut self.items[pos];
            if item.location.is_some() {
                return Err(Error::InvalidData("item has more than one iloc entry"));
            }
            item.location = Some(ItemLocation {
                item_id: loc.item_id,
                construction_method: loc.construction_method,
                data_reference_index: loc.data_reference_index,
                base_offset: loc.base_offset,
                extents: std::mem::take(&mut loc.extents),
            });
        }
        Ok(())
    }

    fn validate(&mut self, config: &ParseConfig) -> Result<()> {
        let protection_count = self.protection.len();
        for item in self.items.iter_mut() {
            if usize::from(item.protection_index) > protection_count {
                if !config.lenient {
                    return Err(Error::InvalidData("item protection index past the ipro entries"));
                }
                warn!("item {} protection index {} out of range", item.id, item.protection_index);
                item.protection_index = 0;
            }
        }

        let mut dangling = false;
        for r in self.references.iter() {
            let unknown = std::iter::once(&r.from_item_id)
                .chain(r.to_item_ids.iter())
                .any(|&id| self.position(id).is_none());
            if unknown {
                if !config.lenient {
                    return Err(Error::InvalidData("reference to an unknown item"));
                }
                warn!("dropping '{}' reference from item {} to an unknown item", r.reference_type, r.from_item_id);
                dangling = true;
            }
        }
        if dangling {
            let mut kept = TryVec::with_capacity(self.references.len())?;
            for r in self.references.iter_mut() {
                let known = std::iter::once(&r.from_item_id)
                    .chain(r.to_item_ids.iter())
                    .all(|&id| self.index.binary_search_by_key(&id, |&(i, _)| i).is_ok());
                if known {
                    kept.push(ItemReference {
                        reference_type: r.reference_type,
                        from_item_id: r.from_item_id,
                        to_item_ids: std::mem::take(&mut r.to_item_ids),
                        size_field: r.size_field,
                    })?;
                }
            }
            self.references = kept;
        }

        if let Some(primary) = self.primary_item
            && self.position(primary).is_none()
        {
            if !config.lenient {
                return Err(Error::InvalidData("primary item does not exist"));
            }
            warn!("primary item {primary} does not exist");
            self.primary_item = None;
        }
        Ok(())
    }

    pub(crate) fn position(&self, id: ItemId) -> Option<usize> {
        let found = self.index.binary_search_by_key(&id, |&(i, _)| i).ok()?;
        Some(self.index[found].1)
    }

    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    #[must_use]
    pub fn handler_type(&self) -> Option<FourCC> {
        self.handler_type
    }

    #[must_use]
    pub fn primary_item(&self) -> Option<ItemId> {
        self.primary_item
    }

    #[must_use]
    pub fn track(&self) -> Option<&TrackInfo> {
        self.track.as_ref()
    }

    /// Items in declaration order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn item(&self, id: ItemId) -> Result<&Item> {
        self.position(id).map(|pos| &self.items[pos]).ok_or(Error::ItemNotFound(id))
    }

    #[must_use]
    pub fn references(&self) -> &[ItemReference] {
        &self.references
    }

    #[must_use]
    pub fn idat(&self) -> &[u8] {
        &self.idat
    }

    fn has_reference_from(&self, id: ItemId, reference_type: FourCC) -> bool {
        self.references.iter().any(|r| r.from_item_id == id && r.reference_type == reference_type)
    }

    /// Thumbnails and auxiliary images point at the image they belong to.
    pub(crate) fn is_thumbnail_or_auxiliary(&self, id: ItemId) -> bool {
        self.has_reference_from(id, FourCC::THMB) || self.has_reference_from(id, FourCC::AUXL)
    }

    pub(crate) fn is_derivation_input(&self, id: ItemId) -> bool {
        self.references
            .iter()
            .any(|r| r.reference_type == FourCC::DIMG && r.to_item_ids.contains(&id))
    }

    /// Matching item ids in declaration order.
    pub fn item_list_by_type(&self, filter: ItemTypeFilter) -> Result<TryVec<ItemId>> {
        let mut ids = TryVec::new();
        for item in self.items.iter() {
            let matches = match filter {
                ItemTypeFilter::Type(t) => item.item_type == t,
                ItemTypeFilter::Master => {
                    item.item_type.is_coded_image_type() && !self.is_thumbnail_or_auxiliary(item.id)
                },
            };
            if matches {
                ids.push(item.id)?;
            }
        }
        Ok(ids)
    }

    /// Image items a viewer would present on their own: not hidden, not
    /// thumbnails, not auxiliary, not inputs to a derived image.
    ///
    /// Hidden items are excluded even without a `dimg` edge, since grids
    /// lacking one take their tiles from the hidden coded images.
    pub fn top_level_images(&self) -> Result<TryVec<ItemId>> {
        let mut ids = TryVec::new();
        for item in self.items.iter() {
            let is_image = item.item_type.is_coded_image_type() || item.item_type.is_derived_image_type();
            if is_image
                && !item.hidden
                && !self.is_thumbnail_or_auxiliary(item.id)
                && !self.is_derivation_input(item.id)
            {
                ids.push(item.id)?;
            }
        }
        Ok(ids)
    }

    /// Targets of `from`'s references of one type, in stored order. Empty
    /// when the item exists but has no such reference.
    pub fn referenced_items_by_type(&self, from: ItemId, reference_type: FourCC) -> Result<TryVec<ItemId>> {
        self.item(from)?;
        let mut ids = TryVec::new();
        for r in self.references.iter() {
            if r.from_item_id == from && r.reference_type == reference_type {
                ids.extend_from_slice(&r.to_item_ids)?;
            }
        }
        Ok(ids)
    }

    /// Items holding a reference of one type to `to`, in declaration order
    /// of the references.
    pub fn referencing_items_by_type(&self, to: ItemId, reference_type: FourCC) -> Result<TryVec<ItemId>> {
        self.item(to)?;
        let mut ids: TryVec<ItemId> = TryVec::new();
        for r in self.references.iter() {
            if r.reference_type == reference_type && r.to_item_ids.contains(&to) && !ids.contains(&r.from_item_id) {
                ids.push(r.from_item_id)?;
            }
        }
        Ok(ids)
    }

    /// The bytes of an item. Single-extent items borrow from `file` or the
    /// `idat` payload; multi-extent items are concatenated.
    pub fn item_data<'d>(&'d self, file: &'d [u8], id: ItemId) -> Result<Cow<'d, [u8]>> {
        let location = self.item(id)?.location.as_ref().ok_or(Error::NoItemData(id))?;
        if location.data_reference_index != 0 {
            return Err(Error::Unsupported("external data reference"));
        }
        let source: &'d [u8] = match location.construction_method {
            ConstructionMethod::File => file,
            ConstructionMethod::Idat => &self.idat,
            ConstructionMethod::Item => return Err(Error::Unsupported("item construction method")),
        };
        let ranges = location.ranges()?;
        match &ranges[..] {
            [] => Ok(Cow::Borrowed(&[])),
            [range] => Ok(Cow::Borrowed(range.slice(source)?)),
            _ => {
                let mut total = 0usize;
                for range in ranges.iter() {
                    total = total
                        .checked_add(range.slice(source)?.len())
                        .ok_or(Error::InvalidData("item size overflow"))?;
                }
                let mut data = std::vec::Vec::new();
                data.try_reserve_exact(total).map_err(|_| Error::OutOfMemory)?;
                for range in ranges.iter() {
                    data.extend_from_slice(range.slice(source)?);
                }
                Ok(Cow::Owned(data))
            },
        }
    }

    /// Properties associated with an item, in association order.
    pub fn item_properties(&self, id: ItemId) -> Result<impl Iterator<Item = &IsoBox>> {
        self.item(id)?;
        Ok(self
            .associations
            .iter()
            .filter(move |a| a.item_id == id)
            .flat_map(|a| a.associations.iter())
            .filter_map(|p| {
                let index = usize::from(p.property_index).checked_sub(1)?;
                self.properties.get(index)
            }))
    }

    /// The item's decoder configuration property, if any.
    pub fn decoder_config(&self, id: ItemId) -> Result<Option<DecoderConfig<'_>>> {
        Ok(self.item_properties(id)?.find_map(DecoderConfig::from_property))
    }

    /// The item's bytes preceded by its decoder setup: parameter sets for
    /// HEVC and AVC (with NAL length prefixes turned into start codes),
    /// configuration OBUs for AV1, header bytes for JPEG.
    pub fn item_data_with_decoder_parameters(&self, file: &[u8], id: ItemId) -> Result<TryVec<u8>> {
        let data = self.item_data(file, id)?;
        match self.decoder_config(id)? {
            Some(config) => config.elementary_stream(&data),
            None => {
                debug!("item {id} has no decoder configuration");
                let mut out = TryVec::with_capacity(data.len())?;
                out.extend_from_slice(&data)?;
                Ok(out)
            },
        }
    }

    /// Width and height from the item's `ispe` property.
    pub fn item_dimensions(&self, id: ItemId) -> Result<Option<(u32, u32)>> {
        Ok(self.item_properties(id)?.find_map(|p| match &p.body {
            BoxBody::ImageSpatialExtents(ispe) => Some((ispe.width, ispe.height)),
            _ => None,
        }))
    }

    /// The protection scheme applied to an item, `None` when unprotected.
    pub fn protection_scheme(&self, id: ItemId) -> Result<Option<&ProtectionSchemeInfoBox>> {
        let index = usize::from(self.item(id)?.protection_index);
        let Some(index) = index.checked_sub(1) else {
            return Ok(None);
        };
        self.protection
            .get(index)
            .map(Some)
            .ok_or(Error::IndexOutOfRange { index, count: self.protection.len() })
    }

    #[must_use]
    pub fn protection_schemes(&self) -> &[ProtectionSchemeInfoBox] {
        &self.protection
    }

    /// Every item `id` is derived from through `dimg` edges, depth first and
    /// each listed once. Cycles and chains longer than `max_depth` are
    /// rejected.
    pub fn derivation_sources(&self, id: ItemId, max_depth: usize) -> Result<TryVec<ItemId>> {
        struct Frame {
            item: ItemId,
            sources: TryVec<ItemId>,
            next: usize,
        }

        let max_depth = max_depth.min(MAX_REFERENCE_DEPTH - 1);
        let mut visited = TryVec::with_capacity(self.items.len())?;
        for _ in 0..self.items.len() {
            visited.push(false)?;
        }
        let mut out = TryVec::new();
        let mut path: ArrayVec<Frame, MAX_REFERENCE_DEPTH> = ArrayVec::new();
        path.push(Frame { item: id, sources: self.referenced_items_by_type(id, FourCC::DIMG)?, next: 0 });

        while let Some(frame) = path.last_mut() {
            let Some(&source) = frame.sources.get(frame.next) else {
                path.pop();
                continue;
            };
            frame.next += 1;
            if path.iter().any(|f| f.item == source) {
                return Err(Error::MalformedContent("derivation cycle"));
            }
            let pos = self.position(source).ok_or(Error::ItemNotFound(source))?;
            if visited[pos] {
                continue;
            }
            if path.len() > max_depth {
                return Err(Error::MalformedContent("derivation chain too deep"));
            }
            visited[pos] = true;
            out.push(source)?;
            let sources = self.referenced_items_by_type(source, FourCC::DIMG)?;
            path.try_push(Frame { item: source, sources, next: 0 })
                .map_err(|_| Error::MalformedContent("derivation chain too deep"))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{
        ItemInfoBox, ItemInfoEntry, ItemLocationBox, ItemPropertiesBox, ItemPropertyAssociationBox,
        ItemPropertyContainerBox, ItemReferenceBox, PrimaryItemBox, PropertyAssociation,
    };
    use crate::meta::{ImageSpatialExtentsProperty, ItemDataBox};

    fn meta_with(items: &[(u32, &[u8; 4])], refs: &[(&[u8; 4], u32, &[u32])]) -> MetaBox {
        let mut meta = MetaBox::new();
        let mut iinf = ItemInfoBox::new();
        for &(id, t) in items {
            iinf.entries.push(ItemInfoEntry::new(id, FourCC::from(t))).unwrap();
        }
        meta.push(IsoBox::new(BoxBody::ItemInfo(iinf)).unwrap()).unwrap();
        let mut iref = ItemReferenceBox::new();
        for &(t, from, to) in refs {
            iref.add_reference(FourCC::from(t), from, to).unwrap();
        }
        meta.push(IsoBox::new(BoxBody::ItemReference(iref)).unwrap()).unwrap();
        meta
    }

    fn build(meta: MetaBox) -> Result<Context> {
        Context::from_meta(ContextId::ROOT, meta, None, &ParseConfig::default())
    }

    #[test]
    fn master_excludes_thumbnails_and_auxiliary_images() {
        let ctx = build(meta_with(
            &[(1, b"hvc1"), (2, b"hvc1"), (3, b"hvc1"), (4, b"Exif")],
            &[(b"thmb", 2, &[1]), (b"auxl", 3, &[1]), (b"cdsc", 4, &[1])],
        ))
        .unwrap();
        assert_eq!(&ctx.item_list_by_type(ItemTypeFilter::Master).unwrap()[..], &[1]);
        assert_eq!(&ctx.item_list_by_type(ItemTypeFilter::parse("hvc1").unwrap()).unwrap()[..], &[1, 2, 3]);
        assert!(ctx.item_list_by_type(ItemTypeFilter::parse("abcd").unwrap()).unwrap().is_empty());
        assert!(matches!(ItemTypeFilter::parse("toolong"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn reference_queries_distinguish_empty_from_missing() {
        let ctx = build(meta_with(&[(1, b"hvc1"), (2, b"Exif")], &[(b"cdsc", 2, &[1])])).unwrap();
        assert!(ctx.referenced_items_by_type(1, FourCC::CDSC).unwrap().is_empty());
        assert_eq!(&ctx.referenced_items_by_type(2, FourCC::CDSC).unwrap()[..], &[1]);
        assert!(matches!(ctx.referenced_items_by_type(9, FourCC::CDSC), Err(Error::ItemNotFound(9))));
        assert_eq!(&ctx.referencing_items_by_type(1, FourCC::CDSC).unwrap()[..], &[2]);
    }

    #[test]
    fn duplicate_ids_and_dangling_references() {
        assert!(matches!(build(meta_with(&[(1, b"hvc1"), (1, b"hvc1")], &[])), Err(Error::InvalidData(_))));

        let dangling = || meta_with(&[(1, b"hvc1")], &[(b"cdsc", 1, &[7])]);
        assert!(matches!(build(dangling()), Err(Error::InvalidData(_))));
        let lenient = ParseConfig::default().lenient(true);
        let ctx = Context::from_meta(ContextId::ROOT, dangling(), None, &lenient).unwrap();
        assert!(ctx.references().is_empty());
    }

    #[test]
    fn item_limit_is_enforced() {
        let config = ParseConfig::default().with_max_items(1);
        let err = Context::from_meta(ContextId::ROOT, meta_with(&[(1, b"hvc1"), (2, b"hvc1")], &[]), None, &config);
        assert!(matches!(err, Err(Error::ResourceLimitExceeded(_))));
    }

    #[test]
    fn derivation_sources_walks_dimg_and_rejects_cycles() {
        let ctx = build(meta_with(
            &[(1, b"iden"), (2, b"grid"), (3, b"hvc1"), (4, b"hvc1")],
            &[(b"dimg", 1, &[2]), (b"dimg", 2, &[3, 4, 3])],
        ))
        .unwrap();
        assert_eq!(&ctx.derivation_sources(1, 16).unwrap()[..], &[2, 3, 4]);
        assert!(matches!(ctx.derivation_sources(1, 1), Err(Error::MalformedContent(_))));
        assert!(ctx.derivation_sources(3, 16).unwrap().is_empty());

        let cyclic = build(meta_with(
            &[(1, b"iden"), (2, b"iden")],
            &[(b"dimg", 1, &[2]), (b"dimg", 2, &[1])],
        ))
        .unwrap();
        assert!(matches!(cyclic.derivation_sources(1, 16), Err(Error::MalformedContent(_))));
    }

    #[test]
    fn item_data_from_idat_and_properties() {
        let mut meta = meta_with(&[(1, b"jpeg")], &[]);
        meta.push(IsoBox::new(BoxBody::PrimaryItem(PrimaryItemBox::new(1))).unwrap()).unwrap();
        let mut iloc = ItemLocationBox::new();
        let mut loc = ItemLocation::new(1, ConstructionMethod::Idat);
        loc.add_extent(1, 2).unwrap();
        loc.add_extent(4, 1).unwrap();
        iloc.add_item(loc).unwrap();
        meta.push(IsoBox::new(BoxBody::ItemLocation(iloc)).unwrap()).unwrap();
        let mut data = TryVec::new();
        data.extend_from_slice(b"abcdef").unwrap();
        meta.push(IsoBox::new(BoxBody::ItemData(ItemDataBox { data })).unwrap()).unwrap();

        let mut ipco = ItemPropertyContainerBox::default();
        ipco.properties
            .push(IsoBox::new(BoxBody::ImageSpatialExtents(ImageSpatialExtentsProperty::new(64, 48))).unwrap())
            .unwrap();
        let mut ipma = ItemPropertyAssociationBox::default();
        let mut associations = TryVec::new();
        associations.push(PropertyAssociation { essential: false, property_index: 1 }).unwrap();
        ipma.entries.push(ItemPropertyAssociation { item_id: 1, associations }).unwrap();
        let mut iprp = ItemPropertiesBox::default();
        iprp.children.push(IsoBox::new(BoxBody::ItemPropertyContainer(ipco)).unwrap()).unwrap();
        iprp.children.push(IsoBox::new(BoxBody::ItemPropertyAssociation(ipma)).unwrap()).unwrap();
        meta.push(IsoBox::new(BoxBody::ItemProperties(iprp)).unwrap()).unwrap();

        let ctx = build(meta).unwrap();
        assert_eq!(ctx.primary_item(), Some(1));
        assert_eq!(&ctx.item_data(&[], 1).unwrap()[..], b"bce");
        assert_eq!(ctx.item_dimensions(1).unwrap(), Some((64, 48)));
        assert!(ctx.decoder_config(1).unwrap().is_none());
        assert_eq!(&ctx.item_data_with_decoder_parameters(&[], 1).unwrap()[..], b"bce");
        assert!(ctx.protection_scheme(1).unwrap().is_none());
    }

    #[test]
    fn item_without_location_has_no_data() {
        let ctx = build(meta_with(&[(1, b"hvc1")], &[])).unwrap();
        assert!(matches!(ctx.item_data(b"", 1), Err(Error::NoItemData(1))));
    }
}
