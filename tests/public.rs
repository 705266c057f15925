// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use heif_parse::{
    read_boxes, write_boxes, BoxBody, BoxType, ChunkOffsetBox, ConstructionMethod, ContainerBox, ContextId, Error,
    FileFeatures, FileTypeBox, FourCC, HandlerBox, HeifReader, HevcConfigurationBox, HevcNalArray,
    ImageSpatialExtentsProperty, IsoBox, ItemDataBox, ItemInfoBox, ItemInfoEntry, ItemLocation, ItemLocationBox,
    ItemPropertiesBox, ItemPropertyAssociation, ItemPropertyAssociationBox, ItemPropertyContainerBox,
    ItemProtectionBox, ItemReferenceBox, MediaDataBox, MediaHeaderBox, MetaBox, ParseConfig, PrimaryItemBox,
    PropertyAssociation, ProtectionSchemeInfoBox, SampleSizeBox, SampleToChunkBox, SampleToChunkEntry,
    SchemeTypeBox, TimeToSampleBox, TimeToSampleEntry, TrackHeaderBox, TryVec,
};
use std::io::Cursor;

static CORPUS: &str = "tests/corpus";

const ROOT: ContextId = ContextId::ROOT;

fn try_vec<T: Clone>(items: &[T]) -> TryVec<T> {
    let mut v = TryVec::new();
    for item in items {
        v.push(item.clone()).unwrap();
    }
    v
}

fn boxed(body: BoxBody) -> IsoBox {
    IsoBox::new(body).unwrap()
}

/// Describes a synthetic file; `build` serializes it with the crate's own
/// box writers.
#[derive(Default)]
struct TestFile {
    /// (id, type, hidden)
    items: Vec<(u32, &'static [u8; 4], bool)>,
    references: Vec<(&'static [u8; 4], u32, Vec<u32>)>,
    /// Stored in `mdat`, one extent per chunk.
    mdat_payloads: Vec<(u32, Vec<Vec<u8>>)>,
    idat_payloads: Vec<(u32, Vec<u8>)>,
    primary: Option<u32>,
    ispe: Vec<(u32, u32, u32)>,
    hvcc: Vec<u32>,
    /// (item, scheme type)
    protected: Vec<(u32, &'static [u8; 4])>,
    /// One `pict` track with these samples in a single chunk.
    samples: Vec<Vec<u8>>,
    no_meta: bool,
}

impl TestFile {
    fn hvcc() -> HevcConfigurationBox {
        let mut hvcc = HevcConfigurationBox::default();
        let mut vps = TryVec::new();
        vps.push(try_vec(&[0x40, 0x01, 0x0c])).unwrap();
        hvcc.arrays
            .push(HevcNalArray { array_completeness: true, reserved: false, nal_unit_type: 32, nal_units: vps })
            .unwrap();
        hvcc
    }

    fn meta(&self, mdat_start: u64) -> MetaBox {
        let mut meta = MetaBox::new();
        meta.push(boxed(BoxBody::Handler(HandlerBox::new(FourCC::PICT).unwrap()))).unwrap();
        if let Some(primary) = self.primary {
            meta.push(boxed(BoxBody::PrimaryItem(PrimaryItemBox::new(primary)))).unwrap();
        }

        let mut iinf = ItemInfoBox::new();
        for &(id, item_type, hidden) in &self.items {
            let mut entry = ItemInfoEntry::new(id, FourCC::from(item_type)).hidden(hidden);
            if let Some(pos) = self.protected.iter().position(|&(item, _)| item == id) {
                entry.item_protection_index = pos as u16 + 1;
            }
            iinf.add_entry(entry).unwrap();
        }
        meta.push(boxed(BoxBody::ItemInfo(iinf))).unwrap();

        if !self.references.is_empty() {
            let mut iref = ItemReferenceBox::new();
            for (reference_type, from, to) in &self.references {
                iref.add_reference(FourCC::from(*reference_type), *from, to).unwrap();
            }
            meta.push(boxed(BoxBody::ItemReference(iref))).unwrap();
        }

        let mut iloc = ItemLocationBox::new();
        let mut offset = mdat_start;
        for (id, chunks) in &self.mdat_payloads {
            let mut loc = ItemLocation::new(*id, ConstructionMethod::File);
            for chunk in chunks {
                loc.add_extent(offset, chunk.len() as u64).unwrap();
                offset += chunk.len() as u64;
            }
            iloc.add_item(loc).unwrap();
        }
        let mut idat = Vec::new();
        for (id, payload) in &self.idat_payloads {
            let mut loc = ItemLocation::new(*id, ConstructionMethod::Idat);
            loc.add_extent(idat.len() as u64, payload.len() as u64).unwrap();
            idat.extend_from_slice(payload);
            iloc.add_item(loc).unwrap();
        }
        meta.push(boxed(BoxBody::ItemLocation(iloc))).unwrap();
        if !idat.is_empty() {
            meta.push(boxed(BoxBody::ItemData(ItemDataBox { data: try_vec(&idat) }))).unwrap();
        }

        let mut ipco = ItemPropertyContainerBox::default();
        let mut ipma = ItemPropertyAssociationBox::default();
        let mut associate = |item_id: u32, property: IsoBox| {
            ipco.properties.push(property).unwrap();
            let property_index = ipco.properties.len() as u16;
            let association = PropertyAssociation { essential: true, property_index };
            match ipma.entries.iter_mut().find(|e| e.item_id == item_id) {
                Some(entry) => entry.associations.push(association).unwrap(),
                None => ipma
                    .entries
                    .push(ItemPropertyAssociation { item_id, associations: try_vec(&[association]) })
                    .unwrap(),
            }
        };
        for &(id, w, h) in &self.ispe {
            associate(id, boxed(BoxBody::ImageSpatialExtents(ImageSpatialExtentsProperty::new(w, h))));
        }
        for &id in &self.hvcc {
            associate(id, boxed(BoxBody::HevcConfig(Self::hvcc())));
        }
        if !ipco.properties.is_empty() {
            let mut iprp = ItemPropertiesBox::default();
            iprp.children.push(boxed(BoxBody::ItemPropertyContainer(ipco))).unwrap();
            iprp.children.push(boxed(BoxBody::ItemPropertyAssociation(ipma))).unwrap();
            meta.push(boxed(BoxBody::ItemProperties(iprp))).unwrap();
        }

        if !self.protected.is_empty() {
            let mut ipro = ItemProtectionBox::new();
            for &(_, scheme) in &self.protected {
                let scheme = SchemeTypeBox::new(FourCC::from(scheme), 0x0001_0000);
                ipro.add_entry(ProtectionSchemeInfoBox::new(scheme, Some(FourCC::HVC1)).unwrap()).unwrap();
            }
            meta.push(boxed(BoxBody::ItemProtection(ipro))).unwrap();
        }
        meta
    }

    fn moov(&self, samples_start: u64) -> IsoBox {
        let count = self.samples.len() as u32;
        let mut stbl = ContainerBox::new(BoxType::SampleTableBox);
        let mut stts = TimeToSampleBox::default();
        stts.entries.push(TimeToSampleEntry { sample_count: count, sample_delta: 512 }).unwrap();
        stbl.children.push(boxed(BoxBody::TimeToSample(stts))).unwrap();
        let mut stsc = SampleToChunkBox::default();
        stsc.entries
            .push(SampleToChunkEntry { first_chunk: 1, samples_per_chunk: count, sample_description_index: 1 })
            .unwrap();
        stbl.children.push(boxed(BoxBody::SampleToChunk(stsc))).unwrap();
        let sizes: Vec<u32> = self.samples.iter().map(|s| s.len() as u32).collect();
        let stsz = SampleSizeBox { sample_count: count, entry_sizes: try_vec(&sizes), ..Default::default() };
        stbl.children.push(boxed(BoxBody::SampleSize(stsz))).unwrap();
        let stco = ChunkOffsetBox { offsets: try_vec(&[samples_start]), ..Default::default() };
        stbl.children.push(boxed(BoxBody::ChunkOffset(stco))).unwrap();

        let mut minf = ContainerBox::new(BoxType::MediaInformationBox);
        minf.children.push(boxed(BoxBody::Container(stbl))).unwrap();
        let mut mdia = ContainerBox::new(BoxType::MediaBox);
        mdia.children.push(boxed(BoxBody::MediaHeader(MediaHeaderBox::new(1000, 1536)))).unwrap();
        mdia.children.push(boxed(BoxBody::Handler(HandlerBox::new(FourCC::PICT).unwrap()))).unwrap();
        mdia.children.push(boxed(BoxBody::Container(minf))).unwrap();
        let mut trak = ContainerBox::new(BoxType::TrackBox);
        trak.children.push(boxed(BoxBody::TrackHeader(TrackHeaderBox::new(1, 64, 64).unwrap()))).unwrap();
        trak.children.push(boxed(BoxBody::Container(mdia))).unwrap();
        let mut moov = ContainerBox::new(BoxType::MovieBox);
        moov.children.push(boxed(BoxBody::Container(trak))).unwrap();
        boxed(BoxBody::Container(moov))
    }

    fn head(&self, mdat_start: u64) -> Vec<IsoBox> {
        let ftyp = FileTypeBox {
            major_brand: FourCC::from(b"heic"),
            minor_version: 0,
            compatible_brands: try_vec(&[FourCC::from(b"mif1"), FourCC::from(b"heic")]),
        };
        let mut head = vec![boxed(BoxBody::FileType(ftyp))];
        if !self.no_meta {
            head.push(boxed(BoxBody::Meta(self.meta(mdat_start))));
        }
        if !self.samples.is_empty() {
            let items_len: u64 = self.mdat_payloads.iter().flat_map(|(_, c)| c).map(|c| c.len() as u64).sum();
            head.push(self.moov(mdat_start + items_len));
        }
        head
    }

    fn build(&self) -> Vec<u8> {
        // iloc and stco field widths do not depend on the offsets, so the
        // first pass only measures.
        let head_len = write_boxes(&self.head(0)).unwrap().len() as u64;
        let mut out = write_boxes(&self.head(head_len + 8)).unwrap();
        let mut mdat = Vec::new();
        for chunk in self.mdat_payloads.iter().flat_map(|(_, c)| c) {
            mdat.extend_from_slice(chunk);
        }
        for sample in &self.samples {
            mdat.extend_from_slice(sample);
        }
        out.extend(write_boxes(&[boxed(BoxBody::MediaData(MediaDataBox { data: try_vec(&mdat) }))]).unwrap());
        out
    }

    fn open(&self) -> HeifReader<Cursor<Vec<u8>>> {
        let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::max()).try_init();
        let mut reader = HeifReader::new();
        reader.initialize(Cursor::new(self.build())).expect("initialize failed");
        reader
    }
}

fn grid_file(rows: u16, columns: u16, tiles: u32, with_dimg: bool) -> TestFile {
    let grid = heif_parse::ImageGrid::new(rows, columns, 64 * u32::from(columns), 64 * u32::from(rows)).unwrap();
    let mut file = TestFile { primary: Some(1), ..Default::default() };
    file.items.push((1, b"grid", false));
    file.idat_payloads.push((1, grid.to_bytes().unwrap()));
    let tile_ids: Vec<u32> = (2..2 + tiles).collect();
    for &id in &tile_ids {
        file.items.push((id, b"hvc1", true));
        file.mdat_payloads.push((id, vec![vec![id as u8; 4]]));
    }
    if with_dimg {
        file.references.push((b"dimg", 1, tile_ids));
    }
    file
}

#[test]
fn end_to_end_grid_of_two_masters() {
    let mut file = TestFile { primary: Some(1), ..Default::default() };
    file.items = vec![(1, b"grid", false), (2, b"hvc1", true), (3, b"hvc1", true)];
    file.references.push((b"dimg", 1, vec![2, 3]));
    let grid = heif_parse::ImageGrid::new(1, 2, 128, 64).unwrap();
    file.idat_payloads.push((1, grid.to_bytes().unwrap()));
    file.mdat_payloads.push((2, vec![b"AAAA".to_vec()]));
    file.mdat_payloads.push((3, vec![b"BBBBBB".to_vec()]));
    let reader = file.open();

    let props = reader.get_file_properties().unwrap();
    assert_eq!(props.root_context, Some(ROOT));
    assert_eq!(props.features, FileFeatures::SINGLE_IMAGE);
    assert_eq!(&props.brands[..], &[FourCC::from(b"heic"), FourCC::from(b"mif1"), FourCC::from(b"heic")]);

    assert_eq!(&reader.get_item_list_by_type(ROOT, "master").unwrap()[..], &[2, 3]);
    assert_eq!(&reader.get_item_data(ROOT, 2).unwrap()[..], b"AAAA");
    assert_eq!(&reader.get_item_data(ROOT, 3).unwrap()[..], b"BBBBBB");
    assert_eq!(reader.get_primary_item(ROOT).unwrap(), Some(1));
    assert_eq!(reader.get_item_type(ROOT, 1).unwrap(), FourCC::GRID);

    let layout = reader.get_item_grid(ROOT, 1).unwrap();
    assert_eq!((layout.rows(), layout.columns()), (1, 2));
    assert_eq!(&layout.tile_item_ids[..], &[2, 3]);
    assert_eq!(reader.get_item_dimensions(ROOT, 1).unwrap(), Some((128, 64)));
    assert_eq!(&reader.get_derivation_sources(ROOT, 1).unwrap()[..], &[2, 3]);

    match reader.get_referenced_item_data(ROOT, 1, FourCC::CDSC) {
        Err(Error::ReferenceNotFound { from: 1, reference_type }) => assert_eq!(reference_type, b"cdsc"),
        other => panic!("expected ReferenceNotFound, got {other:?}"),
    }
}

#[test]
fn grid_of_two_by_three_needs_six_tiles() {
    let reader = grid_file(2, 3, 6, true).open();
    let layout = reader.get_item_grid(ROOT, 1).unwrap();
    assert_eq!((layout.rows(), layout.columns()), (2, 3));
    assert_eq!(&layout.tile_item_ids[..], &[2, 3, 4, 5, 6, 7]);

    let reader = grid_file(2, 3, 5, true).open();
    assert!(matches!(reader.get_item_grid(ROOT, 1), Err(Error::MalformedGrid(_))));
}

#[test]
fn grid_without_dimg_uses_hidden_tiles_in_declaration_order() {
    let reader = grid_file(2, 2, 4, false).open();
    let layout = reader.get_item_grid(ROOT, 1).unwrap();
    assert_eq!(&layout.tile_item_ids[..], &[2, 3, 4, 5]);
    // hidden tiles are not images of their own
    assert_eq!(reader.get_file_properties().unwrap().features, FileFeatures::SINGLE_IMAGE);
}

#[test]
fn grid_tile_limit_applies() {
    let file = grid_file(2, 3, 6, true);
    let mut reader = HeifReader::with_config(ParseConfig::default().with_max_grid_tiles(4));
    reader.initialize(Cursor::new(file.build())).unwrap();
    assert!(matches!(reader.get_item_grid(ROOT, 1), Err(Error::ResourceLimitExceeded(_))));
    assert!(matches!(reader.get_item_grid(ROOT, 2), Err(Error::InvalidArgument(_))));
}

#[test]
fn item_list_is_order_stable() {
    let mut file = TestFile::default();
    file.items = vec![(7, b"hvc1", false), (3, b"Exif", false), (5, b"hvc1", false), (1, b"hvc1", false)];
    let reader = file.open();
    let first = reader.get_item_list_by_type(ROOT, "hvc1").unwrap();
    assert_eq!(&first[..], &[7, 5, 1]);
    for _ in 0..3 {
        assert_eq!(&reader.get_item_list_by_type(ROOT, "hvc1").unwrap()[..], &first[..]);
    }
    assert!(matches!(reader.get_item_list_by_type(ROOT, "hvc"), Err(Error::InvalidArgument(_))));
}

#[test]
fn referenced_items_empty_versus_missing() {
    let mut file = TestFile::default();
    file.items = vec![(1, b"hvc1", false), (2, b"Exif", false)];
    file.references.push((b"cdsc", 2, vec![1]));
    file.mdat_payloads.push((1, vec![b"image".to_vec()]));
    file.mdat_payloads.push((2, vec![b"Exif\0\0".to_vec()]));
    let reader = file.open();

    assert!(reader.get_referenced_items_by_type(ROOT, 1, FourCC::CDSC).unwrap().is_empty());
    assert!(matches!(reader.get_referenced_items_by_type(ROOT, 9, FourCC::CDSC), Err(Error::ItemNotFound(9))));
    assert_eq!(&reader.get_referencing_items_by_type(ROOT, 1, FourCC::CDSC).unwrap()[..], &[2]);
    assert_eq!(&reader.get_referenced_item_data(ROOT, 2, FourCC::CDSC).unwrap()[..], b"image");
    assert_eq!(reader.get_item_type(ROOT, 2).unwrap(), FourCC::EXIF);
    assert!(matches!(reader.get_item_type(ROOT, 9), Err(Error::ItemNotFound(9))));
    assert!(matches!(reader.get_item_type(ContextId(4), 1), Err(Error::ContextNotFound(ContextId(4)))));
}

#[test]
fn split_extents_are_concatenated() {
    let mut file = TestFile::default();
    file.items.push((1, b"hvc1", false));
    file.mdat_payloads.push((1, vec![b"abc".to_vec(), b"defg".to_vec()]));
    let reader = file.open();
    assert_eq!(&reader.get_item_data(ROOT, 1).unwrap()[..], b"abcdefg");
}

#[test]
fn protection_schemes_follow_item_indices() {
    let mut file = TestFile::default();
    file.items = vec![(1, b"hvc1", false), (2, b"hvc1", false), (3, b"hvc1", false)];
    file.protected = vec![(2, b"cenc"), (3, b"cbcs")];
    let reader = file.open();

    assert!(reader.get_item_protection_scheme(ROOT, 1).unwrap().is_none());
    let scheme = reader.get_item_protection_scheme(ROOT, 3).unwrap().unwrap();
    assert_eq!(scheme.scheme_type().unwrap().scheme_type, b"cbcs");
    assert_eq!(scheme.original_format(), Some(FourCC::HVC1));
    let scheme = reader.get_item_protection_scheme(ROOT, 2).unwrap().unwrap();
    assert_eq!(scheme.scheme_type().unwrap().scheme_type, b"cenc");
}

#[test]
fn decoder_parameters_precede_item_data() {
    let mut file = TestFile::default();
    file.items.push((1, b"hvc1", false));
    file.hvcc.push(1);
    file.ispe.push((1, 640, 480));
    file.mdat_payloads.push((1, vec![vec![0, 0, 0, 2, 0x26, 0x01]]));
    let reader = file.open();

    assert_eq!(reader.get_item_dimensions(ROOT, 1).unwrap(), Some((640, 480)));
    let stream = reader.get_item_data_with_decoder_parameters(ROOT, 1).unwrap();
    assert_eq!(&stream[..], &[0, 0, 0, 1, 0x40, 0x01, 0x0c, 0, 0, 0, 1, 0x26, 0x01]);
    assert_eq!(&reader.get_item_data(ROOT, 1).unwrap()[..], &[0, 0, 0, 2, 0x26, 0x01]);
}

#[test]
fn single_root_image_is_only_a_single_image() {
    let mut file = TestFile { primary: Some(1), ..Default::default() };
    file.items = vec![(1, b"hvc1", false), (2, b"hvc1", false), (3, b"Exif", false)];
    file.references = vec![(b"thmb", 2, vec![1]), (b"cdsc", 3, vec![1])];
    let props = file.open().get_file_properties().unwrap().features;
    assert_eq!(props, FileFeatures::SINGLE_IMAGE);
    assert!(!props.contains(FileFeatures::IMAGE_COLLECTION));
    assert!(!props.contains(FileFeatures::IMAGE_SEQUENCE));
}

#[test]
fn two_root_images_are_a_collection() {
    let mut file = TestFile::default();
    file.items = vec![(1, b"hvc1", false), (2, b"av01", false)];
    let reader = file.open();
    assert_eq!(reader.get_file_properties().unwrap().features, FileFeatures::IMAGE_COLLECTION);
}

#[test]
fn image_sequence_track() {
    let file = TestFile {
        no_meta: true,
        samples: vec![b"one".to_vec(), b"three".to_vec(), b"two".to_vec()],
        ..Default::default()
    };
    let reader = file.open();
    let props = reader.get_file_properties().unwrap();
    assert_eq!(props.features, FileFeatures::IMAGE_SEQUENCE);
    assert_eq!(props.root_context, None);
    assert_eq!(&props.track_contexts[..], &[ContextId(1)]);

    let track = ContextId(1);
    assert_eq!(reader.get_track_sample_count(track).unwrap(), 3);
    assert_eq!(reader.get_track_sample_data(track, 0).unwrap(), b"one");
    assert_eq!(reader.get_track_sample_data(track, 1).unwrap(), b"three");
    assert_eq!(reader.get_track_sample_data(track, 2).unwrap(), b"two");
    assert_eq!(reader.get_track_sample_duration(track, 2).unwrap(), 512);
    assert!(matches!(reader.get_track_sample_data(track, 3), Err(Error::IndexOutOfRange { index: 3, count: 3 })));
    assert!(reader.get_item_list_by_type(track, "master").unwrap().is_empty());
    assert!(matches!(reader.get_track_sample_count(ROOT), Err(Error::ContextNotFound(_))));
}

#[test]
fn whole_file_round_trips() {
    let mut file = grid_file(2, 2, 4, true);
    file.hvcc = vec![2, 3];
    file.ispe = vec![(1, 128, 128), (2, 64, 64)];
    file.protected = vec![(5, b"cenc")];
    file.samples = vec![b"frame".to_vec()];
    let bytes = file.build();
    let boxes = read_boxes(&bytes).unwrap();
    assert_eq!(boxes.len(), 4);
    assert_eq!(write_boxes(&boxes).unwrap(), bytes);
}

#[test]
fn reader_lifecycle() {
    let bytes = grid_file(1, 1, 1, true).build();
    let mut reader = HeifReader::new();
    assert!(matches!(reader.get_file_properties(), Err(Error::NotInitialized)));

    // cut inside 'meta'
    let truncated = bytes[..40].to_vec();
    assert!(reader.initialize(Cursor::new(truncated)).is_err());
    assert!(!reader.is_initialized());

    reader.initialize(Cursor::new(bytes.clone())).unwrap();
    assert!(matches!(reader.initialize(Cursor::new(bytes.clone())), Err(Error::InvalidState(_))));
    reader.close();
    assert!(matches!(reader.get_item_list_by_type(ROOT, "grid"), Err(Error::NotInitialized)));
    assert!(matches!(reader.initialize(Cursor::new(bytes)), Err(Error::InvalidState(_))));
}

#[test]
fn dangling_reference_needs_lenient_mode() {
    let mut file = TestFile::default();
    file.items = vec![(1, b"hvc1", false), (2, b"Exif", false)];
    file.references.push((b"cdsc", 2, vec![1]));
    let mut bytes = file.build();
    // retarget the reference at item 9, which does not exist
    let pos = bytes.windows(4).position(|w| w == b"cdsc").unwrap();
    assert_eq!(bytes[pos + 9], 1);
    bytes[pos + 9] = 9;

    let mut strict = HeifReader::new();
    assert!(strict.initialize(Cursor::new(bytes.clone())).is_err());
    let mut lenient = HeifReader::with_config(ParseConfig::default().lenient(true));
    lenient.initialize(Cursor::new(bytes)).unwrap();
    assert!(lenient.get_referenced_items_by_type(ROOT, 2, FourCC::CDSC).unwrap().is_empty());
}

#[test]
fn corpus_parses_and_round_trips() {
    let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::max()).try_init();
    if !std::path::Path::new(CORPUS).is_dir() {
        log::warn!("{CORPUS} not present, skipping");
        return;
    }
    let mut errors = 0;
    for entry in walkdir::WalkDir::new(CORPUS) {
        let entry = entry.expect("corpus entry");
        let path = entry.path();
        let ext = path.extension().unwrap_or_default();
        if !path.is_file() || !["heic", "heif", "avif", "hif"].iter().any(|e| ext == *e) {
            continue;
        }
        log::debug!("parsing {:?}", path.display());
        let bytes = std::fs::read(path).expect("bad file");
        let mut reader = HeifReader::new();
        match reader.initialize(Cursor::new(bytes.as_slice())) {
            Ok(()) => {
                let root = reader.get_file_properties().unwrap().root_context;
                if let Some(ctx) = root {
                    for id in reader.get_item_list_by_type(ctx, "grid").unwrap().iter() {
                        if let Err(err) = reader.get_item_grid(ctx, *id) {
                            log::warn!("{:?}: grid {id}: {err}", path.display());
                        }
                    }
                }
                let boxes = read_boxes(&bytes).unwrap();
                assert_eq!(write_boxes(&boxes).unwrap(), bytes, "{:?} does not round-trip", path.display());
            },
            Err(err) if matches!(err.root_cause(), Error::Unsupported(_)) => log::warn!("{err}"),
            Err(err) => {
                log::error!("{:?}: {err}", path.display());
                errors += 1;
            },
        }
    }
    assert_eq!(0, errors);
}
