//! List the items, references and grids of a HEIF file
use heif_parse::{FourCC, HeifReader};
use std::env;
use std::fs::File;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <heif-file>", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let f = File::open(path).expect("Failed to open file");
    let mut reader = HeifReader::new();
    if let Err(e) = reader.initialize(f) {
        eprintln!("Parse error: {}", e);
        std::process::exit(1);
    }

    let props = reader.get_file_properties().expect("initialized");
    println!("File: {}", path);
    println!("Brands: {:?}", &props.brands[..]);
    println!("Features: {:#x}", props.features.bits());

    if let Some(ctx) = props.root_context {
        println!("Primary item: {:?}", reader.get_primary_item(ctx).expect("root context"));
        let masters = reader.get_item_list_by_type(ctx, "master").expect("root context");
        println!("Master images: {:?}", &masters[..]);
        for id in reader.get_item_list_by_type(ctx, "grid").expect("root context").iter() {
            match reader.get_item_grid(ctx, *id) {
                Ok(grid) => println!(
                    "  Grid {}: {}x{} tiles, {}x{} px, tiles {:?}",
                    id,
                    grid.rows(),
                    grid.columns(),
                    grid.output_width,
                    grid.output_height,
                    &grid.tile_item_ids[..]
                ),
                Err(e) => println!("  Grid {}: {}", id, e),
            }
        }
        for id in masters.iter() {
            let size = reader.get_item_data(ctx, *id).map(|d| d.len());
            let dims = reader.get_item_dimensions(ctx, *id).ok().flatten();
            let thumbs = reader.get_referencing_items_by_type(ctx, *id, FourCC::THMB).expect("known item");
            let metadata = reader.get_referencing_items_by_type(ctx, *id, FourCC::CDSC).expect("known item");
            println!(
                "  Item {}: {:?} bytes, dimensions {:?}, thumbnails {:?}, metadata {:?}",
                id,
                size,
                dims,
                &thumbs[..],
                &metadata[..]
            );
        }
    }

    for ctx in props.track_contexts.iter() {
        let count = reader.get_track_sample_count(*ctx).expect("track context");
        println!("Track {}: {} samples", ctx, count);
    }
}
