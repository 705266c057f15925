#![no_main]
use heif_parse::{HeifReader, ParseConfig, read_boxes, write_boxes};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    // Whatever serializes must parse again.
    if let Ok(boxes) = read_boxes(data)
        && let Ok(out) = write_boxes(&boxes)
    {
        read_boxes(&out).expect("written boxes do not parse");
    }

    let config = ParseConfig::default().with_peak_memory_limit(1 << 24).with_max_grid_tiles(64);
    let mut reader = HeifReader::with_config(config);
    if reader.initialize(Cursor::new(data)).is_err() {
        return;
    }
    let Ok(props) = reader.get_file_properties() else { return };
    if let Some(ctx) = props.root_context
        && let Ok(ids) = reader.get_item_list_by_type(ctx, "grid")
    {
        for id in ids.iter() {
            let _ = reader.get_item_grid(ctx, *id);
            let _ = reader.get_derivation_sources(ctx, *id);
        }
    }
    for ctx in props.track_contexts.iter() {
        if let Ok(count) = reader.get_track_sample_count(*ctx) {
            for i in 0..count.min(16) as usize {
                let _ = reader.get_track_sample_data(*ctx, i);
            }
        }
    }
});
