#![no_main]
use geoglot::ingest::{ingest_blocks, ingest_locations, BlockReader, LocationReader};
use geoglot::Language;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary feed bytes yield rows, diagnostics or a schema error
    if let Ok(reader) = BlockReader::new(data) {
        let _ = ingest_blocks(reader);
    }
    if let Ok(reader) = LocationReader::new(data, &[Language::En, Language::Ar]) {
        let _ = ingest_locations(reader);
    }
});
