#![no_main]
use geoglot::{DatabaseBuilder, LocationRecord, MergedRecord, Snapshot};
use libfuzzer_sys::fuzz_target;
use std::net::IpAddr;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let mut builder = DatabaseBuilder::new().with_generated_at(0);
    for cidr in ["1.2.3.4/32", "10.0.0.0/8", "2001:db8::/32", "192.168.0.0/16", "0.0.0.0/0"] {
        if let Ok(network) = cidr.parse() {
            builder.add_record(MergedRecord::new(network, LocationRecord::default()));
        }
    }
    // The fuzzed string as a network, too
    if let Ok(network) = s.parse() {
        builder.add_record(MergedRecord::new(network, LocationRecord::default()));
    }

    if let Ok(built) = builder.build() {
        if let Ok(db) = Snapshot::from_bytes(built.bytes) {
            let _ = db.lookup(s);
            if let Ok(ip) = s.parse::<IpAddr>() {
                let _ = db.lookup_ip(ip);
            }
        }
    }
});
