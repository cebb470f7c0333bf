// Property tests: lookups agree with a brute-force longest-prefix oracle

use geoglot::{AddressFamily, DatabaseBuilder, LocationRecord, MergedRecord, NetworkKey, Snapshot};
use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr};

fn network_v4() -> impl Strategy<Value = NetworkKey> {
    (any::<u32>(), 0u8..=32).prop_map(|(bits, len)| {
        NetworkKey::new(AddressFamily::V4, u128::from(bits), len).unwrap()
    })
}

/// Index of the winning network: longest prefix, later insert on a tie
fn oracle(networks: &[NetworkKey], addr: IpAddr) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, net) in networks.iter().enumerate() {
        if net.contains(addr) {
            match best {
                Some(b) if networks[b].prefix_len() > net.prefix_len() => {}
                _ => best = Some(i),
            }
        }
    }
    best
}

fn build(networks: &[NetworkKey]) -> Snapshot {
    let mut builder = DatabaseBuilder::new().with_generated_at(0);
    for (i, net) in networks.iter().enumerate() {
        let location = LocationRecord {
            geoname_id: i as u32,
            ..Default::default()
        };
        builder.add_record(MergedRecord::new(*net, location));
    }
    Snapshot::from_bytes(builder.build().unwrap().bytes).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lookup_matches_oracle(
        networks in prop::collection::vec(network_v4(), 1..40),
        samples in prop::collection::vec(any::<u32>(), 1..50),
    ) {
        let db = build(&networks);

        // Check random addresses plus the first address of every network
        let addrs = samples
            .into_iter()
            .map(|p| IpAddr::V4(Ipv4Addr::from(p)))
            .chain(networks.iter().map(|n| n.addr()));

        for addr in addrs {
            let got = db.lookup_ip(addr).unwrap();
            match oracle(&networks, addr) {
                Some(i) => {
                    let got = got.expect("oracle found a covering network");
                    prop_assert_eq!(got.location.geoname_id, i as u32);
                    prop_assert_eq!(got.network, networks[i]);
                }
                None => prop_assert!(got.is_none()),
            }
        }
    }

    #[test]
    fn list_is_sorted_and_complete(networks in prop::collection::vec(network_v4(), 1..40)) {
        let db = build(&networks);
        let listed = db.list(0, 1000).unwrap();

        let mut expected: Vec<NetworkKey> = networks.clone();
        expected.sort_by_key(|n| (n.bits(), n.prefix_len()));
        expected.dedup();

        let got: Vec<NetworkKey> = listed.iter().map(|r| r.network).collect();
        prop_assert_eq!(got, expected);
        prop_assert_eq!(listed.len() as u32, db.record_count());
    }
}
