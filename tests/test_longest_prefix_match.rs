// Longest-prefix-match behaviour of built databases
//
// The deepest network covering an address wins, regardless of the order in
// which networks were added.

use geoglot::{DatabaseBuilder, LocalizedName, LocationRecord, MergedRecord, Snapshot};

fn record(cidr: &str, city: &str) -> MergedRecord {
    let location = LocationRecord {
        geoname_id: 1,
        city: LocalizedName::new(city, ""),
        ..Default::default()
    };
    MergedRecord::new(cidr.parse().unwrap(), location)
}

fn build(entries: &[(&str, &str)]) -> Snapshot {
    let mut builder = DatabaseBuilder::new();
    for (cidr, city) in entries {
        builder.add_record(record(cidr, city));
    }
    Snapshot::from_bytes(builder.build().unwrap().bytes).unwrap()
}

fn city_of(db: &Snapshot, addr: &str) -> Option<String> {
    db.lookup(addr).unwrap().map(|r| r.location.city.en)
}

#[test]
fn test_specific_prefix_wins() {
    let db = build(&[("10.0.0.0/8", "X"), ("10.1.0.0/16", "Y")]);
    assert_eq!(city_of(&db, "10.1.2.3").as_deref(), Some("Y"));
    assert_eq!(city_of(&db, "10.2.0.1").as_deref(), Some("X"));
    assert_eq!(city_of(&db, "11.0.0.1"), None);
}

#[test]
fn test_specific_before_subnet() {
    // /32 added BEFORE the /24 that contains it
    let db = build(&[("192.0.2.1/32", "host"), ("192.0.2.0/24", "subnet")]);
    assert_eq!(city_of(&db, "192.0.2.1").as_deref(), Some("host"));
    assert_eq!(city_of(&db, "192.0.2.2").as_deref(), Some("subnet"));
}

#[test]
fn test_subnet_before_specific() {
    let db = build(&[("192.0.2.0/24", "subnet"), ("192.0.2.1/32", "host")]);
    assert_eq!(city_of(&db, "192.0.2.1").as_deref(), Some("host"));
    assert_eq!(city_of(&db, "192.0.2.254").as_deref(), Some("subnet"));
}

#[test]
fn test_three_levels() {
    let db = build(&[
        ("10.0.0.0/8", "a"),
        ("10.10.0.0/16", "b"),
        ("10.10.10.0/24", "c"),
    ]);
    assert_eq!(city_of(&db, "10.10.10.10").as_deref(), Some("c"));
    assert_eq!(city_of(&db, "10.10.11.10").as_deref(), Some("b"));
    assert_eq!(city_of(&db, "10.11.0.0").as_deref(), Some("a"));
}

#[test]
fn test_single_network_boundaries() {
    let db = build(&[("1.0.0.0/24", "Sydney")]);
    for inside in ["1.0.0.0", "1.0.0.1", "1.0.0.128", "1.0.0.255"] {
        assert_eq!(city_of(&db, inside).as_deref(), Some("Sydney"), "{}", inside);
    }
    for outside in ["0.255.255.255", "1.0.1.0", "255.255.255.255", "0.0.0.0"] {
        assert_eq!(city_of(&db, outside), None, "{}", outside);
    }
}

#[test]
fn test_host_bits_in_input_are_masked() {
    let db = build(&[("10.1.2.3/16", "masked")]);
    let hit = db.lookup("10.1.200.200").unwrap().unwrap();
    assert_eq!(hit.cidr, "10.1.0.0/16");
}

#[test]
fn test_ipv6_prefixes() {
    let db = build(&[("2001:db8::/32", "doc"), ("2001:db8:abcd::/48", "site")]);
    assert_eq!(city_of(&db, "2001:db8:abcd::1").as_deref(), Some("site"));
    assert_eq!(city_of(&db, "2001:db8:1::1").as_deref(), Some("doc"));
    assert_eq!(city_of(&db, "2001:db9::1"), None);
    // No IPv4 networks were added
    assert_eq!(city_of(&db, "1.2.3.4"), None);
}
