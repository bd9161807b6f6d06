use std::path::PathBuf;

use wayfind_map::{ConnectorKind, DestinationCategory, SiteMap};
use wayfind_types::Point3D;

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/ryokan.toml")
}

fn sample() -> SiteMap {
    SiteMap::load(sample_path()).expect("bundled sample site must load")
}

#[test]
fn bundled_site_has_three_floors_and_full_catalog() {
    let site = sample();
    assert_eq!(site.floors().collect::<Vec<_>>(), vec![-1, 1, 2]);
    assert_eq!(site.destinations().count(), 18);
    assert_eq!(site.destinations_on(-1).count(), 3);
    assert_eq!(site.floor_height(), 3.5);
}

#[test]
fn every_destination_is_walkable() {
    let site = sample();
    for d in site.destinations() {
        assert!(
            site.is_walkable(d.x, d.y, d.floor),
            "destination {} at ({}, {}) on floor {} is blocked",
            d.id,
            d.x,
            d.y,
            d.floor
        );
    }
}

#[test]
fn destinations_are_listed_by_id() {
    let site = sample();
    let ids: Vec<_> = site.destinations().map(|d| d.id.clone()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn categories_survive_loading() {
    let site = sample();
    assert_eq!(
        site.destination("restaurant").map(|d| d.category),
        Some(DestinationCategory::Dining)
    );
    assert_eq!(
        site.destination("storage").map(|d| d.category),
        Some(DestinationCategory::Other)
    );
}

#[test]
fn connectors_link_every_floor_pair() {
    let site = sample();
    let kinds: Vec<_> = site.connectors_between(1, 2).map(|(k, _, _)| k).collect();
    assert_eq!(kinds, vec![ConnectorKind::Elevator, ConnectorKind::Stairs]);
    assert_eq!(site.connectors_between(-1, 1).count(), 1);
    assert_eq!(site.connectors_between(2, -1).count(), 1);
}

#[test]
fn reception_is_found_by_reverse_lookup() {
    let site = sample();
    let found = site.find_destination_at(&Point3D::new(10.0, 5.0, 0.0, 1));
    assert_eq!(found.map(|d| d.id.as_str()), Some("reception"));
}
