use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use wayfind_map::SiteMap;
use wayfind_middleware::{EventBus, Topic};
use wayfind_runtime::{Navigator, NavigatorConfig, NavigatorService};
use wayfind_types::{DecisionSource, EstimateMethod, NavError, NavEvent, Point3D};

fn site() -> Arc<SiteMap> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/ryokan.toml");
    Arc::new(SiteMap::load(path).expect("bundled sample site must load"))
}

fn entrance() -> Point3D {
    Point3D::new(0.0, 0.0, 0.0, 1)
}

fn kinds(events: &[NavEvent]) -> Vec<&'static str> {
    events.iter().map(NavEvent::kind).collect()
}

#[test]
fn elevator_ride_to_the_baths() {
    let mut nav = Navigator::new(site(), NavigatorConfig::default(), EventBus::default());
    let route = nav.start_navigation("onsen_entrance", Some(entrance())).unwrap();
    assert_eq!(route.floors_traversed, vec![1, 2]);

    let mut reached = 0;
    let mut arrived = 0;
    let mut cursor = 0;
    for waypoint in &route.waypoints {
        nav.update_position(*waypoint);
        let events = nav.tick(Utc::now());
        assert!(
            !events.iter().any(|e| e.kind() == "route_recalculated"),
            "walking the route exactly must not drift: {events:?}"
        );
        reached += events.iter().filter(|e| e.kind() == "waypoint_reached").count();
        arrived += events.iter().filter(|e| e.kind() == "destination_reached").count();
        if let Some(c) = nav.status(Utc::now()).session.map(|s| s.cursor) {
            assert!(c >= cursor, "cursor went backwards");
            cursor = c;
        }
    }

    assert_eq!(reached, route.len() - 1);
    assert_eq!(arrived, 1);
    assert!(!nav.is_navigating());
}

#[test]
fn drifting_off_route_recalculates_once() {
    let mut nav = Navigator::new(site(), NavigatorConfig::default(), EventBus::default());
    let mut alerts = nav.bus().subscribe_to(Topic::Alerts);
    nav.start_navigation("restaurant", Some(entrance())).unwrap();
    nav.tick(Utc::now());

    // Wander toward the shop, well away from the restaurant route.
    let lost = Point3D::new(0.0, 15.0, 0.0, 1);
    nav.update_position(lost);
    let first = nav.tick(Utc::now());
    assert_eq!(
        first.iter().filter(|e| e.kind() == "route_recalculated").count(),
        1,
        "{:?}",
        kinds(&first)
    );
    let new_route = nav.route().expect("session still active");
    assert_eq!(new_route.waypoints.first(), Some(&lost));
    assert_eq!(
        new_route.destination(),
        Some(&Point3D::new(25.0, 8.0, 0.0, 1))
    );

    for _ in 0..3 {
        let events = nav.tick(Utc::now());
        assert!(!events.iter().any(|e| e.kind() == "route_recalculated"));
    }
    assert!(alerts.try_next().is_none());
}

#[test]
fn manual_floor_moves_the_live_position() {
    let mut nav = Navigator::new(site(), NavigatorConfig::default(), EventBus::default());
    let now = Utc::now();
    nav.update_position(entrance());

    // Strong composite evidence for 2F loses to the visitor saying B1.
    nav.report_estimate_at(EstimateMethod::Barometric, 2, 1.0, now);
    nav.report_estimate_at(EstimateMethod::Wifi, 2, 1.0, now);
    nav.report_estimate_at(EstimateMethod::Accelerometer, 2, 1.0, now);
    nav.set_manual_floor(-1, now);
    nav.tick(now + Duration::seconds(1));

    assert_eq!(nav.current_floor(), -1);
    assert_eq!(nav.position(), Some(Point3D::new(0.0, 0.0, -3.5, -1)));

    // Manual trust expires after a minute; fresh composite evidence then wins.
    let later = now + Duration::seconds(61);
    nav.report_estimate_at(EstimateMethod::Barometric, 2, 1.0, later);
    nav.report_estimate_at(EstimateMethod::Wifi, 2, 1.0, later);
    nav.report_estimate_at(EstimateMethod::Accelerometer, 2, 1.0, later);
    let events = nav.tick(later);
    match events.first() {
        Some(NavEvent::FloorChanged(change)) => {
            assert_eq!((change.old_floor, change.new_floor), (-1, 2));
            assert_eq!(change.source, DecisionSource::Composite);
        }
        other => panic!("expected a floor change, got {other:?}"),
    }
}

#[tokio::test]
async fn service_drives_a_session_end_to_end() -> Result<(), NavError> {
    let config = NavigatorConfig {
        tick_ms: 3_600_000,
        ..NavigatorConfig::default()
    };
    let navigator = Navigator::new(site(), config, EventBus::default());
    let (handle, task) = NavigatorService::spawn(navigator);
    let mut all = handle.subscribe_all();

    assert_eq!(handle.destinations().len(), 18);
    assert_eq!(
        handle.start_navigation("sauna", Some(entrance())).await,
        Err(NavError::DestinationNotFound("sauna".to_string()))
    );

    let route = handle.start_navigation("reception", Some(entrance())).await?;
    assert_eq!(route.waypoints.len(), 2);

    handle.tick_now().await?;
    handle.update_position(Point3D::new(10.0, 4.0, 0.0, 1)).await?;
    let events = handle.tick_now().await?;
    assert_eq!(kinds(&events), vec!["destination_reached"]);

    handle.shutdown().await?;
    let _ = task.await;

    let mut seen = Vec::new();
    while let Some(event) = all.try_next() {
        seen.push(event.payload.kind());
    }
    assert_eq!(
        seen,
        vec![
            "navigation_start",
            "waypoint_reached",
            "navigation_update",
            "destination_reached",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn barometer_and_network_put_the_visitor_upstairs() -> Result<(), NavError> {
    let config = NavigatorConfig {
        tick_ms: 3_600_000,
        ..NavigatorConfig::default()
    };
    let navigator = Navigator::new(site(), config, EventBus::default());
    let (handle, task) = NavigatorService::spawn(navigator);
    let mut floor_rx = handle.subscribe_to(Topic::Floor);

    handle.update_position(entrance()).await?;
    assert_eq!(handle.report_altitude(40.0, Some(3.0)).await?, None);
    assert_eq!(
        handle.calibrate_altitude(vec![36.0, 37.0]).await?,
        Some(36.5)
    );

    // One storey up: two barometric readings and a mid-quality network.
    for altitude in [39.9, 40.1] {
        let estimate = handle.report_altitude(altitude, Some(3.0)).await?;
        assert_eq!(estimate.map(|e| e.floor), Some(2));
    }
    let network = handle.report_network(8.0, 80.0).await?;
    assert_eq!(network.map(|e| e.method), Some(EstimateMethod::Wifi));

    let events = handle.tick_now().await?;
    assert_eq!(kinds(&events), vec!["floor_changed"]);
    match floor_rx.try_next().map(|e| e.payload) {
        Some(NavEvent::FloorChanged(change)) => {
            assert_eq!((change.old_floor, change.new_floor), (1, 2));
            assert_eq!(change.source, DecisionSource::Composite);
        }
        other => panic!("expected a floor change, got {other:?}"),
    }

    let status = handle.status().await?;
    assert_eq!(status.fusion.floor, 2);
    assert_eq!(status.position, Some(Point3D::new(0.0, 0.0, 3.5, 2)));

    // Riding back down is picked up relative to the fused floor.
    let down = vec![wayfind_perception::sources::GRAVITY - 1.0; 30];
    let produced = handle.report_vertical_acceleration(down).await?;
    assert_eq!(produced.iter().map(|e| e.floor).collect::<Vec<_>>(), vec![1]);

    handle.shutdown().await?;
    let _ = task.await;
    Ok(())
}
