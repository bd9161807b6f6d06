//! [`Navigator`] – one fusion + tracking step per tick.
//!
//! Each call to [`Navigator::tick`]:
//!
//! 1. **Prune** – drop estimates older than the retention window from the
//!    shared [`EstimateCollector`].
//! 2. **Fuse** – hand the surviving window to [`FloorFusion::decide`]. A
//!    floor change is published as `floor_changed` and the live position is
//!    re-tagged with the new floor.
//! 3. **Track** – feed the live position to the [`RouteTracker`], which may
//!    advance its cursor, finish the session or recompute the route.
//! 4. **Publish** – every produced event goes out on the [`EventBus`].
//!
//! Raw sensor readings (altitude, network quality, vertical acceleration)
//! go through the per-sensor estimators in [`wayfind_perception::sources`]
//! and land in the same buffer as directly reported estimates.
//!
//! Mutations (`set_manual_floor`, `start_navigation`, ...) take `&mut self`,
//! so at most one route mutation is ever in flight. Sensor producers that
//! live on other threads report through a cloned collector handle obtained
//! from [`Navigator::collector`] instead.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use wayfind_map::{Destination, FloorPlan, SiteMap};
//! use wayfind_middleware::EventBus;
//! use wayfind_runtime::{Navigator, NavigatorConfig};
//! use wayfind_types::Point3D;
//!
//! let site = SiteMap::new()
//!     .with_floor(1, FloorPlan::new())
//!     .with_destination(Destination::new("reception", "Reception", 10.0, 5.0, 0.0, 1));
//! let mut nav = Navigator::new(Arc::new(site), NavigatorConfig::default(), EventBus::default());
//!
//! let route = nav
//!     .start_navigation("reception", Some(Point3D::new(0.0, 0.0, 0.0, 1)))
//!     .unwrap();
//! assert_eq!(route.waypoints.len(), 2);
//!
//! // Standing on the start waypoint, then walking up to the desk.
//! nav.tick(Utc::now());
//! nav.update_position(Point3D::new(9.0, 5.0, 0.0, 1));
//! nav.tick(Utc::now());
//! assert!(!nav.is_navigating());
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use wayfind_map::{Destination, SiteMap};
use wayfind_middleware::EventBus;
use wayfind_perception::collector::DEFAULT_CAPACITY;
use wayfind_perception::{
    AltitudeFloorEstimator, EstimateCollector, FloorFusion, FusionConfig, FusionOutcome,
    FusionStatus, NetworkQualityEstimator, VerticalMotionIntegrator, parse_qr_floor,
};
use wayfind_routing::{Pathfinder, RouteTracker, RoutingConfig, TrackerConfig};
use wayfind_types::{
    EstimateMethod, Event, FloorEstimate, NavError, NavEvent, PathQuality, Point3D, Route,
};

/// `source` field stamped on every event this module publishes.
const EVENT_SOURCE: &str = "wayfind-runtime::navigator";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`Navigator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Period of the fusion + tracking step, in milliseconds.
    pub tick_ms: u64,
    /// Upper bound on buffered estimates between ticks.
    pub estimate_capacity: usize,
    pub fusion: FusionConfig,
    pub routing: RoutingConfig,
    pub tracker: TrackerConfig,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            estimate_capacity: DEFAULT_CAPACITY,
            fusion: FusionConfig::default(),
            routing: RoutingConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl NavigatorConfig {
    /// Tick period; zero is raised to one millisecond.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// The active navigation session as seen by [`Navigator::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub destination: String,
    pub cursor: usize,
    pub waypoints: usize,
    pub total_distance: f64,
    pub estimated_time_minutes: f64,
    pub quality: PathQuality,
}

/// Debug snapshot of the whole navigator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigatorStatus {
    pub fusion: FusionStatus,
    pub buffered_estimates: usize,
    /// Calibrated altitude of the initial floor, if any.
    pub altitude_baseline: Option<f64>,
    pub position: Option<Point3D>,
    pub session: Option<SessionStatus>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────────

/// Floor fusion and route tracking over one immutable [`SiteMap`].
pub struct Navigator {
    site: Arc<SiteMap>,
    config: NavigatorConfig,
    collector: EstimateCollector,
    fusion: FloorFusion,
    tracker: RouteTracker,
    altitude: AltitudeFloorEstimator,
    network: NetworkQualityEstimator,
    motion: VerticalMotionIntegrator,
    bus: EventBus,
    position: Option<Point3D>,
    destination: Option<String>,
}

impl Navigator {
    pub fn new(site: Arc<SiteMap>, config: NavigatorConfig, bus: EventBus) -> Self {
        let collector =
            EstimateCollector::new(config.fusion.retention(), config.estimate_capacity);
        let floor_height = site.floor_height();
        Self {
            fusion: FloorFusion::new(config.fusion.clone()),
            tracker: RouteTracker::new(config.tracker.clone()),
            altitude: AltitudeFloorEstimator::new(floor_height, config.fusion.initial_floor),
            network: NetworkQualityEstimator::default(),
            motion: VerticalMotionIntegrator::new(floor_height),
            site,
            config,
            collector,
            bus,
            position: None,
            destination: None,
        }
    }

    pub fn site(&self) -> &Arc<SiteMap> {
        &self.site
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// A producer handle onto the shared estimate buffer.
    pub fn collector(&self) -> EstimateCollector {
        self.collector.clone()
    }

    pub fn current_floor(&self) -> i32 {
        self.fusion.current_floor()
    }

    pub fn position(&self) -> Option<Point3D> {
        self.position
    }

    pub fn route(&self) -> Option<&Route> {
        self.tracker.route()
    }

    pub fn is_navigating(&self) -> bool {
        self.tracker.is_active()
    }

    /// Catalog entries ordered by id.
    pub fn destinations(&self) -> Vec<Destination> {
        self.site.destinations().cloned().collect()
    }

    // ── Floor input ──────────────────────────────────────────────────────────

    /// Buffer an estimate stamped with the current time.
    pub fn report_estimate(&self, method: EstimateMethod, floor: i32, confidence: f64) {
        self.collector.report(method, floor, confidence);
    }

    pub fn report_estimate_at(
        &self,
        method: EstimateMethod,
        floor: i32,
        confidence: f64,
        at: DateTime<Utc>,
    ) {
        self.collector.report_at(method, floor, confidence, at);
    }

    /// Pin the floor for the manual trust window. Applies immediately.
    pub fn set_manual_floor(&mut self, floor: i32, now: DateTime<Utc>) -> FusionOutcome {
        let outcome = self.fusion.set_manual_floor(floor, now);
        self.absorb(&outcome);
        outcome
    }

    /// Decode a QR payload. A recognised marker opens the QR trust window
    /// and adds a `qrcode` estimate; the floor moves on the next tick.
    pub fn scan_qr(&mut self, payload: &str, now: DateTime<Utc>) -> Option<i32> {
        let Some(floor) = parse_qr_floor(payload) else {
            debug!(payload, "qr payload carries no floor marker");
            return None;
        };
        self.fusion.observe_qr(floor, now);
        let confidence = self.fusion.config().qr_confidence;
        self.collector
            .report_at(EstimateMethod::QrCode, floor, confidence, now);
        info!(floor, "qr marker scanned");
        Some(floor)
    }

    /// Drop every buffered estimate and both trust anchors, and return to
    /// the initial floor. The altitude baseline survives.
    pub fn reset(&mut self) {
        self.collector.clear();
        self.fusion.reset();
        self.motion.reset();
    }

    // ── Sensor readings ──────────────────────────────────────────────────────

    /// Take the mean of `samples` as the altitude of the initial floor.
    pub fn calibrate_altitude(&mut self, samples: &[f64]) -> Option<f64> {
        let baseline = self.altitude.calibrate(samples)?;
        info!(baseline, "altitude calibrated");
        Some(baseline)
    }

    /// Buffer a barometric estimate for `altitude`. Nothing happens before
    /// [`Navigator::calibrate_altitude`].
    pub fn report_altitude(
        &self,
        altitude: f64,
        accuracy: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<FloorEstimate> {
        let estimate = self.altitude.estimate(altitude, accuracy, now)?;
        self.collector.push(estimate.clone());
        Some(estimate)
    }

    /// Buffer a network-quality estimate. Readings in the ambiguous band
    /// are dropped.
    pub fn report_network(
        &self,
        downlink_mbps: f64,
        rtt_ms: f64,
        now: DateTime<Utc>,
    ) -> Option<FloorEstimate> {
        let estimate = self.network.estimate(downlink_mbps, rtt_ms, now)?;
        self.collector.push(estimate.clone());
        Some(estimate)
    }

    /// Integrate vertical acceleration samples (gravity included, 0.1 s
    /// apart). Each detected whole-floor move becomes an accelerometer
    /// estimate relative to the fused floor.
    pub fn report_vertical_acceleration(
        &mut self,
        samples: &[f64],
        now: DateTime<Utc>,
    ) -> Vec<FloorEstimate> {
        let current = self.fusion.current_floor();
        let produced: Vec<FloorEstimate> = samples
            .iter()
            .filter_map(|&accel| self.motion.estimate(accel, current, now))
            .collect();
        for estimate in &produced {
            debug!(floor = estimate.floor, "vertical move detected");
            self.collector.push(estimate.clone());
        }
        produced
    }

    // ── Position input ───────────────────────────────────────────────────────

    pub fn update_position(&mut self, position: Point3D) {
        self.position = Some(position);
    }

    /// A planar fix placed on the currently fused floor.
    pub fn locate(&self, x: f64, y: f64) -> Point3D {
        let floor = self.current_floor();
        Point3D::new(x, y, self.site.elevation(floor), floor)
    }

    // ── Session control ──────────────────────────────────────────────────────

    /// Plan a route to `destination_id` and start following it, replacing
    /// any active session. `start` defaults to the last reported position.
    ///
    /// On error nothing changes: the previous session, if any, continues.
    #[instrument(skip(self, start))]
    pub fn start_navigation(
        &mut self,
        destination_id: &str,
        start: Option<Point3D>,
    ) -> Result<Route, NavError> {
        let start = start.or(self.position).ok_or(NavError::NoPosition)?;
        let route = Pathfinder::new(&self.site, self.config.routing.clone())
            .route(&start, destination_id)?;

        info!(
            waypoints = route.len(),
            distance = route.total_distance,
            eta_minutes = route.estimated_time_minutes,
            quality = ?route.quality,
            "navigation started"
        );
        self.position = Some(start);
        self.destination = Some(destination_id.to_string());
        self.tracker.start(route.clone());
        self.publish(NavEvent::NavigationStart {
            destination: destination_id.to_string(),
            route: route.clone(),
        });
        Ok(route)
    }

    /// End the active session. Returns whether one was running; only then
    /// is `navigation_stop` published.
    pub fn stop_navigation(&mut self) -> bool {
        let was_active = self.tracker.stop();
        self.destination = None;
        if was_active {
            info!("navigation stopped");
            self.publish(NavEvent::NavigationStop);
        }
        was_active
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// Run one fusion + tracking step and return the events it published.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<NavEvent> {
        let mut events = Vec::new();

        let expired = self.collector.prune(now);
        let window = self.collector.snapshot();
        let outcome = self.fusion.decide(&window, now);
        if let Some(event) = self.absorb(&outcome) {
            events.push(event);
        }

        if let Some(position) = self.position {
            let pathfinder = Pathfinder::new(&self.site, self.config.routing.clone());
            let produced = self.tracker.tick(&position, &pathfinder);
            for event in produced {
                if matches!(event, NavEvent::DestinationReached { .. }) {
                    self.destination = None;
                }
                self.publish(event.clone());
                events.push(event);
            }
        }

        debug!(
            expired,
            buffered = window.len(),
            floor = self.fusion.current_floor(),
            events = events.len(),
            "tick"
        );
        events
    }

    pub fn status(&self, now: DateTime<Utc>) -> NavigatorStatus {
        let session = self.tracker.route().map(|route| SessionStatus {
            destination: self.destination.clone().unwrap_or_default(),
            cursor: self.tracker.cursor().unwrap_or(0),
            waypoints: route.len(),
            total_distance: route.total_distance,
            estimated_time_minutes: route.estimated_time_minutes,
            quality: route.quality,
        });
        NavigatorStatus {
            fusion: self.fusion.status(now),
            buffered_estimates: self.collector.len(),
            altitude_baseline: self.altitude.baseline(),
            position: self.position,
            session,
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Publish a floor change and move the live position onto the new floor.
    fn absorb(&mut self, outcome: &FusionOutcome) -> Option<NavEvent> {
        let FusionOutcome::Changed(change) = outcome else {
            return None;
        };
        let elevation = self.site.elevation(change.new_floor);
        if let Some(position) = self.position.as_mut() {
            if position.floor != change.new_floor {
                position.floor = change.new_floor;
                position.z = elevation;
            }
        }
        let event = NavEvent::FloorChanged(change.clone());
        self.publish(event.clone());
        Some(event)
    }

    fn publish(&self, payload: NavEvent) {
        // Nobody listening is fine; presentation layers attach on their own.
        let _ = self.bus.publish(Event::new(EVENT_SOURCE, payload));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use wayfind_map::FloorPlan;
    use wayfind_middleware::Topic;
    use wayfind_types::DecisionSource;

    fn hall() -> Arc<SiteMap> {
        let plan = || {
            FloorPlan::new()
                .with_wall(-10.0, -10.0, 80.0, -10.0)
                .with_wall(-10.0, 40.0, 80.0, 40.0)
        };
        Arc::new(
            SiteMap::new()
                .with_floor(1, plan())
                .with_floor(2, plan())
                .with_destination(Destination::new("reception", "Reception", 10.0, 5.0, 0.0, 1))
                .with_destination(Destination::new("far_end", "Far end", 50.0, 0.0, 0.0, 1)),
        )
    }

    fn navigator() -> Navigator {
        Navigator::new(hall(), NavigatorConfig::default(), EventBus::default())
    }

    fn p(x: f64, y: f64) -> Point3D {
        Point3D::new(x, y, 0.0, 1)
    }

    /// Barometric + wifi + accelerometer at full confidence: 0.9 composite.
    fn strong_evidence(nav: &Navigator, floor: i32, at: DateTime<Utc>) {
        nav.report_estimate_at(EstimateMethod::Barometric, floor, 1.0, at);
        nav.report_estimate_at(EstimateMethod::Wifi, floor, 1.0, at);
        nav.report_estimate_at(EstimateMethod::Accelerometer, floor, 1.0, at);
    }

    #[test]
    fn composite_change_publishes_and_retags_position() {
        let mut nav = navigator();
        let mut floor_rx = nav.bus().subscribe_to(Topic::Floor);
        let now = Utc::now();
        nav.update_position(p(0.0, 0.0));

        strong_evidence(&nav, 2, now);
        let events = nav.tick(now);

        assert_eq!(nav.current_floor(), 2);
        assert!(events.iter().any(|e| e.kind() == "floor_changed"));
        let published = floor_rx.try_next().expect("floor event on the bus");
        assert!(matches!(
            published.payload,
            NavEvent::FloorChanged(ref c) if c.old_floor == 1 && c.new_floor == 2
        ));

        let position = nav.position().expect("position kept");
        assert_eq!(position.floor, 2);
        assert_eq!(position.z, 3.5);
    }

    #[test]
    fn manual_floor_beats_composite_evidence() {
        let mut nav = navigator();
        let now = Utc::now();
        strong_evidence(&nav, 2, now);

        let outcome = nav.set_manual_floor(3, now);
        assert!(matches!(outcome, FusionOutcome::Changed(ref c) if c.source == DecisionSource::Manual));
        assert_eq!(nav.current_floor(), 3);

        nav.tick(now + ChronoDuration::seconds(1));
        assert_eq!(nav.current_floor(), 3);
    }

    #[test]
    fn qr_scan_takes_effect_on_next_tick() {
        let mut nav = navigator();
        let now = Utc::now();

        assert_eq!(nav.scan_qr("https://example.test/?floor:B1", now), Some(-1));
        assert_eq!(nav.current_floor(), 1);
        assert_eq!(nav.status(now).buffered_estimates, 1);

        nav.tick(now);
        assert_eq!(nav.current_floor(), -1);

        assert_eq!(nav.scan_qr("room 204", now), None);
    }

    #[test]
    fn expired_estimates_leave_the_floor_alone() {
        let mut nav = navigator();
        let t0 = Utc::now();
        strong_evidence(&nav, 2, t0);

        let events = nav.tick(t0 + ChronoDuration::seconds(11));
        assert!(events.is_empty());
        assert_eq!(nav.current_floor(), 1);
        assert_eq!(nav.status(t0).buffered_estimates, 0);
    }

    #[test]
    fn start_needs_a_position() {
        let mut nav = navigator();
        assert_eq!(
            nav.start_navigation("reception", None),
            Err(NavError::NoPosition)
        );
    }

    #[test]
    fn unknown_destination_keeps_current_session() {
        let mut nav = navigator();
        nav.start_navigation("far_end", Some(p(0.0, 0.0))).unwrap();

        let err = nav.start_navigation("karaoke", None).unwrap_err();
        assert_eq!(err, NavError::DestinationNotFound("karaoke".to_string()));
        assert!(nav.is_navigating());
        assert_eq!(
            nav.status(Utc::now()).session.map(|s| s.destination),
            Some("far_end".to_string())
        );
    }

    #[test]
    fn walk_to_reception() {
        let mut nav = navigator();
        let mut nav_rx = nav.bus().subscribe_to(Topic::Navigation);

        let route = nav.start_navigation("reception", Some(p(0.0, 0.0))).unwrap();
        assert_eq!(route.waypoints, vec![p(0.0, 0.0), p(10.0, 5.0)]);
        let start = nav_rx.try_next().expect("navigation_start");
        assert_eq!(start.payload.kind(), "navigation_start");

        // Standing on the first waypoint.
        let events = nav.tick(Utc::now());
        assert_eq!(events[0].kind(), "waypoint_reached");
        assert_eq!(events[1].kind(), "navigation_update");

        nav.update_position(p(9.0, 5.0));
        let events = nav.tick(Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "destination_reached");
        assert!(!nav.is_navigating());
        assert!(nav.status(Utc::now()).session.is_none());

        // Nothing more once arrived.
        assert!(nav.tick(Utc::now()).is_empty());
    }

    #[test]
    fn stop_publishes_only_for_an_active_session() {
        let mut nav = navigator();
        let mut nav_rx = nav.bus().subscribe_to(Topic::Navigation);
        assert!(!nav.stop_navigation());
        assert!(nav_rx.try_next().is_none());

        nav.start_navigation("far_end", Some(p(0.0, 0.0))).unwrap();
        assert!(nav.stop_navigation());
        let kinds: Vec<_> = std::iter::from_fn(|| nav_rx.try_next())
            .map(|e| e.payload.kind())
            .collect();
        assert_eq!(kinds, vec!["navigation_start", "navigation_stop"]);
    }

    #[test]
    fn locate_uses_fused_floor() {
        let mut nav = navigator();
        nav.set_manual_floor(2, Utc::now());
        assert_eq!(nav.locate(4.0, 5.0), Point3D::new(4.0, 5.0, 3.5, 2));
    }

    #[test]
    fn reset_clears_buffer_and_anchors() {
        let mut nav = navigator();
        let now = Utc::now();
        nav.set_manual_floor(2, now);
        strong_evidence(&nav, 2, now);

        nav.reset();
        let status = nav.status(now);
        assert_eq!(status.fusion.floor, 1);
        assert_eq!(status.buffered_estimates, 0);
        assert!(status.fusion.manual.is_none());
    }

    #[test]
    fn altitude_and_network_readings_move_the_floor() {
        let mut nav = navigator();
        let now = Utc::now();
        assert!(nav.report_altitude(103.5, Some(3.0), now).is_none());

        assert_eq!(nav.calibrate_altitude(&[99.0, 101.0]), Some(100.0));
        // Two barometric 0.8 × 0.4 plus one wifi 0.5 × 0.3: 0.79.
        let reading = nav.report_altitude(103.5, Some(3.0), now).expect("calibrated");
        assert_eq!((reading.floor, reading.method), (2, EstimateMethod::Barometric));
        nav.report_altitude(103.4, Some(3.0), now);
        assert!(nav.report_network(4.0, 120.0, now).is_none());
        assert_eq!(nav.report_network(8.0, 80.0, now).map(|e| e.floor), Some(2));

        let events = nav.tick(now);
        assert!(matches!(
            events.first(),
            Some(NavEvent::FloorChanged(c)) if c.new_floor == 2 && c.source == DecisionSource::Composite
        ));
        assert_eq!(nav.status(now).altitude_baseline, Some(100.0));
    }

    #[test]
    fn vertical_motion_is_relative_to_the_fused_floor() {
        let mut nav = navigator();
        let now = Utc::now();
        nav.set_manual_floor(2, now);

        // 1 m/s² upward for 3 s climbs one storey.
        let lift = vec![wayfind_perception::sources::GRAVITY + 1.0; 30];
        let produced = nav.report_vertical_acceleration(&lift, now);
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].floor, 3);
        assert_eq!(produced[0].method, EstimateMethod::Accelerometer);
        assert_eq!(nav.status(now).buffered_estimates, 1);
    }

    #[test]
    fn update_eta_agrees_with_route_eta() {
        let mut config = NavigatorConfig::default();
        config.routing.walking_speed = 20.0;
        let mut nav = Navigator::new(hall(), config, EventBus::default());

        let route = nav.start_navigation("far_end", Some(p(0.0, 0.0))).unwrap();
        let events = nav.tick(Utc::now());
        match events.last() {
            Some(NavEvent::NavigationUpdate { eta_minutes, .. }) => {
                assert_eq!(*eta_minutes, route.estimated_time_minutes);
            }
            other => panic!("expected NavigationUpdate, got {other:?}"),
        }
    }

    #[test]
    fn config_accepts_partial_tables() {
        let config: NavigatorConfig = toml::from_str(
            r#"
tick_ms = 250

[fusion]
confidence_threshold = 0.6

[tracker]
arrival_radius = 2.0
"#,
        )
        .unwrap();
        assert_eq!(config.tick_period(), Duration::from_millis(250));
        assert_eq!(config.fusion.confidence_threshold, 0.6);
        assert_eq!(config.fusion.qr_trust_ms, 30_000);
        assert_eq!(config.tracker.arrival_radius, 2.0);
        assert_eq!(config.routing, RoutingConfig::default());
    }
}
