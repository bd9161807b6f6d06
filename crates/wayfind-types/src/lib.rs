use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Tolerance used when two coordinates must denote "the same place".
pub const COORD_EPSILON: f64 = 1e-6;

/// A position inside the building.
///
/// `floor` is the logical storey (negative = below ground). `z` is kept
/// independent of `floor` so that vertical-transition pseudo-points can sit
/// between storeys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub floor: i32,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64, floor: i32) -> Self {
        Self { x, y, z, floor }
    }

    /// Straight-line 3-D distance, ignoring the floor tag.
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance in the horizontal plane only.
    pub fn planar_distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// True when both points share the floor and their planar coordinates
    /// match within [`COORD_EPSILON`].
    pub fn same_location(&self, other: &Self) -> bool {
        self.floor == other.floor
            && (self.x - other.x).abs() < COORD_EPSILON
            && (self.y - other.y).abs() < COORD_EPSILON
    }
}

/// Human-facing floor name: basements read `B1`, `B2`, ..., other floors
/// `1F`, `2F`, ....
pub fn floor_label(floor: i32) -> String {
    if floor < 0 {
        format!("B{}", floor.unsigned_abs())
    } else {
        format!("{floor}F")
    }
}

/// The sensing channel that produced a floor estimate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateMethod {
    /// Floor chosen explicitly by the visitor.
    Manual,
    /// Floor decoded from a scanned QR marker.
    QrCode,
    /// Altitude / barometric pressure relative to a calibrated baseline.
    Barometric,
    /// Network-quality proxy (downlink / RTT).
    Wifi,
    /// Integrated vertical acceleration.
    Accelerometer,
    /// Any source the fusion engine has no dedicated weight for.
    Other(String),
}

impl EstimateMethod {
    /// Map a free-form source label onto a method. Unknown labels are kept
    /// verbatim as [`EstimateMethod::Other`].
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "manual" => EstimateMethod::Manual,
            "qr" | "qrcode" | "qr_code" => EstimateMethod::QrCode,
            "barometric" | "altitude" | "baro" => EstimateMethod::Barometric,
            "wifi" | "network" => EstimateMethod::Wifi,
            "accelerometer" | "accel" | "step" => EstimateMethod::Accelerometer,
            _ => EstimateMethod::Other(label.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EstimateMethod::Manual => "manual",
            EstimateMethod::QrCode => "qrcode",
            EstimateMethod::Barometric => "barometric",
            EstimateMethod::Wifi => "wifi",
            EstimateMethod::Accelerometer => "accelerometer",
            EstimateMethod::Other(label) => label,
        }
    }
}

impl std::fmt::Display for EstimateMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped floor observation from a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorEstimate {
    pub method: EstimateMethod,
    pub floor: i32,
    /// Source confidence in `[0, 1]`.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl FloorEstimate {
    /// Build an estimate, clamping `confidence` into `[0, 1]` (NaN becomes 0).
    pub fn new(method: EstimateMethod, floor: i32, confidence: f64, timestamp: DateTime<Utc>) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            method,
            floor,
            confidence,
            timestamp,
        }
    }
}

/// Which rule of the fusion engine produced a floor decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Manual,
    QrCode,
    Composite,
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionSource::Manual => write!(f, "manual"),
            DecisionSource::QrCode => write!(f, "qrcode"),
            DecisionSource::Composite => write!(f, "composite"),
        }
    }
}

/// Payload of a `floorChanged` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorChange {
    pub old_floor: i32,
    pub new_floor: i32,
    pub confidence: f64,
    pub source: DecisionSource,
}

/// How a route was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathQuality {
    /// Every leg is an unobstructed straight line.
    Direct,
    /// At least one leg needed a grid search.
    Searched,
    /// A leg could not be searched and was replaced by a straight line.
    StraightLineFallback,
}

impl PathQuality {
    /// The worse of two qualities, used when composing legs.
    pub fn worst(self, other: Self) -> Self {
        use PathQuality::*;
        match (self, other) {
            (StraightLineFallback, _) | (_, StraightLineFallback) => StraightLineFallback,
            (Searched, _) | (_, Searched) => Searched,
            _ => Direct,
        }
    }
}

/// A walkable route: ordered waypoints plus derived totals.
///
/// Routes are replaced wholesale on recomputation, never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub waypoints: Vec<Point3D>,
    pub total_distance: f64,
    pub estimated_time_minutes: f64,
    pub floors_traversed: Vec<i32>,
    pub quality: PathQuality,
}

impl Route {
    /// The final waypoint.
    pub fn destination(&self) -> Option<&Point3D> {
        self.waypoints.last()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// Everything the core tells presentation collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum NavEvent {
    FloorChanged(FloorChange),
    NavigationStart {
        destination: String,
        route: Route,
    },
    WaypointReached {
        waypoint: Point3D,
        next: Point3D,
        /// Fraction of waypoints passed, in `(0, 1)`.
        progress: f64,
    },
    DestinationReached {
        destination: Point3D,
    },
    RouteRecalculated {
        new_route: Route,
    },
    /// Recoverable: the stale route stays active.
    RecalculationFailed {
        reason: String,
    },
    NavigationUpdate {
        current_position: Point3D,
        next_waypoint: Point3D,
        distance_remaining: f64,
        eta_minutes: f64,
    },
    NavigationStop,
}

impl NavEvent {
    /// Stable snake_case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            NavEvent::FloorChanged(_) => "floor_changed",
            NavEvent::NavigationStart { .. } => "navigation_start",
            NavEvent::WaypointReached { .. } => "waypoint_reached",
            NavEvent::DestinationReached { .. } => "destination_reached",
            NavEvent::RouteRecalculated { .. } => "route_recalculated",
            NavEvent::RecalculationFailed { .. } => "recalculation_failed",
            NavEvent::NavigationUpdate { .. } => "navigation_update",
            NavEvent::NavigationStop => "navigation_stop",
        }
    }
}

/// Envelope routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "wayfind-runtime::navigator"
    pub source: String,
    pub payload: NavEvent,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: NavEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Error type shared by every wayfind crate.
///
/// None of these are fatal: callers degrade to the best available state
/// (previous floor, stale route, straight-line path).
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavError {
    #[error("Destination not found: {0}")]
    DestinationNotFound(String),

    #[error("No vertical connector links floor {from} and floor {to}")]
    NoVerticalConnector { from: i32, to: i32 },

    #[error("Route recalculation failed: {0}")]
    RecalculationFailed(String),

    #[error("No live position has been reported yet")]
    NoPosition,

    #[error("Invalid site description: {0}")]
    InvalidSite(String),

    #[error("Event channel error: {0}")]
    Channel(String),

    #[error("Navigator service has stopped")]
    ServiceStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_three_dimensional() {
        let a = Point3D::new(0.0, 0.0, 0.0, 1);
        let b = Point3D::new(3.0, 4.0, 12.0, 1);
        assert!((a.distance(&b) - 13.0).abs() < 1e-12);
        assert!((a.planar_distance(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn same_location_requires_same_floor() {
        let a = Point3D::new(10.0, 5.0, 0.0, 1);
        let b = Point3D::new(10.0, 5.0, 3.5, 2);
        assert!(!a.same_location(&b));
        assert!(a.same_location(&Point3D::new(10.0, 5.0, 0.2, 1)));
    }

    #[test]
    fn floor_labels() {
        assert_eq!(floor_label(-1), "B1");
        assert_eq!(floor_label(-2), "B2");
        assert_eq!(floor_label(1), "1F");
        assert_eq!(floor_label(0), "0F");
    }

    #[test]
    fn estimate_method_parses_aliases() {
        assert_eq!(EstimateMethod::parse("altitude"), EstimateMethod::Barometric);
        assert_eq!(EstimateMethod::parse("QR"), EstimateMethod::QrCode);
        assert_eq!(EstimateMethod::parse(" wifi "), EstimateMethod::Wifi);
        assert_eq!(
            EstimateMethod::parse("light"),
            EstimateMethod::Other("light".to_string())
        );
        assert_eq!(EstimateMethod::parse("step").to_string(), "accelerometer");
    }

    #[test]
    fn floor_estimate_clamps_confidence() {
        let now = Utc::now();
        assert_eq!(FloorEstimate::new(EstimateMethod::Wifi, 2, 1.7, now).confidence, 1.0);
        assert_eq!(FloorEstimate::new(EstimateMethod::Wifi, 2, -0.3, now).confidence, 0.0);
        assert_eq!(FloorEstimate::new(EstimateMethod::Wifi, 2, f64::NAN, now).confidence, 0.0);
    }

    #[test]
    fn path_quality_worst_prefers_degraded() {
        use PathQuality::*;
        assert_eq!(Direct.worst(Searched), Searched);
        assert_eq!(Searched.worst(StraightLineFallback), StraightLineFallback);
        assert_eq!(Direct.worst(Direct), Direct);
    }

    #[test]
    fn floor_changed_event_roundtrip() {
        let event = Event::new(
            "wayfind-runtime::navigator",
            NavEvent::FloorChanged(FloorChange {
                old_floor: 1,
                new_floor: -1,
                confidence: 0.95,
                source: DecisionSource::QrCode,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"floor_changed\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.payload, event.payload);
    }

    #[test]
    fn navigation_stop_has_kind() {
        assert_eq!(NavEvent::NavigationStop.kind(), "navigation_stop");
        let json = serde_json::to_string(&NavEvent::NavigationStop).unwrap();
        let back: NavEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NavEvent::NavigationStop);
    }

    #[test]
    fn nav_error_display() {
        let err = NavError::DestinationNotFound("spa".to_string());
        assert!(err.to_string().contains("spa"));

        let err = NavError::NoVerticalConnector { from: -1, to: 2 };
        assert!(err.to_string().contains("-1"));
    }
}
