//! The building as a whole: floor plans, destination catalog and vertical
//! connectors.
//!
//! A [`SiteMap`] is built once at startup, either programmatically through
//! the `with_*` builders or from a TOML site file:
//!
//! ```toml
//! floor_height = 3.5
//! wall_buffer = 0.5
//!
//! [[floors]]
//! floor = 1
//! walls = [{ start = { x = -5.0, y = -2.0 }, end = { x = 40.0, y = -2.0 } }]
//! rooms = [{ id = "reception_room", bounds = { x = 8.0, y = 3.0, w = 8.0, h = 4.0 } }]
//!
//! [[destinations]]
//! id = "entrance"
//! display_name = "Entrance"
//! x = 0.0
//! y = 0.0
//! z = 0.0
//! floor = 1
//! category = "service"
//!
//! [[connectors]]
//! kind = "elevator"
//! entry = { x = 20.0, y = 2.0, z = 0.0, floor = 1 }
//! exit = { x = 20.0, y = 2.0, z = 3.5, floor = 2 }
//! ```
//!
//! # Example
//!
//! ```rust
//! use wayfind_map::{Destination, FloorPlan, SiteMap};
//!
//! let site = SiteMap::new()
//!     .with_floor(1, FloorPlan::new().with_wall(-5.0, -2.0, 40.0, -2.0))
//!     .with_destination(Destination::new("reception", "Reception", 10.0, 5.0, 0.0, 1));
//!
//! assert!(site.is_walkable(0.0, 0.0, 1));
//! assert!(!site.is_walkable(0.0, 0.0, 7)); // no plan registered
//! assert!(site.destination("reception").is_some());
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use wayfind_types::{NavError, Point3D};

use crate::geometry::Rect;
use crate::plan::FloorPlan;

/// Storey height used when the site file does not specify one.
pub const DEFAULT_FLOOR_HEIGHT: f64 = 3.5;

/// Wall thickness used for collision when the site file does not specify one.
pub const DEFAULT_WALL_BUFFER: f64 = 0.5;

/// Thinnest wall buffer accepted. Routing samples the plan on a unit grid,
/// so a thinner buffer lets a sample step over a wall.
pub const MIN_WALL_BUFFER: f64 = 0.5;

// ────────────────────────────────────────────────────────────────────────────
// Catalog types
// ────────────────────────────────────────────────────────────────────────────

/// Coarse grouping used by destination pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationCategory {
    Service,
    Facility,
    Dining,
    Shopping,
    Relaxation,
    Navigation,
    Parking,
    #[default]
    Other,
}

impl std::fmt::Display for DestinationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DestinationCategory::Service => "service",
            DestinationCategory::Facility => "facility",
            DestinationCategory::Dining => "dining",
            DestinationCategory::Shopping => "shopping",
            DestinationCategory::Relaxation => "relaxation",
            DestinationCategory::Navigation => "navigation",
            DestinationCategory::Parking => "parking",
            DestinationCategory::Other => "other",
        };
        f.write_str(label)
    }
}

/// A named point of interest. The `id` doubles as the route target key and
/// as the result of reverse lookup during recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub display_name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub floor: i32,
    #[serde(default)]
    pub category: DestinationCategory,
}

impl Destination {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        x: f64,
        y: f64,
        z: f64,
        floor: i32,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            x,
            y,
            z,
            floor,
            category: DestinationCategory::Other,
        }
    }

    /// Builder-style category override.
    pub fn with_category(mut self, category: DestinationCategory) -> Self {
        self.category = category;
        self
    }

    pub fn point(&self) -> Point3D {
        Point3D::new(self.x, self.y, self.z, self.floor)
    }
}

/// Kind of vertical transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Elevator,
    Stairs,
}

impl std::fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorKind::Elevator => write!(f, "elevator"),
            ConnectorKind::Stairs => write!(f, "stairs"),
        }
    }
}

/// An elevator or staircase linking two floors. Usable in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalConnector {
    pub kind: ConnectorKind,
    pub entry: Point3D,
    pub exit: Point3D,
}

impl VerticalConnector {
    pub fn new(kind: ConnectorKind, entry: Point3D, exit: Point3D) -> Self {
        Self { kind, entry, exit }
    }

    /// The `(board, alight)` pair when travelling from `from` to `to`, or
    /// `None` if this connector does not link those floors.
    pub fn oriented(&self, from: i32, to: i32) -> Option<(Point3D, Point3D)> {
        if self.entry.floor == from && self.exit.floor == to {
            Some((self.entry, self.exit))
        } else if self.exit.floor == from && self.entry.floor == to {
            Some((self.exit, self.entry))
        } else {
            None
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// On-disk format
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SiteFile {
    #[serde(default = "default_floor_height")]
    floor_height: f64,
    #[serde(default = "default_wall_buffer")]
    wall_buffer: f64,
    #[serde(default)]
    floors: Vec<FloorEntry>,
    #[serde(default)]
    destinations: Vec<Destination>,
    #[serde(default)]
    connectors: Vec<VerticalConnector>,
}

#[derive(Debug, Deserialize)]
struct FloorEntry {
    floor: i32,
    #[serde(flatten)]
    plan: FloorPlan,
}

fn default_floor_height() -> f64 {
    DEFAULT_FLOOR_HEIGHT
}
fn default_wall_buffer() -> f64 {
    DEFAULT_WALL_BUFFER
}

// ────────────────────────────────────────────────────────────────────────────
// SiteMap
// ────────────────────────────────────────────────────────────────────────────

/// Immutable description of the whole building.
///
/// Destinations are keyed by id in a `BTreeMap` so that listing and reverse
/// lookup are deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteMap {
    floor_height: f64,
    wall_buffer: f64,
    floor_plans: BTreeMap<i32, FloorPlan>,
    destinations: BTreeMap<String, Destination>,
    connectors: Vec<VerticalConnector>,
}

impl Default for SiteMap {
    fn default() -> Self {
        Self {
            floor_height: DEFAULT_FLOOR_HEIGHT,
            wall_buffer: DEFAULT_WALL_BUFFER,
            floor_plans: BTreeMap::new(),
            destinations: BTreeMap::new(),
            connectors: Vec::new(),
        }
    }
}

impl SiteMap {
    /// An empty site with default floor height and wall buffer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_floor_height(mut self, floor_height: f64) -> Self {
        self.floor_height = floor_height;
        self
    }

    pub fn with_wall_buffer(mut self, wall_buffer: f64) -> Self {
        self.wall_buffer = wall_buffer;
        self
    }

    /// Register (or replace) the plan for `floor`.
    pub fn with_floor(mut self, floor: i32, plan: FloorPlan) -> Self {
        self.floor_plans.insert(floor, plan);
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destinations.insert(destination.id.clone(), destination);
        self
    }

    pub fn with_connector(mut self, connector: VerticalConnector) -> Self {
        self.connectors.push(connector);
        self
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Parse and validate a TOML site description.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::InvalidSite`] on malformed TOML or when
    /// [`SiteMap::validate`] rejects the content.
    pub fn from_toml_str(raw: &str) -> Result<Self, NavError> {
        let file: SiteFile = toml::from_str(raw)
            .map_err(|e| NavError::InvalidSite(format!("failed to parse site file: {e}")))?;

        let mut site = SiteMap::new()
            .with_floor_height(file.floor_height)
            .with_wall_buffer(file.wall_buffer);

        let mut seen_floors = HashSet::new();
        for entry in file.floors {
            if !seen_floors.insert(entry.floor) {
                return Err(NavError::InvalidSite(format!(
                    "floor {} is described more than once",
                    entry.floor
                )));
            }
            site.floor_plans.insert(entry.floor, entry.plan);
        }

        for destination in file.destinations {
            if site.destinations.contains_key(&destination.id) {
                return Err(NavError::InvalidSite(format!(
                    "duplicate destination id '{}'",
                    destination.id
                )));
            }
            site.destinations.insert(destination.id.clone(), destination);
        }

        site.connectors = file.connectors;
        site.validate()?;

        debug!(
            floors = site.floor_plans.len(),
            destinations = site.destinations.len(),
            connectors = site.connectors.len(),
            "site map loaded"
        );
        Ok(site)
    }

    /// Read and parse a TOML site file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NavError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            NavError::InvalidSite(format!("failed to read site file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Check the numeric sanity of the site.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::InvalidSite`] when the floor height is not a
    /// positive finite number, the wall buffer is below [`MIN_WALL_BUFFER`],
    /// a room has a negative extent, any
    /// coordinate is non-finite, or a connector starts and ends on the same
    /// floor.
    pub fn validate(&self) -> Result<(), NavError> {
        if !(self.floor_height.is_finite() && self.floor_height > 0.0) {
            return Err(NavError::InvalidSite(format!(
                "floor_height must be positive, got {}",
                self.floor_height
            )));
        }
        if !(self.wall_buffer.is_finite() && self.wall_buffer >= MIN_WALL_BUFFER) {
            return Err(NavError::InvalidSite(format!(
                "wall_buffer must be at least {MIN_WALL_BUFFER}, got {}",
                self.wall_buffer
            )));
        }

        for (floor, plan) in &self.floor_plans {
            for wall in &plan.walls {
                let coords = [wall.start.x, wall.start.y, wall.end.x, wall.end.y];
                if coords.iter().any(|c| !c.is_finite()) {
                    return Err(NavError::InvalidSite(format!(
                        "non-finite wall coordinate on floor {floor}"
                    )));
                }
            }
            for room in &plan.rooms {
                let b = room.bounds;
                if ![b.x, b.y, b.w, b.h].iter().all(|c| c.is_finite()) || b.w < 0.0 || b.h < 0.0 {
                    return Err(NavError::InvalidSite(format!(
                        "room '{}' on floor {floor} has invalid bounds",
                        room.id
                    )));
                }
            }
        }

        for d in self.destinations.values() {
            if ![d.x, d.y, d.z].iter().all(|c| c.is_finite()) {
                return Err(NavError::InvalidSite(format!(
                    "destination '{}' has a non-finite coordinate",
                    d.id
                )));
            }
        }

        for c in &self.connectors {
            if c.entry.floor == c.exit.floor {
                return Err(NavError::InvalidSite(format!(
                    "{} connector at ({}, {}) links floor {} to itself",
                    c.kind, c.entry.x, c.entry.y, c.entry.floor
                )));
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn floor_height(&self) -> f64 {
        self.floor_height
    }

    pub fn wall_buffer(&self) -> f64 {
        self.wall_buffer
    }

    /// Nominal `z` of a storey. Ground floor is `1` at `z = 0`; there is no
    /// floor `0`, so basements sit one storey below it per level.
    pub fn elevation(&self, floor: i32) -> f64 {
        let storeys = if floor > 0 { floor - 1 } else { floor };
        f64::from(storeys) * self.floor_height
    }

    pub fn floor_plan(&self, floor: i32) -> Option<&FloorPlan> {
        self.floor_plans.get(&floor)
    }

    /// Registered floors in ascending order.
    pub fn floors(&self) -> impl Iterator<Item = i32> + '_ {
        self.floor_plans.keys().copied()
    }

    /// Walkability of `(x, y)` on `floor`. Floors without a plan are not
    /// walkable.
    pub fn is_walkable(&self, x: f64, y: f64, floor: i32) -> bool {
        self.floor_plans
            .get(&floor)
            .is_some_and(|plan| plan.is_walkable(x, y, self.wall_buffer))
    }

    /// Bounding box of the plan for `floor`, used to bound grid searches.
    pub fn extent(&self, floor: i32) -> Option<Rect> {
        self.floor_plans.get(&floor).and_then(FloorPlan::extent)
    }

    pub fn destination(&self, id: &str) -> Option<&Destination> {
        self.destinations.get(id)
    }

    /// Reverse lookup: the catalog entry located at `point` (same floor,
    /// same planar coordinates). The first match in id order wins.
    pub fn find_destination_at(&self, point: &Point3D) -> Option<&Destination> {
        self.destinations
            .values()
            .find(|d| d.point().same_location(point))
    }

    /// Every destination, ordered by id.
    pub fn destinations(&self) -> impl Iterator<Item = &Destination> + '_ {
        self.destinations.values()
    }

    pub fn destinations_on(&self, floor: i32) -> impl Iterator<Item = &Destination> + '_ {
        self.destinations.values().filter(move |d| d.floor == floor)
    }

    pub fn connectors(&self) -> &[VerticalConnector] {
        &self.connectors
    }

    /// Connectors usable from `from` to `to`, oriented for that direction,
    /// in site order.
    pub fn connectors_between(
        &self,
        from: i32,
        to: i32,
    ) -> impl Iterator<Item = (ConnectorKind, Point3D, Point3D)> + '_ {
        self.connectors
            .iter()
            .filter_map(move |c| c.oriented(from, to).map(|(a, b)| (c.kind, a, b)))
    }
}
