//! Pathfinder.
//!
//! Plans a [`Route`] from a live position to a catalog destination.
//!
//! - **Same floor** – if sampling the straight line at roughly one-unit
//!   steps finds only walkable points, the route is that line. Otherwise an
//!   8-connected unit-lattice A* anchored at the start searches around
//!   obstacles. The search is bounded by the floor plan extent plus
//!   `search_margin` and by `max_expansions`; when it gives up, a straight
//!   line is returned and the route is marked
//!   [`PathQuality::StraightLineFallback`].
//! - **Cross floor** – the connector minimising
//!   `dist(start, board) + dist(alight, end)` is chosen greedily and the
//!   route is composed as walk → ride → walk. The ride costs
//!   `|Δfloor| × floor_height` in distance and `floor_wait_minutes` per
//!   floor in time.
//!
//! # Example
//!
//! ```rust
//! use wayfind_map::{Destination, FloorPlan, SiteMap};
//! use wayfind_routing::{Pathfinder, RoutingConfig};
//! use wayfind_types::{PathQuality, Point3D};
//!
//! let site = SiteMap::new()
//!     .with_floor(1, FloorPlan::new().with_wall(-5.0, -2.0, 30.0, -2.0))
//!     .with_destination(Destination::new("reception", "Reception", 10.0, 5.0, 0.0, 1));
//!
//! let pathfinder = Pathfinder::new(&site, RoutingConfig::default());
//! let route = pathfinder.route(&Point3D::new(0.0, 0.0, 0.0, 1), "reception").unwrap();
//!
//! assert_eq!(route.waypoints.len(), 2);
//! assert_eq!(route.quality, PathQuality::Direct);
//! assert_eq!(route.estimated_time_minutes, 1.0);
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wayfind_map::{ConnectorKind, Rect, SiteMap};
use wayfind_types::{COORD_EPSILON, NavError, PathQuality, Point3D, Route};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for [`Pathfinder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Map units walked per minute.
    pub walking_speed: f64,
    /// Added to the ETA once per floor crossed.
    pub floor_wait_minutes: f64,
    /// Hard cap on A* node expansions per leg.
    pub max_expansions: usize,
    /// How far outside the floor plan extent A* may wander.
    pub search_margin: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            walking_speed: 60.0,
            floor_wait_minutes: 0.5,
            max_expansions: 20_000,
            search_margin: 2.0,
        }
    }
}

const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
];

// ────────────────────────────────────────────────────────────────────────────
// A* open-set entry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    f: f64,
    h: f64,
    seq: u64,
    key: (i32, i32),
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap: reverse every key so the smallest f pops first,
// then the smallest h, then the earliest insertion.
impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pathfinder
// ────────────────────────────────────────────────────────────────────────────

/// Route planner over a shared, read-only [`SiteMap`].
#[derive(Debug, Clone)]
pub struct Pathfinder<'a> {
    site: &'a SiteMap,
    config: RoutingConfig,
}

impl<'a> Pathfinder<'a> {
    pub fn new(site: &'a SiteMap, config: RoutingConfig) -> Self {
        Self { site, config }
    }

    pub fn site(&self) -> &'a SiteMap {
        self.site
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Plan a route from `start` to the catalog entry `destination_id`.
    ///
    /// # Errors
    ///
    /// - [`NavError::DestinationNotFound`] for an unknown id.
    /// - [`NavError::NoVerticalConnector`] when the floors differ and no
    ///   connector links them.
    pub fn route(&self, start: &Point3D, destination_id: &str) -> Result<Route, NavError> {
        let destination = self
            .site
            .destination(destination_id)
            .ok_or_else(|| NavError::DestinationNotFound(destination_id.to_string()))?;
        self.route_to_point(start, &destination.point())
    }

    /// Plan a route between two arbitrary points.
    pub fn route_to_point(&self, start: &Point3D, end: &Point3D) -> Result<Route, NavError> {
        if start.floor == end.floor {
            Ok(self.same_floor(start, end))
        } else {
            self.cross_floor(start, end)
        }
    }

    /// True when every point sampled along `start → end` (at most one unit
    /// apart) is walkable on `start.floor`.
    ///
    /// Walls and rooms all lie inside the plan extent, so only the part of
    /// the line within the extent (plus the wall buffer) is sampled. The
    /// work is bounded by the plan size however far away either end is.
    pub fn is_direct_path_clear(&self, start: &Point3D, end: &Point3D) -> bool {
        let Some(plan) = self.site.floor_plan(start.floor) else {
            return false;
        };
        if ![start.x, start.y, end.x, end.y].iter().all(|c| c.is_finite()) {
            return false;
        }
        let Some(extent) = plan.extent() else {
            return true;
        };
        let Some((t0, t1)) = clip_to_rect(start, end, &extent.inflate(self.site.wall_buffer() + 1.0))
        else {
            return true;
        };

        let steps = (start.planar_distance(end) * (t1 - t0)).ceil().max(1.0) as u32;
        (0..=steps).all(|i| {
            let t = t0 + (t1 - t0) * f64::from(i) / f64::from(steps);
            let x = start.x + (end.x - start.x) * t;
            let y = start.y + (end.y - start.y) * t;
            self.site.is_walkable(x, y, start.floor)
        })
    }

    /// Single-floor leg. Never fails: an unsearchable leg degrades to a
    /// straight line.
    pub fn same_floor(&self, start: &Point3D, end: &Point3D) -> Route {
        if self.is_direct_path_clear(start, end) {
            return self.build_route(vec![*start, *end], PathQuality::Direct);
        }

        match self.grid_search(start, end) {
            Some(waypoints) => {
                debug!(
                    floor = start.floor,
                    waypoints = waypoints.len(),
                    "grid search found a path"
                );
                self.build_route(waypoints, PathQuality::Searched)
            }
            None => {
                warn!(
                    floor = start.floor,
                    from = ?(start.x, start.y),
                    to = ?(end.x, end.y),
                    "no walkable path found, falling back to a straight line"
                );
                self.build_route(vec![*start, *end], PathQuality::StraightLineFallback)
            }
        }
    }

    /// Bounded 8-connected A* on a unit lattice anchored at `start`.
    ///
    /// Returns the simplified waypoint list (`start` first, `goal` last), or
    /// `None` when the open set is exhausted or the expansion budget runs
    /// out.
    pub fn grid_search(&self, start: &Point3D, goal: &Point3D) -> Option<Vec<Point3D>> {
        let floor = start.floor;
        let bounds = self.search_bounds(start, goal)?;
        let at = |key: (i32, i32)| {
            Point3D::new(
                start.x + f64::from(key.0),
                start.y + f64::from(key.1),
                start.z,
                floor,
            )
        };

        let mut open = BinaryHeap::new();
        let mut g_score: HashMap<(i32, i32), f64> = HashMap::new();
        let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
        let mut closed: HashSet<(i32, i32)> = HashSet::new();
        let mut seq = 0_u64;
        let mut expansions = 0_usize;

        let origin = (0, 0);
        let h0 = start.distance(goal);
        g_score.insert(origin, 0.0);
        open.push(OpenNode {
            f: h0,
            h: h0,
            seq,
            key: origin,
        });

        while let Some(node) = open.pop() {
            if !closed.insert(node.key) {
                continue;
            }
            expansions += 1;
            if expansions > self.config.max_expansions {
                debug!(expansions, "grid search budget exhausted");
                return None;
            }

            let current = at(node.key);
            if current.planar_distance(goal) < 1.0 {
                return Some(self.reconstruct(&came_from, node.key, start, goal, at));
            }

            let g_current = g_score.get(&node.key).copied().unwrap_or(f64::INFINITY);
            for (dx, dy) in NEIGHBOURS {
                let key = (node.key.0 + dx, node.key.1 + dy);
                if closed.contains(&key) {
                    continue;
                }
                let next = at(key);
                if !bounds.contains(next.x, next.y) || !self.site.is_walkable(next.x, next.y, floor)
                {
                    continue;
                }
                let tentative = g_current + current.distance(&next);
                if tentative < g_score.get(&key).copied().unwrap_or(f64::INFINITY) {
                    g_score.insert(key, tentative);
                    came_from.insert(key, node.key);
                    let h = next.distance(goal);
                    seq += 1;
                    open.push(OpenNode {
                        f: tentative + h,
                        h,
                        seq,
                        key,
                    });
                }
            }
        }

        None
    }

    /// Greedy connector choice for `start → end`: the lowest
    /// `dist(start, board) + dist(alight, end)`; the first in site order
    /// wins ties.
    pub fn choose_connector(
        &self,
        start: &Point3D,
        end: &Point3D,
    ) -> Option<(ConnectorKind, Point3D, Point3D)> {
        let mut best: Option<(f64, (ConnectorKind, Point3D, Point3D))> = None;
        for candidate in self.site.connectors_between(start.floor, end.floor) {
            let (_, board, alight) = candidate;
            let score = start.distance(&board) + alight.distance(end);
            if best.as_ref().is_none_or(|(best_score, _)| score < *best_score) {
                best = Some((score, candidate));
            }
        }
        best.map(|(_, c)| c)
    }

    fn cross_floor(&self, start: &Point3D, end: &Point3D) -> Result<Route, NavError> {
        let (kind, board, alight) = self.choose_connector(start, end).ok_or(
            NavError::NoVerticalConnector {
                from: start.floor,
                to: end.floor,
            },
        )?;

        let approach = self.same_floor(start, &board);
        let departure = self.same_floor(&alight, end);

        let floors_crossed = f64::from((end.floor - start.floor).unsigned_abs());
        let vertical = floors_crossed * self.site.floor_height();
        let total_distance = approach.total_distance + vertical + departure.total_distance;
        let estimated_time_minutes = floors_crossed * self.config.floor_wait_minutes
            + (total_distance / self.config.walking_speed).ceil();

        let mut waypoints = approach.waypoints;
        waypoints.extend(departure.waypoints);

        debug!(
            %kind,
            from = start.floor,
            to = end.floor,
            total_distance,
            "cross-floor route composed"
        );

        Ok(Route {
            waypoints,
            total_distance,
            estimated_time_minutes,
            floors_traversed: vec![start.floor, end.floor],
            quality: approach.quality.worst(departure.quality),
        })
    }

    fn search_bounds(&self, start: &Point3D, goal: &Point3D) -> Option<Rect> {
        let plan = self.site.extent(start.floor)?;
        let endpoints = Rect::new(
            start.x.min(goal.x),
            start.y.min(goal.y),
            (start.x - goal.x).abs(),
            (start.y - goal.y).abs(),
        );
        Some(plan.union(&endpoints).inflate(self.config.search_margin))
    }

    fn reconstruct(
        &self,
        came_from: &HashMap<(i32, i32), (i32, i32)>,
        reached: (i32, i32),
        start: &Point3D,
        goal: &Point3D,
        at: impl Fn((i32, i32)) -> Point3D,
    ) -> Vec<Point3D> {
        let mut keys = vec![reached];
        let mut cursor = reached;
        while let Some(prev) = came_from.get(&cursor) {
            keys.push(*prev);
            cursor = *prev;
        }
        keys.reverse();

        let mut path: Vec<Point3D> = keys.into_iter().map(at).collect();
        if let Some(first) = path.first_mut() {
            *first = *start;
        }
        let ends_on_goal = path.len() > 1
            && path
                .last()
                .is_some_and(|last| last.planar_distance(goal) < COORD_EPSILON);
        if ends_on_goal {
            path.pop();
        }
        path.push(*goal);
        simplify(path)
    }

    fn build_route(&self, waypoints: Vec<Point3D>, quality: PathQuality) -> Route {
        let total_distance = path_length(&waypoints);
        let floor = waypoints.first().map_or(0, |p| p.floor);
        Route {
            estimated_time_minutes: (total_distance / self.config.walking_speed).ceil(),
            total_distance,
            waypoints,
            floors_traversed: vec![floor],
            quality,
        }
    }
}

/// Sum of 3-D segment lengths.
pub fn path_length(waypoints: &[Point3D]) -> f64 {
    waypoints.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

/// Parameter range `[t0, t1]` of the segment `a → b` that lies inside
/// `rect` (Liang–Barsky), or `None` when the segment misses it.
fn clip_to_rect(a: &Point3D, b: &Point3D, rect: &Rect) -> Option<(f64, f64)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    for (p, q) in [
        (-dx, a.x - rect.x),
        (dx, rect.max_x() - a.x),
        (-dy, a.y - rect.y),
        (dy, rect.max_y() - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else if p < 0.0 {
            t0 = t0.max(q / p);
        } else {
            t1 = t1.min(q / p);
        }
    }
    (t0 <= t1).then_some((t0, t1))
}

/// Drop interior points that continue straight on in the same direction.
fn simplify(path: Vec<Point3D>) -> Vec<Point3D> {
    if path.len() < 3 {
        return path;
    }
    let mut out: Vec<Point3D> = Vec::with_capacity(path.len());
    for p in path {
        if out.len() >= 2 {
            let a = out[out.len() - 2];
            let b = out[out.len() - 1];
            let (abx, aby) = (b.x - a.x, b.y - a.y);
            let (bpx, bpy) = (p.x - b.x, p.y - b.y);
            let cross = abx * bpy - aby * bpx;
            let dot = abx * bpx + aby * bpy;
            if cross.abs() < COORD_EPSILON && dot > 0.0 && (b.z - a.z).abs() < COORD_EPSILON {
                out.pop();
            }
        }
        out.push(p);
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
