//! Route Tracker.
//!
//! Follows the visitor along the active [`Route`]. Every
//! [`RouteTracker::tick`] does three things, in order:
//!
//! 1. **Arrival** – if the position is within `arrival_radius` of the cursor
//!    waypoint the cursor advances by one. Passing the last waypoint emits
//!    [`NavEvent::DestinationReached`] and ends the session.
//! 2. **Drift** – the position is compared with the remaining segments,
//!    including the one leading into the cursor waypoint. Beyond
//!    `recalculation_distance` the route is re-planned from the position to
//!    the destination, found again by reverse lookup of the final waypoint
//!    in the catalog. Drift is edge-triggered: one recalculation per
//!    episode, and the episode ends once the position is back within
//!    tolerance.
//! 3. **Update** – a [`NavEvent::NavigationUpdate`] with remaining distance
//!    and ETA. The ETA uses the pathfinder's walking speed so it agrees with
//!    the planned route.
//!
//! The cursor never moves backwards except when a recalculated route
//! replaces the old one wholesale.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wayfind_map::point_segment_distance;
use wayfind_types::{NavEvent, Point3D, Route};

use crate::pathfinder::Pathfinder;

/// Tunables for [`RouteTracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub arrival_radius: f64,
    pub recalculation_distance: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            arrival_radius: 3.0,
            recalculation_distance: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    route: Route,
    cursor: usize,
    drifting: bool,
}

/// Navigation session state machine: idle, or following one route.
#[derive(Debug, Clone, Default)]
pub struct RouteTracker {
    config: TrackerConfig,
    session: Option<Session>,
}

impl RouteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Begin following `route`, replacing any active session.
    pub fn start(&mut self, route: Route) {
        debug!(waypoints = route.len(), "tracking started");
        self.session = Some(Session {
            route,
            cursor: 0,
            drifting: false,
        });
    }

    /// End the session. Returns whether one was active.
    pub fn stop(&mut self) -> bool {
        self.session.take().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn route(&self) -> Option<&Route> {
        self.session.as_ref().map(|s| &s.route)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.cursor)
    }

    /// Advance the session with a new position and return the events it
    /// produced. An idle tracker returns nothing.
    pub fn tick(&mut self, position: &Point3D, pathfinder: &Pathfinder<'_>) -> Vec<NavEvent> {
        let mut events = Vec::new();
        let Some(session) = self.session.as_mut() else {
            return events;
        };
        let len = session.route.waypoints.len();

        if let Some(target) = session.route.waypoints.get(session.cursor).copied() {
            if position.distance(&target) < self.config.arrival_radius {
                session.cursor += 1;
                match session.route.waypoints.get(session.cursor).copied() {
                    None => {
                        info!(x = target.x, y = target.y, floor = target.floor, "destination reached");
                        events.push(NavEvent::DestinationReached {
                            destination: target,
                        });
                        self.session = None;
                        return events;
                    }
                    Some(next) => {
                        debug!(cursor = session.cursor, "waypoint reached");
                        events.push(NavEvent::WaypointReached {
                            waypoint: target,
                            next,
                            progress: session.cursor as f64 / len as f64,
                        });
                    }
                }
            }
        }

        let off_route = distance_to_route(&session.route, session.cursor, position);
        if off_route > self.config.recalculation_distance {
            if !session.drifting {
                session.drifting = true;
                events.push(recalculate(session, position, pathfinder));
            }
        } else {
            session.drifting = false;
        }

        if let Some(next_waypoint) = session.route.waypoints.get(session.cursor).copied() {
            let distance_remaining = remaining_distance(&session.route, session.cursor, position);
            events.push(NavEvent::NavigationUpdate {
                current_position: *position,
                next_waypoint,
                distance_remaining,
                eta_minutes: (distance_remaining / pathfinder.config().walking_speed).ceil(),
            });
        }

        events
    }
}

fn recalculate(session: &mut Session, position: &Point3D, pathfinder: &Pathfinder<'_>) -> NavEvent {
    let Some(final_waypoint) = session.route.destination().copied() else {
        return NavEvent::RecalculationFailed {
            reason: "active route has no waypoints".to_string(),
        };
    };

    let Some(destination) = pathfinder.site().find_destination_at(&final_waypoint) else {
        warn!(
            x = final_waypoint.x,
            y = final_waypoint.y,
            floor = final_waypoint.floor,
            "route destination is not in the catalog, keeping stale route"
        );
        return NavEvent::RecalculationFailed {
            reason: format!(
                "no destination at ({}, {}) on floor {}",
                final_waypoint.x, final_waypoint.y, final_waypoint.floor
            ),
        };
    };

    match pathfinder.route_to_point(position, &destination.point()) {
        Ok(new_route) => {
            info!(destination = %destination.id, waypoints = new_route.len(), "route recalculated");
            session.route = new_route.clone();
            session.cursor = 0;
            NavEvent::RouteRecalculated { new_route }
        }
        Err(e) => {
            warn!(destination = %destination.id, error = %e, "route recalculation failed, keeping stale route");
            NavEvent::RecalculationFailed {
                reason: e.to_string(),
            }
        }
    }
}

/// Smallest planar distance from `position` to a remaining segment on the
/// position's floor. Segments run from the waypoint before the cursor to the
/// end. A position on a floor the remainder never touches is infinitely far.
fn distance_to_route(route: &Route, cursor: usize, position: &Point3D) -> f64 {
    let waypoints = &route.waypoints;
    if waypoints.len() < 2 {
        return 0.0;
    }
    let first = cursor.saturating_sub(1).min(waypoints.len() - 2);
    waypoints[first..]
        .windows(2)
        .filter(|w| w[0].floor == position.floor || w[1].floor == position.floor)
        .map(|w| point_segment_distance(position, &w[0], &w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Distance to the cursor waypoint plus every segment after it.
fn remaining_distance(route: &Route, cursor: usize, position: &Point3D) -> f64 {
    let waypoints = &route.waypoints;
    let Some(next) = waypoints.get(cursor) else {
        return 0.0;
    };
    position.distance(next)
        + waypoints[cursor..]
            .windows(2)
            .map(|w| w[0].distance(&w[1]))
            .sum::<f64>()
}
