//! `wayfind-routing` – Route planning and progress tracking.
//!
//! # Modules
//!
//! - [`pathfinder`] – [`Pathfinder`][pathfinder::Pathfinder]: straight-line
//!   check, bounded 8-connected grid A*, and cross-floor composition through
//!   a [`VerticalConnector`][wayfind_map::VerticalConnector].
//! - [`tracker`] – [`RouteTracker`][tracker::RouteTracker]: waypoint cursor,
//!   arrival detection, drift-triggered recomputation and remaining
//!   distance / ETA reporting.

pub mod pathfinder;
pub mod tracker;

pub use pathfinder::{Pathfinder, RoutingConfig};
pub use tracker::{RouteTracker, TrackerConfig};
