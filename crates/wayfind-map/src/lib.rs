//! `wayfind-map` – the static description of the building.
//!
//! Pure data plus containment / intersection tests. Nothing in this crate
//! mutates after load, so a [`SiteMap`] is shared read-only (usually as an
//! `Arc<SiteMap>`) between the pathfinder and the route tracker.
//!
//! # Modules
//!
//! - [`geometry`] – [`Point2D`], wall [`Segment`]s, axis-aligned [`Rect`]s and
//!   the point-to-segment distance used for wall collision and drift checks.
//! - [`plan`] – [`FloorPlan`]: walls, rooms and doors of one storey and the
//!   walkability test built on them.
//! - [`site`] – [`SiteMap`]: every floor plan, the [`Destination`] catalog and
//!   the [`VerticalConnector`] list, loadable from TOML.

pub mod geometry;
pub mod plan;
pub mod site;

pub use geometry::{Point2D, Rect, Segment, point_segment_distance};
pub use plan::{FloorPlan, Room};
pub use site::{
    ConnectorKind, Destination, DestinationCategory, SiteMap, VerticalConnector,
    DEFAULT_FLOOR_HEIGHT, DEFAULT_WALL_BUFFER, MIN_WALL_BUFFER,
};
