//! Walkable-space description of a single storey.
//!
//! A [`FloorPlan`] is a set of impassable wall [`Segment`]s, opaque
//! [`Room`] rectangles and door points. Everything that is neither on a wall
//! (within the wall buffer) nor inside a room is walkable. Rooms are entered
//! through gaps in the plan, so direct pathing never cuts through them.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point2D, Rect, Segment};

/// A named no-walk zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub bounds: Rect,
}

/// Walls, rooms and doors of one floor. Immutable after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorPlan {
    #[serde(default)]
    pub walls: Vec<Segment>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub doors: Vec<Point2D>,
}

impl FloorPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: add a wall from `(x0, y0)` to `(x1, y1)`.
    pub fn with_wall(mut self, x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        self.walls
            .push(Segment::new(Point2D::new(x0, y0), Point2D::new(x1, y1)));
        self
    }

    /// Builder-style: add a room rectangle.
    pub fn with_room(mut self, id: impl Into<String>, bounds: Rect) -> Self {
        self.rooms.push(Room {
            id: id.into(),
            bounds,
        });
        self
    }

    /// Builder-style: add a door point.
    pub fn with_door(mut self, x: f64, y: f64) -> Self {
        self.doors.push(Point2D::new(x, y));
        self
    }

    /// True when `(x, y)` is clear of every wall (by `wall_buffer`) and
    /// outside every room.
    pub fn is_walkable(&self, x: f64, y: f64, wall_buffer: f64) -> bool {
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        if self.walls.iter().any(|w| w.is_point_on(x, y, wall_buffer)) {
            return false;
        }
        self.room_at(x, y).is_none()
    }

    /// The first room containing `(x, y)`, if any.
    pub fn room_at(&self, x: f64, y: f64) -> Option<&Room> {
        self.rooms.iter().find(|r| r.bounds.contains(x, y))
    }

    /// Bounding box of every wall endpoint, room and door.
    ///
    /// Returns `None` for an empty plan.
    pub fn extent(&self) -> Option<Rect> {
        let wall_boxes = self.walls.iter().map(|w| {
            let min_x = w.start.x.min(w.end.x);
            let min_y = w.start.y.min(w.end.y);
            Rect::new(
                min_x,
                min_y,
                w.start.x.max(w.end.x) - min_x,
                w.start.y.max(w.end.y) - min_y,
            )
        });
        let room_boxes = self.rooms.iter().map(|r| r.bounds);
        let door_boxes = self.doors.iter().map(|d| Rect::new(d.x, d.y, 0.0, 0.0));

        wall_boxes
            .chain(room_boxes)
            .chain(door_boxes)
            .reduce(|acc, r| acc.union(&r))
    }
}
