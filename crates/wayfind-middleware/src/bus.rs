//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so every subscriber receives
//! every message and a slow subscriber never blocks the navigator.
//!
//! # Topics
//!
//! | Topic | Traffic |
//! |---|---|
//! | [`Topic::Floor`] | `floor_changed` |
//! | [`Topic::Navigation`] | session lifecycle, waypoint progress, periodic updates |
//! | [`Topic::Alerts`] | recoverable failures (`recalculation_failed`) |
//!
//! [`EventBus::publish`] routes an event to its topic and mirrors it on the
//! firehose channel returned by [`EventBus::subscribe_all`].

use tokio::sync::broadcast;
use tracing::warn;
use wayfind_types::{Event, NavError, NavEvent};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Current-floor decisions.
    Floor,
    /// Route start/stop, waypoint and arrival progress, periodic updates.
    Navigation,
    /// Recoverable problems the visitor may need to hear about.
    Alerts,
}

impl Topic {
    /// The lane an event payload belongs on.
    pub fn for_event(payload: &NavEvent) -> Topic {
        match payload {
            NavEvent::FloorChanged(_) => Topic::Floor,
            NavEvent::RecalculationFailed { .. } => Topic::Alerts,
            NavEvent::NavigationStart { .. }
            | NavEvent::WaypointReached { .. }
            | NavEvent::DestinationReached { .. }
            | NavEvent::RouteRecalculated { .. }
            | NavEvent::NavigationUpdate { .. }
            | NavEvent::NavigationStop => Topic::Navigation,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    all: broadcast::Sender<Event>,
    floor: broadcast::Sender<Event>,
    navigation: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        let (floor, _) = broadcast::channel(capacity);
        let (navigation, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            all,
            floor,
            navigation,
            alerts,
        }
    }

    /// Publish `event` on its own topic and on the firehose.
    ///
    /// Returns the total number of receivers handed the event, or
    /// [`NavError::Channel`] when nobody is listening anywhere.
    pub fn publish(&self, event: Event) -> Result<usize, NavError> {
        let topic = Topic::for_event(&event.payload);
        let on_topic = self.topic_sender(topic).send(event.clone()).unwrap_or(0);
        let on_all = self.all.send(event).unwrap_or(0);
        match on_topic + on_all {
            0 => Err(NavError::Channel(format!(
                "no subscribers for topic {topic:?}"
            ))),
            n => Ok(n),
        }
    }

    /// Publish `event` to the given [`Topic`] channel only.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, NavError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| NavError::Channel(format!("no subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> EventReceiver {
        EventReceiver {
            label: format!("{topic:?}"),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every event published through [`EventBus::publish`].
    pub fn subscribe_all(&self) -> EventReceiver {
        EventReceiver {
            label: "all".to_string(),
            receiver: self.all.subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Floor => &self.floor,
            Topic::Navigation => &self.navigation,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to one channel of the bus.
pub struct EventReceiver {
    label: String,
    receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event, surfacing lag to the caller.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, skipping over lag. Returns `None` once the
    /// bus has shut down.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(channel = %self.label, lagged_by = n, "event receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for presentation layers that drain once per frame.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(channel = %self.label, lagged_by = n, "event receiver lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}
