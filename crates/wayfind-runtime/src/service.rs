//! [`NavigatorService`] – async actor around a [`Navigator`].
//!
//! The service task owns the navigator outright. Every mutation arrives as a
//! [`Command`] on an `mpsc` channel and is applied between ticks, so a route
//! is never recomputed by two callers at once and `stop_navigation` can never
//! interleave with a half-finished tick. A `tokio::time::interval` drives the
//! fusion + tracking step at [`NavigatorConfig::tick_period`].
//!
//! Estimates are the one exception: producers push them straight into the
//! shared [`EstimateCollector`] through [`NavigatorHandle::report_estimate`]
//! without a round trip through the task.
//!
//! [`NavigatorConfig::tick_period`]: crate::navigator::NavigatorConfig::tick_period

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use wayfind_map::{Destination, SiteMap};
use wayfind_middleware::{EventBus, EventReceiver, Topic};
use wayfind_perception::{EstimateCollector, FusionOutcome};
use wayfind_types::{EstimateMethod, FloorEstimate, NavError, NavEvent, Point3D, Route};

use crate::navigator::{Navigator, NavigatorStatus};

/// Queue depth of the command channel.
const COMMAND_CAPACITY: usize = 64;

enum Command {
    SetManualFloor {
        floor: i32,
        reply: oneshot::Sender<FusionOutcome>,
    },
    ScanQr {
        payload: String,
        reply: oneshot::Sender<Option<i32>>,
    },
    CalibrateAltitude {
        samples: Vec<f64>,
        reply: oneshot::Sender<Option<f64>>,
    },
    ReportAltitude {
        altitude: f64,
        accuracy: Option<f64>,
        reply: oneshot::Sender<Option<FloorEstimate>>,
    },
    ReportNetwork {
        downlink_mbps: f64,
        rtt_ms: f64,
        reply: oneshot::Sender<Option<FloorEstimate>>,
    },
    ReportAcceleration {
        samples: Vec<f64>,
        reply: oneshot::Sender<Vec<FloorEstimate>>,
    },
    UpdatePosition(Point3D),
    Locate {
        x: f64,
        y: f64,
        reply: oneshot::Sender<Point3D>,
    },
    StartNavigation {
        destination: String,
        start: Option<Point3D>,
        reply: oneshot::Sender<Result<Route, NavError>>,
    },
    StopNavigation {
        reply: oneshot::Sender<bool>,
    },
    TickNow {
        reply: oneshot::Sender<Vec<NavEvent>>,
    },
    Status {
        reply: oneshot::Sender<NavigatorStatus>,
    },
    Reset,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of the running navigator task.
pub struct NavigatorService {
    navigator: Navigator,
    commands: mpsc::Receiver<Command>,
}

impl NavigatorService {
    /// Move `navigator` onto a Tokio task and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(navigator: Navigator) -> (NavigatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = NavigatorHandle {
            commands: tx,
            collector: navigator.collector(),
            bus: navigator.bus().clone(),
            site: Arc::clone(navigator.site()),
        };
        let service = NavigatorService {
            navigator,
            commands: rx,
        };
        let task = tokio::spawn(service.run());
        (handle, task)
    }

    async fn run(mut self) {
        let period = self.navigator.config().tick_period();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; there is nothing to fuse yet.
        ticker.tick().await;
        info!(tick_ms = period.as_millis() as u64, "navigator service started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.navigator.tick(Utc::now());
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    // Every handle dropped.
                    None => break,
                },
            }
        }

        self.navigator.stop_navigation();
        info!("navigator service stopped");
    }

    fn handle(&mut self, command: Command) {
        let now = Utc::now();
        match command {
            Command::SetManualFloor { floor, reply } => {
                let _ = reply.send(self.navigator.set_manual_floor(floor, now));
            }
            Command::ScanQr { payload, reply } => {
                let _ = reply.send(self.navigator.scan_qr(&payload, now));
            }
            Command::CalibrateAltitude { samples, reply } => {
                let _ = reply.send(self.navigator.calibrate_altitude(&samples));
            }
            Command::ReportAltitude {
                altitude,
                accuracy,
                reply,
            } => {
                let _ = reply.send(self.navigator.report_altitude(altitude, accuracy, now));
            }
            Command::ReportNetwork {
                downlink_mbps,
                rtt_ms,
                reply,
            } => {
                let _ = reply.send(self.navigator.report_network(downlink_mbps, rtt_ms, now));
            }
            Command::ReportAcceleration { samples, reply } => {
                let _ = reply.send(self.navigator.report_vertical_acceleration(&samples, now));
            }
            Command::UpdatePosition(position) => {
                self.navigator.update_position(position);
            }
            Command::Locate { x, y, reply } => {
                let _ = reply.send(self.navigator.locate(x, y));
            }
            Command::StartNavigation {
                destination,
                start,
                reply,
            } => {
                let _ = reply.send(self.navigator.start_navigation(&destination, start));
            }
            Command::StopNavigation { reply } => {
                let _ = reply.send(self.navigator.stop_navigation());
            }
            Command::TickNow { reply } => {
                let _ = reply.send(self.navigator.tick(now));
            }
            Command::Status { reply } => {
                let _ = reply.send(self.navigator.status(now));
            }
            Command::Reset => {
                self.navigator.reset();
            }
            Command::Shutdown { .. } => {
                debug!("shutdown handled by the run loop");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cheap, cloneable client of a running [`NavigatorService`].
///
/// Every method fails with [`NavError::ServiceStopped`] once the service
/// task has ended.
#[derive(Clone)]
pub struct NavigatorHandle {
    commands: mpsc::Sender<Command>,
    collector: EstimateCollector,
    bus: EventBus,
    site: Arc<SiteMap>,
}

impl NavigatorHandle {
    /// Buffer a floor estimate directly. Safe from any thread and never
    /// waits on the service task.
    pub fn report_estimate(&self, method: EstimateMethod, floor: i32, confidence: f64) {
        self.collector.report(method, floor, confidence);
    }

    /// Producer handle for sensor sources that run on their own threads.
    pub fn collector(&self) -> EstimateCollector {
        self.collector.clone()
    }

    pub fn site(&self) -> &Arc<SiteMap> {
        &self.site
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.site.destinations().cloned().collect()
    }

    pub fn subscribe_all(&self) -> EventReceiver {
        self.bus.subscribe_all()
    }

    pub fn subscribe_to(&self, topic: Topic) -> EventReceiver {
        self.bus.subscribe_to(topic)
    }

    pub async fn set_manual_floor(&self, floor: i32) -> Result<FusionOutcome, NavError> {
        self.request(|reply| Command::SetManualFloor { floor, reply })
            .await
    }

    pub async fn scan_qr(&self, payload: impl Into<String>) -> Result<Option<i32>, NavError> {
        let payload = payload.into();
        self.request(|reply| Command::ScanQr { payload, reply }).await
    }

    /// Calibrate the altitude baseline; see [`Navigator::calibrate_altitude`].
    pub async fn calibrate_altitude(&self, samples: Vec<f64>) -> Result<Option<f64>, NavError> {
        self.request(|reply| Command::CalibrateAltitude { samples, reply })
            .await
    }

    pub async fn report_altitude(
        &self,
        altitude: f64,
        accuracy: Option<f64>,
    ) -> Result<Option<FloorEstimate>, NavError> {
        self.request(|reply| Command::ReportAltitude {
            altitude,
            accuracy,
            reply,
        })
        .await
    }

    pub async fn report_network(
        &self,
        downlink_mbps: f64,
        rtt_ms: f64,
    ) -> Result<Option<FloorEstimate>, NavError> {
        self.request(|reply| Command::ReportNetwork {
            downlink_mbps,
            rtt_ms,
            reply,
        })
        .await
    }

    /// Vertical acceleration goes through the task because the integrator
    /// needs the fused floor.
    pub async fn report_vertical_acceleration(
        &self,
        samples: Vec<f64>,
    ) -> Result<Vec<FloorEstimate>, NavError> {
        self.request(|reply| Command::ReportAcceleration { samples, reply })
            .await
    }

    pub async fn update_position(&self, position: Point3D) -> Result<(), NavError> {
        self.send(Command::UpdatePosition(position)).await
    }

    /// Resolve a planar fix against the fused floor.
    pub async fn locate(&self, x: f64, y: f64) -> Result<Point3D, NavError> {
        self.request(|reply| Command::Locate { x, y, reply }).await
    }

    pub async fn start_navigation(
        &self,
        destination: impl Into<String>,
        start: Option<Point3D>,
    ) -> Result<Route, NavError> {
        let destination = destination.into();
        self.request(|reply| Command::StartNavigation {
            destination,
            start,
            reply,
        })
        .await?
    }

    pub async fn stop_navigation(&self) -> Result<bool, NavError> {
        self.request(|reply| Command::StopNavigation { reply })
            .await
    }

    /// Run a tick immediately instead of waiting for the interval.
    pub async fn tick_now(&self) -> Result<Vec<NavEvent>, NavError> {
        self.request(|reply| Command::TickNow { reply }).await
    }

    pub async fn status(&self) -> Result<NavigatorStatus, NavError> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn reset(&self) -> Result<(), NavError> {
        self.send(Command::Reset).await
    }

    /// Stop the service task, ending any active session first.
    pub async fn shutdown(&self) -> Result<(), NavError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn send(&self, command: Command) -> Result<(), NavError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| NavError::ServiceStopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, NavError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| NavError::ServiceStopped)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
