//! `wayfind-perception` – Floor awareness layer.
//!
//! Turns cheap, individually unreliable floor hints into one authoritative
//! current floor.
//!
//! # Modules
//!
//! - [`collector`] – [`EstimateCollector`][collector::EstimateCollector]:
//!   shared, time-pruned buffer that any number of sensor producers append
//!   to concurrently.
//! - [`fusion`] – [`FloorFusion`][fusion::FloorFusion]: weighted-vote state
//!   machine with manual and QR trust windows and a confidence threshold.
//! - [`sources`] – per-sensor estimators that map already-parsed readings
//!   (altitude, network quality, vertical acceleration, QR payloads) onto
//!   floor estimates.

pub mod collector;
pub mod fusion;
pub mod sources;

pub use collector::EstimateCollector;
pub use fusion::{FloorFusion, FusionConfig, FusionOutcome, FusionStatus, MethodWeights};
pub use sources::{
    AltitudeFloorEstimator, NetworkQualityEstimator, VerticalMotionIntegrator, parse_qr_floor,
};
