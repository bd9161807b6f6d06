//! `wayfind-runtime` – The navigation loop.
//!
//! Wires the perception and routing crates together and drives them on a
//! fixed cadence.
//!
//! # Modules
//!
//! - [`navigator`] – [`Navigator`][navigator::Navigator]: synchronous
//!   orchestrator. Each tick prunes the estimate window, runs floor fusion,
//!   re-tags the live position with the fused floor and advances the route
//!   tracker, publishing every resulting event on the
//!   [`EventBus`][wayfind_middleware::EventBus].
//! - [`service`] – [`NavigatorService`][service::NavigatorService]: async
//!   actor that owns a `Navigator`, serialises every mutation through a
//!   command channel and ticks it from a `tokio::time::interval`.
//!   [`NavigatorHandle`][service::NavigatorHandle] is the cloneable client.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter. Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export.

pub mod navigator;
pub mod service;
pub mod telemetry;

pub use navigator::{Navigator, NavigatorConfig, NavigatorStatus, SessionStatus};
pub use service::{NavigatorHandle, NavigatorService};
pub use telemetry::{LogFormat, LogSettings, TracerProviderGuard, init_tracing};
