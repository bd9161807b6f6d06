//! `wayfind-middleware` – Event delivery.
//!
//! Carries navigation events from the core to presentation collaborators
//! (AR overlay, voice guidance, UI) without either side knowing about the
//! other.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, EventReceiver, Topic};
