//! Floor Fusion Engine.
//!
//! Decides the single current floor from a window of [`FloorEstimate`]s.
//! Evidence is ranked in three tiers:
//!
//! 1. **Manual anchor** – a floor chosen by the visitor wins outright with
//!    confidence 1.0 while younger than `manual_trust_ms`.
//! 2. **QR anchor** – a floor decoded from a scanned marker wins with
//!    `qr_confidence` while younger than `qr_trust_ms`.
//! 3. **Composite vote** – every estimate contributes
//!    `confidence × weight(method)` to its floor; the best floor is applied
//!    only when its clamped score is strictly above `confidence_threshold`.
//!
//! Once constructed the engine always has a current floor; weak evidence
//! leaves it untouched.
//!
//! All time-dependent operations take an explicit `now` so trust-window
//! boundaries are reproducible.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use wayfind_perception::fusion::{FloorFusion, FusionConfig, FusionOutcome};
//! use wayfind_types::{EstimateMethod, FloorEstimate};
//!
//! let mut fusion = FloorFusion::new(FusionConfig::default());
//! let now = Utc::now();
//!
//! let estimates = vec![
//!     FloorEstimate::new(EstimateMethod::QrCode, 2, 0.95, now),
//! ];
//!
//! match fusion.decide(&estimates, now) {
//!     FusionOutcome::Changed(change) => assert_eq!(change.new_floor, 2),
//!     other => panic!("unexpected outcome {other:?}"),
//! }
//! assert_eq!(fusion.current_floor(), 2);
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wayfind_types::{DecisionSource, EstimateMethod, FloorChange, FloorEstimate, floor_label};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Per-method vote weights for the composite tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodWeights {
    pub manual: f64,
    pub qrcode: f64,
    pub barometric: f64,
    pub wifi: f64,
    pub accelerometer: f64,
    /// Applied to any method without a dedicated weight.
    pub other: f64,
}

impl Default for MethodWeights {
    fn default() -> Self {
        Self {
            manual: 1.0,
            qrcode: 0.9,
            barometric: 0.4,
            wifi: 0.3,
            accelerometer: 0.2,
            other: 0.1,
        }
    }
}

impl MethodWeights {
    pub fn weight(&self, method: &EstimateMethod) -> f64 {
        match method {
            EstimateMethod::Manual => self.manual,
            EstimateMethod::QrCode => self.qrcode,
            EstimateMethod::Barometric => self.barometric,
            EstimateMethod::Wifi => self.wifi,
            EstimateMethod::Accelerometer => self.accelerometer,
            EstimateMethod::Other(_) => self.other,
        }
    }
}

/// Tunables for [`FloorFusion`]. Every field has a default so a partial
/// `[fusion]` table in a config file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Composite scores must be strictly above this to change the floor.
    pub confidence_threshold: f64,
    /// Lifetime of a manual anchor.
    pub manual_trust_ms: u64,
    /// Lifetime of a QR anchor.
    pub qr_trust_ms: u64,
    /// Confidence attached to QR-derived decisions.
    pub qr_confidence: f64,
    /// How long the collector keeps an estimate.
    pub retention_ms: u64,
    /// Floor assumed at start-up and after [`FloorFusion::reset`].
    pub initial_floor: i32,
    pub weights: MethodWeights,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            manual_trust_ms: 60_000,
            qr_trust_ms: 30_000,
            qr_confidence: 0.95,
            retention_ms: 10_000,
            initial_floor: 1,
            weights: MethodWeights::default(),
        }
    }
}

impl FusionConfig {
    pub fn manual_trust(&self) -> Duration {
        millis(self.manual_trust_ms)
    }

    pub fn qr_trust(&self) -> Duration {
        millis(self.qr_trust_ms)
    }

    pub fn retention(&self) -> Duration {
        millis(self.retention_ms)
    }
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

// ────────────────────────────────────────────────────────────────────────────
// Outcome & status
// ────────────────────────────────────────────────────────────────────────────

/// Result of one [`FloorFusion::decide`] pass.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionOutcome {
    /// The estimate window was empty; nothing was evaluated.
    InsufficientEvidence,
    /// The current floor moved.
    Changed(FloorChange),
    /// The winning floor is already current; stored confidence is now the
    /// max of the old and new values.
    Reinforced {
        floor: i32,
        confidence: f64,
        source: DecisionSource,
    },
    /// The composite winner did not clear the threshold. `candidate` is
    /// `None` when no floor scored above zero.
    BelowThreshold {
        candidate: Option<i32>,
        confidence: f64,
    },
}

/// One trust anchor as seen by [`FloorFusion::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorStatus {
    pub floor: i32,
    pub age_ms: i64,
    pub active: bool,
}

/// Debug snapshot of the fusion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionStatus {
    pub floor: i32,
    pub label: String,
    pub confidence: f64,
    pub manual: Option<AnchorStatus>,
    pub qr: Option<AnchorStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    floor: i32,
    at: DateTime<Utc>,
}

impl Anchor {
    fn is_fresh(&self, now: DateTime<Utc>, trust: Duration) -> bool {
        now - self.at < trust
    }

    fn status(&self, now: DateTime<Utc>, trust: Duration) -> AnchorStatus {
        AnchorStatus {
            floor: self.floor,
            age_ms: (now - self.at).num_milliseconds(),
            active: self.is_fresh(now, trust),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FloorFusion
// ────────────────────────────────────────────────────────────────────────────

/// Weighted-vote floor state machine.
#[derive(Debug, Clone)]
pub struct FloorFusion {
    config: FusionConfig,
    current_floor: i32,
    confidence: f64,
    manual: Option<Anchor>,
    qr: Option<Anchor>,
}

impl FloorFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            current_floor: config.initial_floor,
            confidence: 0.0,
            manual: None,
            qr: None,
            config,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn current_floor(&self) -> i32 {
        self.current_floor
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Record a visitor-chosen floor and apply it immediately.
    pub fn set_manual_floor(&mut self, floor: i32, now: DateTime<Utc>) -> FusionOutcome {
        self.manual = Some(Anchor { floor, at: now });
        info!(floor, "manual floor set");
        self.apply(floor, 1.0, DecisionSource::Manual)
    }

    /// Record a floor decoded from a QR marker. It takes effect on the next
    /// [`FloorFusion::decide`].
    pub fn observe_qr(&mut self, floor: i32, now: DateTime<Utc>) {
        self.qr = Some(Anchor { floor, at: now });
        debug!(floor, "qr anchor recorded");
    }

    /// Run one fusion pass over the retained `estimates`.
    pub fn decide(&mut self, estimates: &[FloorEstimate], now: DateTime<Utc>) -> FusionOutcome {
        if estimates.is_empty() {
            return FusionOutcome::InsufficientEvidence;
        }

        if let Some(anchor) = self.manual {
            if anchor.is_fresh(now, self.config.manual_trust()) {
                return self.apply(anchor.floor, 1.0, DecisionSource::Manual);
            }
        }

        if let Some(anchor) = self.qr {
            if anchor.is_fresh(now, self.config.qr_trust()) {
                return self.apply(anchor.floor, self.config.qr_confidence, DecisionSource::QrCode);
            }
        }

        let scores = self.scores(estimates);
        match self.select(&scores) {
            Some((floor, confidence)) if confidence > self.config.confidence_threshold => {
                self.apply(floor, confidence, DecisionSource::Composite)
            }
            best => {
                let candidate = best.map(|(floor, _)| floor);
                let confidence = best.map_or(0.0, |(_, c)| c);
                debug!(
                    ?candidate,
                    confidence,
                    threshold = self.config.confidence_threshold,
                    "composite evidence below threshold, floor retained"
                );
                FusionOutcome::BelowThreshold {
                    candidate,
                    confidence,
                }
            }
        }
    }

    /// Accumulated `confidence × weight` per floor.
    pub fn scores(&self, estimates: &[FloorEstimate]) -> BTreeMap<i32, f64> {
        let mut scores = BTreeMap::new();
        for e in estimates {
            *scores.entry(e.floor).or_insert(0.0) +=
                e.confidence * self.config.weights.weight(&e.method);
        }
        scores
    }

    /// Restore the initial floor with zero confidence and drop both anchors.
    pub fn reset(&mut self) {
        self.current_floor = self.config.initial_floor;
        self.confidence = 0.0;
        self.manual = None;
        self.qr = None;
        info!(floor = self.current_floor, "floor fusion reset");
    }

    pub fn status(&self, now: DateTime<Utc>) -> FusionStatus {
        FusionStatus {
            floor: self.current_floor,
            label: floor_label(self.current_floor),
            confidence: self.confidence,
            manual: self
                .manual
                .map(|a| a.status(now, self.config.manual_trust())),
            qr: self.qr.map(|a| a.status(now, self.config.qr_trust())),
        }
    }

    // Highest positive score wins. Equal scores go to the floor nearest the
    // current one, then to the lower floor.
    fn select(&self, scores: &BTreeMap<i32, f64>) -> Option<(i32, f64)> {
        let current = self.current_floor;
        scores
            .iter()
            .filter(|(_, score)| **score > 0.0)
            .max_by(|(fa, sa), (fb, sb)| {
                sa.partial_cmp(sb)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| (**fb - current).abs().cmp(&(**fa - current).abs()))
                    .then_with(|| fb.cmp(fa))
            })
            .map(|(floor, score)| (*floor, score.min(1.0)))
    }

    fn apply(&mut self, floor: i32, confidence: f64, source: DecisionSource) -> FusionOutcome {
        if floor != self.current_floor {
            let change = FloorChange {
                old_floor: self.current_floor,
                new_floor: floor,
                confidence,
                source,
            };
            self.current_floor = floor;
            self.confidence = confidence;
            info!(
                old = %floor_label(change.old_floor),
                new = %floor_label(floor),
                confidence,
                %source,
                "floor changed"
            );
            FusionOutcome::Changed(change)
        } else {
            self.confidence = self.confidence.max(confidence);
            FusionOutcome::Reinforced {
                floor,
                confidence: self.confidence,
                source,
            }
        }
    }
}

impl Default for FloorFusion {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
