//! Per-sensor floor estimators.
//!
//! Each estimator turns readings that a platform layer has already parsed
//! (an altitude in metres, a downlink/RTT pair, a vertical acceleration
//! sample, a QR payload string) into a [`FloorEstimate`] for the
//! [`EstimateCollector`][crate::collector::EstimateCollector]. None of them
//! talks to hardware.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wayfind_types::{EstimateMethod, FloorEstimate};

/// Standard gravity subtracted from raw vertical acceleration.
pub const GRAVITY: f64 = 9.81;

// ────────────────────────────────────────────────────────────────────────────
// Altitude
// ────────────────────────────────────────────────────────────────────────────

/// Maps altitude readings onto floors relative to a calibrated baseline.
///
/// The baseline is the mean of the calibration samples and is taken to be
/// `base_floor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltitudeFloorEstimator {
    pub altitude_per_floor: f64,
    pub base_floor: i32,
    baseline: Option<f64>,
}

impl Default for AltitudeFloorEstimator {
    fn default() -> Self {
        Self::new(3.5, 1)
    }
}

impl AltitudeFloorEstimator {
    pub fn new(altitude_per_floor: f64, base_floor: i32) -> Self {
        Self {
            altitude_per_floor,
            base_floor,
            baseline: None,
        }
    }

    /// Set the baseline to the mean of the finite `samples`. Returns the new
    /// baseline, or `None` (leaving any previous baseline) when no sample is
    /// usable.
    pub fn calibrate(&mut self, samples: &[f64]) -> Option<f64> {
        let usable: Vec<f64> = samples.iter().copied().filter(|s| s.is_finite()).collect();
        if usable.is_empty() {
            return None;
        }
        let mean = usable.iter().sum::<f64>() / usable.len() as f64;
        self.baseline = Some(mean);
        debug!(baseline = mean, samples = usable.len(), "altitude baseline calibrated");
        Some(mean)
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Confidence for a reported vertical accuracy in metres. An unknown or
    /// non-positive accuracy scores 0.5.
    pub fn accuracy_confidence(accuracy: Option<f64>) -> f64 {
        match accuracy {
            Some(a) if a.is_finite() && a > 0.0 => {
                if a < 5.0 {
                    0.8
                } else if a < 10.0 {
                    0.6
                } else if a < 20.0 {
                    0.4
                } else {
                    0.2
                }
            }
            _ => 0.5,
        }
    }

    /// Floor estimate for `altitude`, or `None` before calibration.
    pub fn estimate(
        &self,
        altitude: f64,
        accuracy: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<FloorEstimate> {
        let baseline = self.baseline?;
        if !altitude.is_finite() || self.altitude_per_floor <= 0.0 {
            return None;
        }
        let offset = ((altitude - baseline) / self.altitude_per_floor).round() as i32;
        Some(FloorEstimate::new(
            EstimateMethod::Barometric,
            self.base_floor + offset,
            Self::accuracy_confidence(accuracy),
            now,
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Network quality
// ────────────────────────────────────────────────────────────────────────────

/// Coarse floor guess from connection quality: the lobby has the best
/// coverage, upper floors less, the basement the worst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkQualityEstimator {
    pub confidence: f64,
}

impl Default for NetworkQualityEstimator {
    fn default() -> Self {
        Self { confidence: 0.5 }
    }
}

impl NetworkQualityEstimator {
    /// `downlink_mbps` and `rtt_ms` as reported by the platform. Readings in
    /// the ambiguous middle band produce no estimate.
    pub fn estimate(
        &self,
        downlink_mbps: f64,
        rtt_ms: f64,
        now: DateTime<Utc>,
    ) -> Option<FloorEstimate> {
        let floor = if downlink_mbps > 10.0 && rtt_ms < 50.0 {
            1
        } else if downlink_mbps > 5.0 && rtt_ms < 100.0 {
            2
        } else if downlink_mbps < 3.0 || rtt_ms > 150.0 {
            -1
        } else {
            return None;
        };
        Some(FloorEstimate::new(EstimateMethod::Wifi, floor, self.confidence, now))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vertical motion
// ────────────────────────────────────────────────────────────────────────────

/// Double-integrates vertical acceleration to detect whole-floor moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalMotionIntegrator {
    pub floor_height: f64,
    /// Seconds between samples.
    pub sample_period: f64,
    /// Velocity multiplier applied after each detected move.
    pub damping: f64,
    pub confidence: f64,
    pub min_floor: i32,
    pub max_floor: i32,
    velocity: f64,
    displacement: f64,
}

impl Default for VerticalMotionIntegrator {
    fn default() -> Self {
        Self::new(3.5)
    }
}

impl VerticalMotionIntegrator {
    /// Integrator at rest for storeys `floor_height` apart, sampled every
    /// 0.1 s, accepting moves onto floors -1 to 3.
    pub fn new(floor_height: f64) -> Self {
        Self {
            floor_height,
            sample_period: 0.1,
            damping: 0.8,
            confidence: 0.6,
            min_floor: -1,
            max_floor: 3,
            velocity: 0.0,
            displacement: 0.0,
        }
    }

    /// Feed one raw vertical acceleration sample (gravity included).
    /// Returns a floor delta once the accumulated displacement exceeds one
    /// floor height.
    pub fn push(&mut self, accel_z: f64) -> Option<i32> {
        if !accel_z.is_finite() {
            return None;
        }
        self.velocity += (accel_z - GRAVITY) * self.sample_period;
        self.displacement += self.velocity * self.sample_period;

        if self.displacement.abs() > self.floor_height {
            let delta = (self.displacement / self.floor_height).round() as i32;
            self.displacement = 0.0;
            self.velocity *= self.damping;
            return Some(delta);
        }
        None
    }

    /// Feed a sample and, on a detected move, produce an accelerometer
    /// estimate for `current_floor + delta` if that floor is plausible.
    pub fn estimate(
        &mut self,
        accel_z: f64,
        current_floor: i32,
        now: DateTime<Utc>,
    ) -> Option<FloorEstimate> {
        let delta = self.push(accel_z)?;
        let floor = current_floor + delta;
        if floor < self.min_floor || floor > self.max_floor {
            debug!(current_floor, delta, "implausible vertical move ignored");
            return None;
        }
        Some(FloorEstimate::new(EstimateMethod::Accelerometer, floor, self.confidence, now))
    }

    pub fn displacement(&self) -> f64 {
        self.displacement
    }

    pub fn reset(&mut self) {
        self.velocity = 0.0;
        self.displacement = 0.0;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// QR markers
// ────────────────────────────────────────────────────────────────────────────

static QR_FLOOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)floor[:\-_](\d+|B\d+)").ok());

/// Extract the floor from a QR marker payload such as `ryokan/floor:2` or
/// `FLOOR-B1`. Basement floors `B<n>` map to `-n`.
///
/// ```rust
/// use wayfind_perception::parse_qr_floor;
///
/// assert_eq!(parse_qr_floor("https://example.test/?floor_2"), Some(2));
/// assert_eq!(parse_qr_floor("floor:B1"), Some(-1));
/// assert_eq!(parse_qr_floor("room 204"), None);
/// ```
pub fn parse_qr_floor(payload: &str) -> Option<i32> {
    let captures = QR_FLOOR.as_ref()?.captures(payload)?;
    let token = captures.get(1)?.as_str();
    match token.strip_prefix(['B', 'b']) {
        Some(digits) => digits.parse::<i32>().ok().map(|n| -n),
        None => token.parse::<i32>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn altitude_needs_calibration() {
        let mut est = AltitudeFloorEstimator::default();
        assert!(est.estimate(50.0, Some(3.0), Utc::now()).is_none());

        assert_eq!(est.calibrate(&[49.0, 51.0, f64::NAN]), Some(50.0));
        let e = est.estimate(53.6, Some(3.0), Utc::now()).unwrap();
        assert_eq!(e.floor, 2);
        assert_eq!(e.confidence, 0.8);
        assert_eq!(e.method, EstimateMethod::Barometric);

        let below = est.estimate(46.4, None, Utc::now()).unwrap();
        assert_eq!(below.floor, 0);
        assert_eq!(below.confidence, 0.5);
    }

    #[test]
    fn calibration_without_samples_keeps_baseline() {
        let mut est = AltitudeFloorEstimator::default();
        est.calibrate(&[10.0]);
        assert_eq!(est.calibrate(&[]), None);
        assert_eq!(est.baseline(), Some(10.0));
    }

    #[test]
    fn altitude_confidence_bands() {
        assert_eq!(AltitudeFloorEstimator::accuracy_confidence(Some(4.9)), 0.8);
        assert_eq!(AltitudeFloorEstimator::accuracy_confidence(Some(5.0)), 0.6);
        assert_eq!(AltitudeFloorEstimator::accuracy_confidence(Some(19.0)), 0.4);
        assert_eq!(AltitudeFloorEstimator::accuracy_confidence(Some(25.0)), 0.2);
        assert_eq!(AltitudeFloorEstimator::accuracy_confidence(Some(0.0)), 0.5);
        assert_eq!(AltitudeFloorEstimator::accuracy_confidence(None), 0.5);
    }

    #[test]
    fn network_quality_bands() {
        let net = NetworkQualityEstimator::default();
        let now = Utc::now();
        assert_eq!(net.estimate(20.0, 30.0, now).map(|e| e.floor), Some(1));
        assert_eq!(net.estimate(8.0, 80.0, now).map(|e| e.floor), Some(2));
        assert_eq!(net.estimate(2.0, 60.0, now).map(|e| e.floor), Some(-1));
        assert_eq!(net.estimate(8.0, 200.0, now).map(|e| e.floor), Some(-1));
        assert!(net.estimate(4.0, 120.0, now).is_none());
        assert_eq!(net.estimate(20.0, 30.0, now).unwrap().confidence, 0.5);
    }

    #[test]
    fn sustained_lift_registers_one_floor() {
        let mut motion = VerticalMotionIntegrator::default();
        let mut deltas = Vec::new();
        // 1 m/s² upward for 3 s: displacement reaches 3.5 m within the window.
        for _ in 0..30 {
            if let Some(d) = motion.push(GRAVITY + 1.0) {
                deltas.push(d);
            }
        }
        assert_eq!(deltas, vec![1]);
        assert!(motion.displacement() > 0.0);
    }

    #[test]
    fn stationary_device_never_moves() {
        let mut motion = VerticalMotionIntegrator::default();
        for _ in 0..1_000 {
            assert_eq!(motion.push(GRAVITY), None);
        }
    }

    #[test]
    fn implausible_floor_is_dropped() {
        let mut motion = VerticalMotionIntegrator::default();
        let now = Utc::now();
        let mut produced = Vec::new();
        for _ in 0..30 {
            if let Some(e) = motion.estimate(GRAVITY + 1.0, 3, now) {
                produced.push(e);
            }
        }
        assert!(produced.is_empty());

        motion.reset();
        for _ in 0..30 {
            if let Some(e) = motion.estimate(GRAVITY + 1.0, 1, now) {
                produced.push(e);
            }
        }
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].floor, 2);
        assert_eq!(produced[0].confidence, 0.6);
    }

    #[test]
    fn qr_payloads() {
        assert_eq!(parse_qr_floor("floor:2"), Some(2));
        assert_eq!(parse_qr_floor("FLOOR-1"), Some(1));
        assert_eq!(parse_qr_floor("marker?floor_B1&room=3"), Some(-1));
        assert_eq!(parse_qr_floor("floor:b2"), Some(-2));
        assert_eq!(parse_qr_floor("floor 2"), None);
        assert_eq!(parse_qr_floor(""), None);
    }
}
