//! Anomaly detection over a single metrics snapshot.
//!
//! Two fault patterns are recognised:
//! - the link is not operationally up (down, dormant or unknown)
//! - an asymmetric stall: receive rate stuck low while transmit stays healthy
//!
//! Symmetric low throughput (both directions slow) is a weak-signal condition,
//! not a driver fault, and is deliberately not flagged.

use crate::types::{LinkState, Metrics};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_RX_THRESHOLD: f64 = 10.0;
pub const DEFAULT_RATIO_THRESHOLD: f64 = 10.0;

/// Floor applied to the receive rate before computing the tx/rx ratio
const RX_FLOOR_MBPS: f64 = 0.1;

/// Detector thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Receive rate (Mbit/s) below which the ratio check applies
    #[serde(default = "default_rx_threshold")]
    pub rx_threshold: f64,

    /// tx/rx ratio above which a low receive rate is anomalous
    #[serde(default = "default_ratio_threshold")]
    pub ratio_threshold: f64,
}

fn default_rx_threshold() -> f64 {
    DEFAULT_RX_THRESHOLD
}

fn default_ratio_threshold() -> f64 {
    DEFAULT_RATIO_THRESHOLD
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rx_threshold: DEFAULT_RX_THRESHOLD,
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
        }
    }
}

/// Reason a snapshot was classified as anomalous
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anomaly {
    LinkNotUp(LinkState),
    AsymmetricStall { ratio: f64 },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::LinkNotUp(state) => write!(f, "state={}", state),
            Anomaly::AsymmetricStall { ratio } => write!(f, "TX/RX={:.1}", ratio),
        }
    }
}

/// Classify a snapshot, returning why it is anomalous (if it is).
pub fn classify(metrics: &Metrics, thresholds: &Thresholds) -> Option<Anomaly> {
    if metrics.link_state != LinkState::Up {
        return Some(Anomaly::LinkNotUp(metrics.link_state));
    }

    if metrics.rx_mbps < thresholds.rx_threshold && metrics.tx_mbps > 0.0 {
        let ratio = metrics.tx_mbps / metrics.rx_mbps.max(RX_FLOOR_MBPS);
        if ratio > thresholds.ratio_threshold {
            return Some(Anomaly::AsymmetricStall { ratio });
        }
    }

    None
}

/// Return true if the snapshot matches a configured fault heuristic.
pub fn detect(metrics: &Metrics, rx_threshold: f64, ratio_threshold: f64) -> bool {
    classify(
        metrics,
        &Thresholds {
            rx_threshold,
            ratio_threshold,
        },
    )
    .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: LinkState, rx: f64, tx: f64) -> Metrics {
        Metrics::new("wlP9s9", state, rx, tx, -45)
    }

    #[test]
    fn test_interface_down_is_anomaly() {
        let m = snapshot(LinkState::Down, 0.0, 0.0);
        assert!(detect(&m, 10.0, 10.0));
    }

    #[test]
    fn test_healthy_no_anomaly() {
        let m = snapshot(LinkState::Up, 500.0, 500.0);
        assert!(!detect(&m, 10.0, 10.0));
    }

    #[test]
    fn test_rx_stall_detected() {
        // RX stuck at 6 Mbit/s while TX is normal
        let m = snapshot(LinkState::Up, 6.0, 258.0);
        assert!(detect(&m, 10.0, 10.0));

        match classify(&m, &Thresholds::default()) {
            Some(Anomaly::AsymmetricStall { ratio }) => assert!((ratio - 43.0).abs() < 0.01),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_low_rx_low_tx_no_anomaly() {
        let m = snapshot(LinkState::Up, 5.0, 5.0);
        assert!(!detect(&m, 10.0, 10.0));
    }

    #[test]
    fn test_dormant_and_unknown_are_anomalies_regardless_of_rates() {
        assert!(detect(&snapshot(LinkState::Dormant, 500.0, 500.0), 10.0, 10.0));
        assert!(detect(&snapshot(LinkState::Unknown, 500.0, 500.0), 10.0, 10.0));
    }

    #[test]
    fn test_zero_rx_uses_floor() {
        // tx 2 / floor 0.1 = 20 > 10
        let m = snapshot(LinkState::Up, 0.0, 2.0);
        assert!(detect(&m, 10.0, 10.0));

        // tx 0.5 / floor 0.1 = 5, not above 10
        let m = snapshot(LinkState::Up, 0.0, 0.5);
        assert!(!detect(&m, 10.0, 10.0));
    }

    #[test]
    fn test_zero_tx_never_stalls() {
        let m = snapshot(LinkState::Up, 0.0, 0.0);
        assert!(!detect(&m, 10.0, 10.0));
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let m = snapshot(LinkState::Up, 6.0, 258.0);
        assert!(!detect(&m, 5.0, 10.0));
        assert!(!detect(&m, 10.0, 50.0));
    }

    #[test]
    fn test_ratio_must_strictly_exceed() {
        let m = snapshot(LinkState::Up, 5.0, 50.0);
        assert!(!detect(&m, 10.0, 10.0));
    }

    #[test]
    fn test_anomaly_display() {
        assert_eq!(Anomaly::LinkNotUp(LinkState::Down).to_string(), "state=down");
        assert_eq!(
            Anomaly::AsymmetricStall { ratio: 43.0 }.to_string(),
            "TX/RX=43.0"
        );
    }
}
