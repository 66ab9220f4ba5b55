//! Core data model shared by the daemon and the control CLI.
//!
//! Everything here is plain data: a metrics snapshot, the oracle's diagnosis,
//! and the remediation decision. None of these types perform I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Action name meaning "do nothing"
pub const NO_ACTION: &str = "none";

/// Operational state of a network interface as exposed by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Up,
    Down,
    Dormant,
    Unknown,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
            LinkState::Dormant => "dormant",
            LinkState::Unknown => "unknown",
        }
    }

    /// Map a raw `operstate` value onto the closed set of states.
    ///
    /// `lowerlayerdown` is treated as down; anything unrecognised is unknown.
    pub fn from_operstate(raw: &str) -> Self {
        match raw.trim() {
            "up" => LinkState::Up,
            "down" | "lowerlayerdown" => LinkState::Down,
            "dormant" => LinkState::Dormant,
            _ => LinkState::Unknown,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One health snapshot of a single interface. Created fresh every poll tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub interface: String,
    pub link_state: LinkState,
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    pub signal_dbm: i32,
}

impl Metrics {
    pub fn new(
        interface: impl Into<String>,
        link_state: LinkState,
        rx_mbps: f64,
        tx_mbps: f64,
        signal_dbm: i32,
    ) -> Self {
        Self {
            interface: interface.into(),
            link_state,
            rx_mbps: rx_mbps.max(0.0),
            tx_mbps: tx_mbps.max(0.0),
            signal_dbm,
        }
    }
}

/// Kind of fault the oracle believes it has found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    None,
    InterfaceDown,
    WifiRxDegraded,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::None => "none",
            IssueType::InterfaceDown => "interface_down",
            IssueType::WifiRxDegraded => "wifi_rx_degraded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Structured diagnosis produced by a diagnosis oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub issue_detected: bool,
    pub issue_type: IssueType,
    pub severity: Severity,
}

impl Diagnosis {
    /// A diagnosis stating that nothing is wrong
    pub fn healthy() -> Self {
        Self {
            issue_detected: false,
            issue_type: IssueType::None,
            severity: Severity::None,
        }
    }

    pub fn issue(issue_type: IssueType, severity: Severity) -> Self {
        Self {
            issue_detected: true,
            issue_type,
            severity,
        }
    }
}

/// Remediation decision: a whitelisted action name (or `"none"`) plus the
/// oracle's confidence.
///
/// `confidence` is always within `[0.0, 1.0]`; every constructor clamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: String,
    pub confidence: f64,
}

impl Decision {
    /// Build a decision, clamping a missing or out-of-range confidence.
    pub fn new(action: impl Into<String>, confidence: Option<f64>) -> Self {
        Self {
            action: action.into(),
            confidence: clamp_confidence(confidence),
        }
    }

    /// The forced no-op decision used when no issue was diagnosed
    pub fn no_action() -> Self {
        Self::new(NO_ACTION, Some(1.0))
    }

    pub fn is_no_action(&self) -> bool {
        self.action == NO_ACTION
    }
}

impl<'de> Deserialize<'de> for Decision {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            action: String,
            #[serde(default)]
            confidence: Option<f64>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(Decision::new(raw.action, raw.confidence))
    }
}

/// Clamp a confidence into `[0.0, 1.0]`. Absent and NaN become 0.0.
pub fn clamp_confidence(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_nan() => 0.0,
        Some(v) => v.clamp(0.0, 1.0),
        None => 0.0,
    }
}
