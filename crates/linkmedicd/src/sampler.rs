//! Metrics sampler - reads interface state and wireless link statistics.
//!
//! Neither read may fail the cycle. An unreadable operstate becomes
//! `unknown`; a failed or timed-out `iw` query becomes zero throughput with
//! a worst-case signal, which the detector then treats as a possible fault.

use async_trait::async_trait;
use linkmedic_common::config::SamplerConfig;
use linkmedic_common::{LinkState, Metrics};
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Signal reported when no measurement is available
pub const SIGNAL_SENTINEL_DBM: i32 = -100;

/// Source of metrics snapshots
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self, interface: &str) -> Metrics;
}

/// Link statistics parsed from `iw dev <iface> link`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkStats {
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    pub signal_dbm: i32,
}

impl LinkStats {
    pub fn unavailable() -> Self {
        Self {
            rx_mbps: 0.0,
            tx_mbps: 0.0,
            signal_dbm: SIGNAL_SENTINEL_DBM,
        }
    }
}

fn rx_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"rx bitrate:\s+([\d.]+)").expect("static regex"))
}

fn tx_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"tx bitrate:\s+([\d.]+)").expect("static regex"))
}

fn signal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"signal:\s+(-?\d+)").expect("static regex"))
}

/// Parse `iw dev <iface> link` output. Missing fields take the sentinels.
pub fn parse_iw_link(output: &str) -> LinkStats {
    let capture = |re: &Regex| {
        re.captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    LinkStats {
        rx_mbps: capture(rx_re())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0),
        tx_mbps: capture(tx_re())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0),
        signal_dbm: capture(signal_re())
            .and_then(|s| s.parse().ok())
            .unwrap_or(SIGNAL_SENTINEL_DBM),
    }
}

/// Samples the real host via sysfs and `iw`
#[derive(Debug, Clone)]
pub struct HostSampler {
    sysfs_root: PathBuf,
    iw_path: String,
    timeout: Duration,
}

impl HostSampler {
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            sysfs_root: config.sysfs_root.clone(),
            iw_path: config.iw_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Operational state from `<sysfs_root>/<iface>/operstate`
    pub async fn read_state(&self, interface: &str) -> LinkState {
        if interface.is_empty() || interface.contains('/') || interface.starts_with('.') {
            warn!("Refusing to read operstate for {:?}", interface);
            return LinkState::Unknown;
        }

        let path = self.sysfs_root.join(interface).join("operstate");
        match timeout(self.timeout, tokio::fs::read_to_string(&path)).await {
            Ok(Ok(raw)) => LinkState::from_operstate(&raw),
            Ok(Err(e)) => {
                debug!("Cannot read {}: {}", path.display(), e);
                LinkState::Unknown
            }
            Err(_) => {
                warn!("Timed out reading {}", path.display());
                LinkState::Unknown
            }
        }
    }

    /// Link statistics via `iw dev <iface> link`, bounded by the timeout
    pub async fn read_link(&self, interface: &str) -> LinkStats {
        let query = Command::new(&self.iw_path)
            .args(["dev", interface, "link"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match timeout(self.timeout, query).await {
            Ok(Ok(output)) => parse_iw_link(&String::from_utf8_lossy(&output.stdout)),
            Ok(Err(e)) => {
                warn!("Link query failed: {}", e);
                LinkStats::unavailable()
            }
            Err(_) => {
                warn!("Link query timed out after {}s", self.timeout.as_secs());
                LinkStats::unavailable()
            }
        }
    }
}

#[async_trait]
impl MetricsSource for HostSampler {
    async fn sample(&self, interface: &str) -> Metrics {
        let state = self.read_state(interface).await;
        let link = self.read_link(interface).await;
        Metrics::new(
            interface,
            state,
            link.rx_mbps,
            link.tx_mbps,
            link.signal_dbm,
        )
    }
}
