//! Orchestrator - the fixed-interval remediation loop.
//!
//! One cycle: sample -> detect -> (anomalous) diagnose -> gate ->
//! (authorized) execute. Cycles never overlap. Shutdown is checked between
//! cycles; only the sleep is interruptible.

use crate::gate::{DecisionGate, Verdict};
use crate::oracle::{bounded, Oracle};
use crate::sampler::MetricsSource;
use linkmedic_common::{
    classify, ActionOutcome, AuditLog, Config, ConfigError, SecureExecutor, Thresholds,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Loop parameters resolved from `Config`
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interface: String,
    pub poll_interval: Duration,
    pub thresholds: Thresholds,
    pub known_issues: String,
    pub oracle_timeout: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            interface: config.daemon.interface.clone(),
            poll_interval: config.poll_interval()?,
            thresholds: config.detector,
            known_issues: config.oracle.known_issues.clone(),
            oracle_timeout: Duration::from_secs(config.oracle.timeout_secs),
        })
    }
}

/// What a single cycle ended with
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Detector found nothing; oracle not consulted
    Healthy,
    /// Oracle diagnosed no issue; forced `none` decision recorded
    NoIssue,
    /// Diagnosis or decision call failed; cycle abandoned
    OracleFailed(String),
    /// Gate refused (no action, low confidence, audit unavailable)
    NotAuthorized(Verdict),
    /// Gate refused because the action ran here too recently
    CoolingDown(Duration),
    Executed(ActionOutcome),
}

pub struct Orchestrator {
    settings: LoopSettings,
    sampler: Box<dyn MetricsSource>,
    oracle: Arc<dyn Oracle>,
    gate: DecisionGate,
    executor: SecureExecutor,
    audit: AuditLog,
}

impl Orchestrator {
    pub fn new(
        settings: LoopSettings,
        sampler: Box<dyn MetricsSource>,
        oracle: Arc<dyn Oracle>,
        gate: DecisionGate,
        executor: SecureExecutor,
        audit: AuditLog,
    ) -> Self {
        Self {
            settings,
            sampler,
            oracle,
            gate,
            executor,
            audit,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Whitelisted actions that may target the monitored interface
    fn allowed_actions(&self) -> Vec<String> {
        self.executor
            .whitelist()
            .iter()
            .filter(|spec| spec.allowed_interfaces().contains(&self.settings.interface))
            .map(|spec| spec.name.clone())
            .collect()
    }

    /// Run one full cycle. Never panics and never returns an error: every
    /// failure ends the cycle with an outcome instead.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let interface = self.settings.interface.clone();
        let metrics = self.sampler.sample(&interface).await;
        debug!(
            "Sample: state={} rx={:.1} tx={:.1} signal={}",
            metrics.link_state, metrics.rx_mbps, metrics.tx_mbps, metrics.signal_dbm
        );

        let anomaly = match classify(&metrics, &self.settings.thresholds) {
            Some(anomaly) => anomaly,
            None => return CycleOutcome::Healthy,
        };
        warn!("Anomaly on {:?}: {}", interface, anomaly);

        let diagnosis = match bounded(
            self.settings.oracle_timeout,
            self.oracle.diagnose(&metrics, &self.settings.known_issues),
        )
        .await
        {
            Ok(d) => d,
            Err(e) => {
                error!("Diagnosis failed: {}", e);
                return CycleOutcome::OracleFailed(e.to_string());
            }
        };
        info!(
            "Diagnosis: issue={} type={} severity={}",
            diagnosis.issue_detected,
            diagnosis.issue_type.as_str(),
            diagnosis.severity.as_str()
        );

        let allowed = self.allowed_actions();
        let outcome = match self
            .gate
            .evaluate(&diagnosis, &interface, self.oracle.as_ref(), &allowed, &self.audit)
            .await
        {
            Ok(o) => o,
            Err(e) => {
                error!("Decision failed: {}", e);
                return CycleOutcome::OracleFailed(e.to_string());
            }
        };

        match outcome.verdict {
            Verdict::Authorized => {}
            Verdict::NoAction if !diagnosis.issue_detected => return CycleOutcome::NoIssue,
            Verdict::CoolingDown(left) => {
                info!(
                    "{} on {:?} cooling down for {}s",
                    outcome.decision.action,
                    interface,
                    left.as_secs()
                );
                return CycleOutcome::CoolingDown(left);
            }
            other => return CycleOutcome::NotAuthorized(other),
        }

        // Only whitelisted pairs start a cooldown; refusals are audited by the executor
        if self
            .executor
            .validate(&outcome.decision.action, &interface)
            .is_ok()
        {
            self.gate.record_attempt(&outcome.decision.action, &interface);
        }
        let result = self
            .executor
            .execute(&outcome.decision.action, &interface, &outcome.reasoning)
            .await;
        if result.success {
            info!("Remediation {} succeeded", result.action);
        } else {
            warn!(
                "Remediation {} failed (exit {}, {}/{} steps)",
                result.action, result.exit_code, result.steps_completed, result.steps_total
            );
        }
        CycleOutcome::Executed(result)
    }

    /// Loop until `shutdown` flips to true or its sender is dropped
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Monitoring {:?} every {:.1}s",
            self.settings.interface,
            self.settings.poll_interval.as_secs_f64()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.run_cycle().await;
            debug!("Cycle finished: {:?}", outcome);

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Monitor loop stopped");
    }
}
