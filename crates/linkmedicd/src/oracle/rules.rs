//! Deterministic rule-based oracle.
//!
//! Same heuristics as the anomaly detector, plus a fixed remediation choice.
//! Useful on hosts without a local model and as a reproducible baseline.

use super::{DecisionOracle, DiagnosisOracle, OracleError};
use async_trait::async_trait;
use linkmedic_common::{
    classify, Anomaly, Decision, Diagnosis, IssueType, Metrics, Severity, Thresholds,
};

/// Preferred remediation for every known issue
const RESET_ACTION: &str = "wifi_reset";

/// Confidence reported for rule-based decisions
const RULE_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct RuleOracle {
    thresholds: Thresholds,
}

impl RuleOracle {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl DiagnosisOracle for RuleOracle {
    async fn diagnose(
        &self,
        metrics: &Metrics,
        _known_issues: &str,
    ) -> Result<Diagnosis, OracleError> {
        Ok(match classify(metrics, &self.thresholds) {
            Some(Anomaly::LinkNotUp(_)) => {
                Diagnosis::issue(IssueType::InterfaceDown, Severity::Critical)
            }
            Some(Anomaly::AsymmetricStall { .. }) => {
                Diagnosis::issue(IssueType::WifiRxDegraded, Severity::Critical)
            }
            None => Diagnosis::healthy(),
        })
    }
}

#[async_trait]
impl DecisionOracle for RuleOracle {
    async fn decide(
        &self,
        diagnosis: &Diagnosis,
        allowed_actions: &[String],
    ) -> Result<(Decision, String), OracleError> {
        if !diagnosis.issue_detected {
            return Ok((Decision::no_action(), "No issue".to_string()));
        }

        if allowed_actions.iter().any(|a| a == RESET_ACTION) {
            Ok((
                Decision::new(RESET_ACTION, Some(RULE_CONFIDENCE)),
                format!(
                    "{} ({}): interface reset is the known recovery",
                    diagnosis.issue_type.as_str(),
                    diagnosis.severity.as_str()
                ),
            ))
        } else {
            Ok((
                Decision::new(linkmedic_common::NO_ACTION, Some(RULE_CONFIDENCE)),
                format!("{} is not allowed on this host", RESET_ACTION),
            ))
        }
    }
}
