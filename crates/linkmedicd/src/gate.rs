//! Decision gate - decides whether a proposed remediation may run.
//!
//! Order of operations for one evaluation:
//! 1. No issue diagnosed -> forced `none` decision, decision oracle skipped
//! 2. Otherwise ask the decision oracle (bounded by a timeout, never retried)
//! 3. Append one `decision` audit record
//! 4. Authorize only if action != none, confidence > threshold, and the
//!    action/interface pair is outside its cooldown window

use crate::oracle::{bounded, DecisionOracle, OracleError};
use linkmedic_common::config::GateConfig;
use linkmedic_common::{AuditEvent, AuditLog, CooldownTracker, Decision, Diagnosis};
use std::time::Duration;
use tracing::{error, info};

/// Gate verdict for one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Authorized,
    /// Decision was `none`
    NoAction,
    /// Confidence did not exceed the threshold
    LowConfidence,
    /// Same action ran on the same interface too recently
    CoolingDown(Duration),
    /// The decision record could not be written; fail closed
    AuditUnavailable,
}

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub decision: Decision,
    pub reasoning: String,
    pub verdict: Verdict,
}

impl GateOutcome {
    pub fn is_authorized(&self) -> bool {
        self.verdict == Verdict::Authorized
    }
}

/// The confidence rule on its own: a real action, strictly above threshold
pub fn passes_threshold(decision: &Decision, threshold: f64) -> bool {
    !decision.is_no_action() && decision.confidence > threshold
}

pub struct DecisionGate {
    confidence_threshold: f64,
    oracle_timeout: Duration,
    cooldown: CooldownTracker,
}

impl DecisionGate {
    pub fn new(config: &GateConfig, oracle_timeout: Duration) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            oracle_timeout,
            cooldown: CooldownTracker::new(Duration::from_secs(config.cooldown_secs)),
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Evaluate a diagnosis for `interface`.
    ///
    /// An `Err` means the decision oracle failed; nothing was recorded and the
    /// caller should abandon the cycle.
    pub async fn evaluate<D>(
        &self,
        diagnosis: &Diagnosis,
        interface: &str,
        decider: &D,
        allowed_actions: &[String],
        audit: &AuditLog,
    ) -> Result<GateOutcome, OracleError>
    where
        D: DecisionOracle + ?Sized,
    {
        let (decision, reasoning) = if diagnosis.issue_detected {
            bounded(
                self.oracle_timeout,
                decider.decide(diagnosis, allowed_actions),
            )
            .await?
        } else {
            (Decision::no_action(), "No issue".to_string())
        };

        let record = AuditEvent::Decision {
            diagnosis: diagnosis.clone(),
            decision: decision.clone(),
            reasoning: reasoning.clone(),
        };
        if let Err(e) = audit.append(record).await {
            error!("Failed to record decision, refusing to authorize: {}", e);
            return Ok(GateOutcome {
                decision,
                reasoning,
                verdict: Verdict::AuditUnavailable,
            });
        }

        let verdict = self.verdict(&decision, interface);
        info!(
            "Decision: action={} confidence={:.2} verdict={:?}",
            decision.action, decision.confidence, verdict
        );

        Ok(GateOutcome {
            decision,
            reasoning,
            verdict,
        })
    }

    fn verdict(&self, decision: &Decision, interface: &str) -> Verdict {
        if decision.is_no_action() {
            return Verdict::NoAction;
        }
        if !passes_threshold(decision, self.confidence_threshold) {
            return Verdict::LowConfidence;
        }
        match self.cooldown.remaining(&decision.action, interface) {
            Some(left) => Verdict::CoolingDown(left),
            None => Verdict::Authorized,
        }
    }

    /// Start the cooldown window for an action that is about to run
    pub fn record_attempt(&mut self, action: &str, interface: &str) {
        self.cooldown.record(action, interface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use linkmedic_common::{IssueType, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedDecider {
        decision: Decision,
        calls: AtomicUsize,
    }

    impl FixedDecider {
        fn new(action: &str, confidence: f64) -> Self {
            Self {
                decision: Decision::new(action, Some(confidence)),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DecisionOracle for FixedDecider {
        async fn decide(
            &self,
            _diagnosis: &Diagnosis,
            _allowed: &[String],
        ) -> Result<(Decision, String), OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.decision.clone(), "fixed".to_string()))
        }
    }

    struct FailingDecider;

    #[async_trait]
    impl DecisionOracle for FailingDecider {
        async fn decide(
            &self,
            _diagnosis: &Diagnosis,
            _allowed: &[String],
        ) -> Result<(Decision, String), OracleError> {
            Err(OracleError::EmptyResponse)
        }
    }

    fn gate(threshold: f64, cooldown_secs: u64) -> DecisionGate {
        DecisionGate::new(
            &GateConfig {
                confidence_threshold: threshold,
                cooldown_secs,
            },
            Duration::from_secs(5),
        )
    }

    fn issue() -> Diagnosis {
        Diagnosis::issue(IssueType::WifiRxDegraded, Severity::Critical)
    }

    fn allowed() -> Vec<String> {
        vec!["wifi_reset".to_string()]
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!passes_threshold(&Decision::new("wifi_reset", Some(0.7)), 0.7));
        assert!(passes_threshold(&Decision::new("wifi_reset", Some(0.71)), 0.7));
        assert!(!passes_threshold(&Decision::no_action(), 0.7));
    }

    #[tokio::test]
    async fn test_no_issue_skips_decider() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.jsonl"));
        let decider = FixedDecider::new("wifi_reset", 0.99);

        let outcome = gate(0.7, 300)
            .evaluate(&Diagnosis::healthy(), "wlP9s9", &decider, &allowed(), &audit)
            .await
            .unwrap();

        assert_eq!(outcome.decision, Decision::no_action());
        assert_eq!(outcome.verdict, Verdict::NoAction);
        assert_eq!(decider.calls.load(Ordering::SeqCst), 0);

        let records = audit.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event.kind(), "decision");
    }

    #[tokio::test]
    async fn test_confident_decision_authorized() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.jsonl"));
        let decider = FixedDecider::new("wifi_reset", 0.9);

        let outcome = gate(0.7, 300)
            .evaluate(&issue(), "wlP9s9", &decider, &allowed(), &audit)
            .await
            .unwrap();
        assert!(outcome.is_authorized());
        assert_eq!(outcome.reasoning, "fixed");
    }

    #[tokio::test]
    async fn test_low_confidence_not_authorized_but_recorded() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.jsonl"));
        let decider = FixedDecider::new("wifi_reset", 0.7);

        let outcome = gate(0.7, 300)
            .evaluate(&issue(), "wlP9s9", &decider, &allowed(), &audit)
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::LowConfidence);
        assert_eq!(audit.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_repeat() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.jsonl"));
        let decider = FixedDecider::new("wifi_reset", 0.9);
        let mut gate = gate(0.7, 300);

        let first = gate
            .evaluate(&issue(), "wlP9s9", &decider, &allowed(), &audit)
            .await
            .unwrap();
        assert!(first.is_authorized());
        gate.record_attempt("wifi_reset", "wlP9s9");

        let second = gate
            .evaluate(&issue(), "wlP9s9", &decider, &allowed(), &audit)
            .await
            .unwrap();
        assert!(matches!(second.verdict, Verdict::CoolingDown(_)));
        assert_eq!(audit.read_all().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oracle_failure_propagates_without_record() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.jsonl"));

        let result = gate(0.7, 300)
            .evaluate(&issue(), "wlP9s9", &FailingDecider, &allowed(), &audit)
            .await;
        assert_eq!(result.unwrap_err(), OracleError::EmptyResponse);
        assert!(audit.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_audit_fails_closed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let audit = AuditLog::new(blocker.join("audit.jsonl"));
        let decider = FixedDecider::new("wifi_reset", 0.99);

        let outcome = gate(0.7, 0)
            .evaluate(&issue(), "wlP9s9", &decider, &allowed(), &audit)
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::AuditUnavailable);
        assert!(!outcome.is_authorized());
    }
}
