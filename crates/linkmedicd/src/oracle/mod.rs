//! Diagnosis and decision oracles.
//!
//! The daemon never decides on its own what is wrong or what to do about it.
//! It asks an oracle through two narrow capabilities and treats every answer
//! as untrusted input: the gate and the executor still have the final word.

pub mod ollama;
pub mod rules;

use async_trait::async_trait;
use linkmedic_common::config::{OracleBackend, OracleConfig};
use linkmedic_common::{Decision, Diagnosis, Metrics, Thresholds};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaOracle;
pub use rules::RuleOracle;

/// An oracle call that produced nothing usable
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("oracle timed out after {0} seconds")]
    Timeout(u64),

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error("invalid JSON from oracle: {0}")]
    InvalidJson(String),

    #[error("unusable oracle answer: {0}")]
    Unusable(String),
}

/// Maps metrics to a structured diagnosis
#[async_trait]
pub trait DiagnosisOracle: Send + Sync {
    async fn diagnose(&self, metrics: &Metrics, known_issues: &str)
        -> Result<Diagnosis, OracleError>;
}

/// Maps a diagnosis to a proposed decision plus its reasoning
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(
        &self,
        diagnosis: &Diagnosis,
        allowed_actions: &[String],
    ) -> Result<(Decision, String), OracleError>;
}

/// Both capabilities behind one object
pub trait Oracle: DiagnosisOracle + DecisionOracle {}

impl<T: DiagnosisOracle + DecisionOracle> Oracle for T {}

/// Bound an oracle call; a stalled oracle must not stall the daemon
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, OracleError>
where
    F: Future<Output = Result<T, OracleError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(limit.as_secs())),
    }
}

/// Build the configured oracle backend
pub fn from_config(
    config: &OracleConfig,
    thresholds: Thresholds,
) -> Result<Arc<dyn Oracle>, OracleError> {
    match config.backend {
        OracleBackend::Ollama => Ok(Arc::new(OllamaOracle::new(config)?)),
        OracleBackend::Rules => Ok(Arc::new(RuleOracle::new(thresholds))),
    }
}
