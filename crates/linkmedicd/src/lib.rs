//! linkmedicd - link health monitor and remediation daemon
//!
//! Library half of the daemon so the pipeline can be driven from
//! integration tests with stub oracles and fake command runners.

pub mod gate;
pub mod oracle;
pub mod orchestrator;
pub mod sampler;

pub use gate::{DecisionGate, GateOutcome, Verdict};
pub use oracle::{DecisionOracle, DiagnosisOracle, Oracle, OracleError};
pub use orchestrator::{CycleOutcome, LoopSettings, Orchestrator};
pub use sampler::{HostSampler, MetricsSource};
