//! linkmedic common - shared types, whitelist, executor and audit trail
//!
//! Everything that both the daemon and the control CLI need. The executor in
//! this crate is the only code in the workspace that runs host-mutating
//! commands.

pub mod audit;
pub mod config;
pub mod cooldown;
pub mod detector;
pub mod error;
pub mod executor;
pub mod types;
pub mod whitelist;

pub use audit::{AuditEvent, AuditLog, AuditRecord};
pub use config::Config;
pub use cooldown::CooldownTracker;
pub use detector::{classify, detect, Anomaly, Thresholds};
pub use error::{AuditError, ConfigError, ExecError, Refusal};
pub use executor::{ActionOutcome, CommandRunner, ExecutorSettings, SecureExecutor};
pub use types::*;
pub use whitelist::{ActionSpec, ActionWhitelist};
