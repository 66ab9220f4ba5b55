//! Error types for linkmedic.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed configuration or whitelist. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("whitelist is empty")]
    EmptyWhitelist,

    #[error("invalid action name {0:?}")]
    InvalidActionName(String),

    #[error("action {0:?} has no command templates")]
    NoCommands(String),

    #[error("action {0:?} has no allowed interfaces")]
    NoInterfaces(String),

    #[error("action {action:?} command {index} is empty")]
    EmptyCommand { action: String, index: usize },

    #[error("action {action:?} command {index} must start with an absolute program path")]
    RelativeProgram { action: String, index: usize },

    #[error("action {action:?} command {index} must contain exactly one {{iface}} argument, found {found}")]
    Placeholder {
        action: String,
        index: usize,
        found: usize,
    },

    #[error("action {action:?} command {index} embeds {{iface}} inside argument {arg:?}")]
    EmbeddedPlaceholder {
        action: String,
        index: usize,
        arg: String,
    },

    #[error("action {action:?} allows invalid interface name {interface:?}")]
    InvalidInterface { action: String, interface: String },

    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}

/// Why the executor refused to build or run an action
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    #[error("action {0:?} is not in the whitelist")]
    UnknownAction(String),

    #[error("interface {interface:?} is not allowed for action {action:?}")]
    InterfaceNotAllowed { action: String, interface: String },
}

/// Failure writing or reading the audit trail
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("audit serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure running one privileged command step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} was terminated by a signal")]
    Signaled { program: String },

    #[error("empty command")]
    EmptyCommand,
}
