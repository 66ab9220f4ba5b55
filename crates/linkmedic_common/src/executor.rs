//! Secure Executor - the only path that mutates host state
//!
//! Flow for one `execute` call:
//! 1. Validate action + interface against the whitelist (exact match)
//! 2. Build the argument vectors, wrapped in a non-interactive `sudo -n`
//! 3. Append an `intent` audit record (no record, no execution)
//! 4. Dry-run: log the commands and stop. Otherwise run each step in order
//!    with a timeout; the first failure aborts the remaining steps
//! 5. Append exactly one `action_outcome` audit record
//!
//! Steps are not transactional. A two-step reset that fails after step one
//! leaves step one's effect in place.

use crate::audit::{AuditEvent, AuditLog};
use crate::error::{ExecError, Refusal};
use crate::whitelist::{ActionSpec, ActionWhitelist};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

/// Default per-step timeout in seconds
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;

/// Default privilege wrapper
pub const DEFAULT_SUDO_PATH: &str = "/usr/bin/sudo";

/// Exit code recorded for refusals and invocation errors
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// Maximum stderr captured into an outcome detail
const MAX_STDERR_CHARS: usize = 512;

/// Result of one command that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub exit_code: i32,
    pub stderr: String,
}

/// Runs a single argument vector. Never goes through a shell.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<StepOutput, ExecError>;
}

/// Runs commands on the real host via `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<StepOutput, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExecError::Spawn {
                    program: program.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ExecError::Timeout {
                    program: program.clone(),
                    secs: timeout.as_secs(),
                })
            }
        };

        let exit_code = output.status.code().ok_or_else(|| ExecError::Signaled {
            program: program.clone(),
        })?;

        Ok(StepOutput {
            exit_code,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Scripted result for [`FakeRunner`]
#[derive(Debug, Clone)]
pub enum FakeStep {
    Exit(i32),
    Fail(ExecError),
}

/// Command runner for tests: records every invocation, runs nothing
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    script: Arc<Mutex<VecDeque<FakeStep>>>,
}

impl FakeRunner {
    /// A runner where every step exits 0
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// A runner that replays `steps` in order, then exits 0
    pub fn scripted(steps: Vec<FakeStep>) -> Self {
        Self {
            calls: Arc::default(),
            script: Arc::new(Mutex::new(steps.into())),
        }
    }

    /// Every argument vector passed to `run`, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, argv: &[String], _timeout: Duration) -> Result<StepOutput, ExecError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(argv.to_vec());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            None | Some(FakeStep::Exit(0)) => Ok(StepOutput {
                exit_code: 0,
                stderr: String::new(),
            }),
            Some(FakeStep::Exit(code)) => Ok(StepOutput {
                exit_code: code,
                stderr: format!("exit {}", code),
            }),
            Some(FakeStep::Fail(e)) => Err(e),
        }
    }
}

/// Executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Log commands without running them
    #[serde(default)]
    pub dry_run: bool,

    /// Privilege wrapper; empty runs commands directly (daemon already root)
    #[serde(default = "default_sudo")]
    pub sudo_path: String,

    /// Per-step timeout in seconds
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
}

fn default_sudo() -> String {
    DEFAULT_SUDO_PATH.to_string()
}

fn default_step_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            sudo_path: default_sudo(),
            step_timeout_secs: default_step_timeout(),
        }
    }
}

/// What happened in one `execute` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: String,
    pub interface: String,
    pub success: bool,
    pub exit_code: i32,
    pub detail: Option<String>,
    pub steps_completed: usize,
    pub steps_total: usize,
}

impl ActionOutcome {
    fn refused(action: &str, interface: &str, detail: String) -> Self {
        Self {
            action: action.to_string(),
            interface: interface.to_string(),
            success: false,
            exit_code: SENTINEL_EXIT_CODE,
            detail: Some(detail),
            steps_completed: 0,
            steps_total: 0,
        }
    }

    fn into_event(self, reason: &str) -> AuditEvent {
        AuditEvent::ActionOutcome {
            action: self.action,
            interface: self.interface,
            success: self.success,
            exit_code: self.exit_code,
            reason: reason.to_string(),
            detail: self.detail,
            steps_completed: self.steps_completed,
            steps_total: self.steps_total,
        }
    }
}

/// Whitelist-constrained executor
pub struct SecureExecutor {
    whitelist: ActionWhitelist,
    audit: AuditLog,
    runner: Box<dyn CommandRunner>,
    settings: ExecutorSettings,
}

impl SecureExecutor {
    /// Executor that runs real host commands
    pub fn new(whitelist: ActionWhitelist, audit: AuditLog, settings: ExecutorSettings) -> Self {
        Self::with_runner(whitelist, audit, settings, Box::new(SystemRunner))
    }

    pub fn with_runner(
        whitelist: ActionWhitelist,
        audit: AuditLog,
        settings: ExecutorSettings,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            whitelist,
            audit,
            runner,
            settings,
        }
    }

    pub fn whitelist(&self) -> &ActionWhitelist {
        &self.whitelist
    }

    pub fn is_dry_run(&self) -> bool {
        self.settings.dry_run
    }

    /// Check an action/interface pair without running anything
    pub fn validate(&self, action: &str, interface: &str) -> Result<&ActionSpec, Refusal> {
        self.whitelist.validate(action, interface)
    }

    /// Validated argument vectors, including the privilege wrapper
    pub fn build_commands(
        &self,
        action: &str,
        interface: &str,
    ) -> Result<Vec<Vec<String>>, Refusal> {
        let commands = self.whitelist.build_commands(action, interface)?;
        Ok(commands
            .into_iter()
            .map(|argv| {
                if self.settings.sudo_path.is_empty() {
                    argv
                } else {
                    [self.settings.sudo_path.clone(), "-n".to_string()]
                        .into_iter()
                        .chain(argv)
                        .collect()
                }
            })
            .collect())
    }

    /// Run a whitelisted action against an interface.
    ///
    /// Always writes exactly one `action_outcome` record.
    pub async fn execute(&self, action: &str, interface: &str, reason: &str) -> ActionOutcome {
        let commands = match self.build_commands(action, interface) {
            Ok(c) => c,
            Err(refusal) => {
                warn!("Refused: {}", refusal);
                let outcome = ActionOutcome::refused(action, interface, refusal.to_string());
                self.record_outcome(outcome.clone(), reason).await;
                return outcome;
            }
        };

        let intent = AuditEvent::Intent {
            action: action.to_string(),
            interface: interface.to_string(),
            commands: commands.clone(),
            reason: reason.to_string(),
        };
        if let Err(e) = self.audit.append(intent).await {
            error!("Cannot record intent for {}, not executing: {}", action, e);
            let outcome =
                ActionOutcome::refused(action, interface, format!("audit unavailable: {}", e));
            self.record_outcome(outcome.clone(), reason).await;
            return outcome;
        }

        let steps_total = commands.len();
        let outcome = if self.settings.dry_run {
            for argv in &commands {
                info!("DRY RUN: {}", argv.join(" "));
            }
            ActionOutcome {
                action: action.to_string(),
                interface: interface.to_string(),
                success: true,
                exit_code: 0,
                detail: Some("dry run".to_string()),
                steps_completed: 0,
                steps_total,
            }
        } else {
            self.run_steps(action, interface, &commands).await
        };

        if outcome.success {
            info!("Action {} on {} succeeded", action, interface);
        } else {
            warn!(
                "Action {} on {} failed after {}/{} steps: {}",
                action,
                interface,
                outcome.steps_completed,
                outcome.steps_total,
                outcome.detail.as_deref().unwrap_or("unknown error")
            );
        }

        self.record_outcome(outcome.clone(), reason).await;
        outcome
    }

    async fn run_steps(
        &self,
        action: &str,
        interface: &str,
        commands: &[Vec<String>],
    ) -> ActionOutcome {
        let timeout = Duration::from_secs(self.settings.step_timeout_secs);
        let steps_total = commands.len();
        let mut outcome = ActionOutcome {
            action: action.to_string(),
            interface: interface.to_string(),
            success: true,
            exit_code: 0,
            detail: None,
            steps_completed: 0,
            steps_total,
        };

        for (i, argv) in commands.iter().enumerate() {
            info!("Running step {}/{}: {}", i + 1, steps_total, argv.join(" "));
            match self.runner.run(argv, timeout).await {
                Ok(out) if out.exit_code == 0 => outcome.steps_completed += 1,
                Ok(out) => {
                    outcome.success = false;
                    outcome.exit_code = out.exit_code;
                    outcome.detail = Some(format!(
                        "step {}/{} exited with code {}: {}",
                        i + 1,
                        steps_total,
                        out.exit_code,
                        truncate(&out.stderr)
                    ));
                    break;
                }
                Err(e) => {
                    error!("Step {}/{} failed: {}", i + 1, steps_total, e);
                    outcome.success = false;
                    outcome.exit_code = SENTINEL_EXIT_CODE;
                    outcome.detail = Some(format!("step {}/{}: {}", i + 1, steps_total, e));
                    break;
                }
            }
        }

        outcome
    }

    async fn record_outcome(&self, outcome: ActionOutcome, reason: &str) {
        if let Err(e) = self.audit.append(outcome.into_event(reason)).await {
            error!("Failed to record action outcome: {}", e);
        }
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_STDERR_CHARS {
        s.to_string()
    } else {
        s.chars().take(MAX_STDERR_CHARS).collect::<String>() + "..."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditRecord;
    use tempfile::TempDir;

    fn setup(dry_run: bool, runner: FakeRunner) -> (SecureExecutor, AuditLog, TempDir) {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.jsonl"));
        let settings = ExecutorSettings {
            dry_run,
            ..ExecutorSettings::default()
        };
        let executor = SecureExecutor::with_runner(
            ActionWhitelist::builtin(),
            audit.clone(),
            settings,
            Box::new(runner),
        );
        (executor, audit, dir)
    }

    fn kinds(records: &[AuditRecord]) -> Vec<&'static str> {
        records.iter().map(|r| r.event.kind()).collect()
    }

    #[test]
    fn test_commands_are_wrapped_in_sudo() {
        let (executor, _audit, _dir) = setup(true, FakeRunner::succeeding());
        let cmds = executor.build_commands("wifi_reset", "wlP9s9").unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(
            cmds[0],
            vec!["/usr/bin/sudo", "-n", "/usr/sbin/ip", "link", "set", "wlP9s9", "down"]
        );
        assert_eq!(cmds[1][5], "wlP9s9");
    }

    #[test]
    fn test_no_sudo_when_unset() {
        let dir = TempDir::new().unwrap();
        let executor = SecureExecutor::new(
            ActionWhitelist::builtin(),
            AuditLog::new(dir.path().join("a.jsonl")),
            ExecutorSettings {
                sudo_path: String::new(),
                ..ExecutorSettings::default()
            },
        );
        let cmds = executor.build_commands("wifi_up", "wlP9s9").unwrap();
        assert_eq!(cmds[0][0], "/usr/sbin/ip");
    }

    #[tokio::test]
    async fn test_dry_run_succeeds_without_invocations() {
        let runner = FakeRunner::succeeding();
        let (executor, audit, _dir) = setup(true, runner.clone());

        let outcome = executor.execute("wifi_reset", "wlP9s9", "test").await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(runner.call_count(), 0);

        let records = audit.read_all().unwrap();
        assert_eq!(kinds(&records), vec!["intent", "action_outcome"]);
    }

    #[tokio::test]
    async fn test_dry_run_intent_matches_real_intent() {
        let (dry, dry_audit, _d1) = setup(true, FakeRunner::succeeding());
        let (real, real_audit, _d2) = setup(false, FakeRunner::succeeding());

        dry.execute("wifi_reset", "wlP9s9", "same reason").await;
        real.execute("wifi_reset", "wlP9s9", "same reason").await;

        let dry_intent = dry_audit.read_all().unwrap().remove(0).event;
        let real_intent = real_audit.read_all().unwrap().remove(0).event;
        assert_eq!(dry_intent, real_intent);
    }

    #[tokio::test]
    async fn test_real_exec_runs_each_step_in_order() {
        let runner = FakeRunner::succeeding();
        let (executor, audit, _dir) = setup(false, runner.clone());

        let outcome = executor.execute("wifi_reset", "wlP9s9", "test").await;
        assert!(outcome.success);
        assert_eq!(outcome.steps_completed, 2);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].last().unwrap(), "down");
        assert_eq!(calls[1].last().unwrap(), "up");

        let records = audit.read_all().unwrap();
        assert_eq!(kinds(&records), vec!["intent", "action_outcome"]);
    }

    #[tokio::test]
    async fn test_disallowed_action_refused_without_intent() {
        let runner = FakeRunner::succeeding();
        let (executor, audit, _dir) = setup(false, runner.clone());

        let outcome = executor.execute("evil_command", "wlP9s9", "test").await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, SENTINEL_EXIT_CODE);
        assert_eq!(runner.call_count(), 0);

        let records = audit.read_all().unwrap();
        assert_eq!(kinds(&records), vec!["action_outcome"]);
        match &records[0].event {
            AuditEvent::ActionOutcome {
                success, exit_code, ..
            } => {
                assert!(!success);
                assert_eq!(*exit_code, -1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_injected_interface_never_reaches_runner() {
        let runner = FakeRunner::succeeding();
        let (executor, _audit, _dir) = setup(false, runner.clone());

        let outcome = executor
            .execute("wifi_reset", "wlP9s9; rm -rf /", "test")
            .await;
        assert!(!outcome.success);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_first_step_failure_aborts_sequence() {
        let runner = FakeRunner::scripted(vec![FakeStep::Exit(2)]);
        let (executor, audit, _dir) = setup(false, runner.clone());

        let outcome = executor.execute("wifi_reset", "wlP9s9", "test").await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, 2);
        assert_eq!(outcome.steps_completed, 0);
        assert_eq!(runner.call_count(), 1);

        let records = audit.read_all().unwrap();
        assert_eq!(kinds(&records), vec!["intent", "action_outcome"]);
    }

    #[tokio::test]
    async fn test_second_step_failure_leaves_first_in_place() {
        let runner = FakeRunner::scripted(vec![
            FakeStep::Exit(0),
            FakeStep::Fail(ExecError::Timeout {
                program: "/usr/bin/sudo".to_string(),
                secs: 30,
            }),
        ]);
        let (executor, _audit, _dir) = setup(false, runner.clone());

        let outcome = executor.execute("wifi_reset", "wlP9s9", "test").await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, SENTINEL_EXIT_CODE);
        assert_eq!(outcome.steps_completed, 1);
        assert!(outcome.detail.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unwritable_audit_blocks_execution() {
        let dir = TempDir::new().unwrap();
        // A regular file where the audit directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let audit = AuditLog::new(blocker.join("audit.jsonl"));

        let runner = FakeRunner::succeeding();
        let executor = SecureExecutor::with_runner(
            ActionWhitelist::builtin(),
            audit,
            ExecutorSettings::default(),
            Box::new(runner.clone()),
        );

        let outcome = executor.execute("wifi_reset", "wlP9s9", "test").await;
        assert!(!outcome.success);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_system_runner_reports_exit_codes() {
        let runner = SystemRunner;
        let ok = runner
            .run(&["/bin/sh".into(), "-c".into(), "exit 0".into()], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ok.exit_code, 0);

        let fail = runner
            .run(&["/bin/sh".into(), "-c".into(), "exit 3".into()], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(fail.exit_code, 3);
    }

    #[tokio::test]
    async fn test_system_runner_timeout() {
        let err = SystemRunner
            .run(&["/bin/sleep".into(), "5".into()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let err = SystemRunner
            .run(&["/nonexistent/linkmedic-test".into()], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[test]
    fn test_truncate_long_stderr() {
        let long = "x".repeat(MAX_STDERR_CHARS + 10);
        assert!(truncate(&long).ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }
}
