//! Subcommand implementations

use anyhow::{Context, Result};
use linkmedic_common::{
    ActionOutcome, ActionWhitelist, AuditEvent, AuditLog, AuditRecord, Config, SecureExecutor,
};
use owo_colors::OwoColorize;
use std::path::Path;

/// Reason recorded for actions started from the command line
const MANUAL_REASON: &str = "manual";

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

fn load_whitelist(config: &Config) -> Result<ActionWhitelist> {
    ActionWhitelist::load_or_builtin(config.daemon.whitelist_path.as_deref())
        .context("Failed to load action whitelist")
}

/// Interface given on the command line, else the one the daemon monitors
pub fn target_interface(config: &Config, requested: Option<String>) -> String {
    requested.unwrap_or_else(|| config.daemon.interface.clone())
}

/// Run one action through the secure executor. Returns whether it succeeded.
pub async fn action(config: &Config, name: &str, interface: &str, dry_run: bool) -> Result<bool> {
    let whitelist = load_whitelist(config)?;
    let mut settings = config.executor.clone();
    settings.dry_run |= dry_run;

    let audit = AuditLog::new(config.audit_path());
    let executor = SecureExecutor::new(whitelist, audit, settings);

    if executor.is_dry_run() {
        if let Ok(commands) = executor.build_commands(name, interface) {
            println!("{}", "Dry run, commands that would run:".yellow());
            for argv in commands {
                println!("  {}", argv.join(" ").dimmed());
            }
        }
    }

    let outcome = executor.execute(name, interface, MANUAL_REASON).await;
    print_outcome(&outcome);
    Ok(outcome.success)
}

fn print_outcome(outcome: &ActionOutcome) {
    let status = if outcome.success {
        "OK".green().bold().to_string()
    } else {
        "FAILED".red().bold().to_string()
    };
    println!(
        "{} {} on {} (exit {}, {}/{} steps)",
        status,
        outcome.action,
        outcome.interface,
        outcome.exit_code,
        outcome.steps_completed,
        outcome.steps_total
    );
    if let Some(detail) = &outcome.detail {
        println!("  {}", detail.dimmed());
    }
}

pub fn list_actions(config: &Config) -> Result<()> {
    let whitelist = load_whitelist(config)?;

    for spec in whitelist.iter() {
        println!("{}", spec.name.cyan().bold());
        println!("  {}", spec.description);
        let interfaces: Vec<&str> = spec.allowed_interfaces().iter().map(String::as_str).collect();
        println!("  {} {}", "interfaces:".dimmed(), interfaces.join(", "));
        for (i, template) in spec.commands().iter().enumerate() {
            println!("  {} {}", format!("{}.", i + 1).dimmed(), template.display());
        }
        println!();
    }
    Ok(())
}

pub fn audit(config: &Config, last: usize, json: bool) -> Result<()> {
    let log = AuditLog::new(config.audit_path());
    if !log.path().exists() {
        println!("No audit trail at {}", log.path().display());
        return Ok(());
    }

    let records = log
        .tail(last)
        .with_context(|| format!("Failed to read {}", log.path().display()))?;

    for record in &records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!("{}", summarize(record));
        }
    }
    Ok(())
}

fn summarize(record: &AuditRecord) -> String {
    let ts = record.ts.format("%Y-%m-%d %H:%M:%S").to_string();
    let body = match &record.event {
        AuditEvent::Intent {
            action,
            interface,
            commands,
            reason,
        } => format!(
            "{} {} on {} ({} commands) reason={:?}",
            "intent  ".blue(),
            action,
            interface,
            commands.len(),
            reason
        ),
        AuditEvent::Decision {
            diagnosis,
            decision,
            reasoning,
        } => format!(
            "{} {} -> {} ({:.2}) {:?}",
            "decision".magenta(),
            diagnosis.issue_type.as_str(),
            decision.action,
            decision.confidence,
            reasoning
        ),
        AuditEvent::ActionOutcome {
            action,
            interface,
            success,
            exit_code,
            steps_completed,
            steps_total,
            ..
        } => {
            let status = if *success {
                "ok".green().to_string()
            } else {
                "failed".red().to_string()
            };
            format!(
                "{} {} on {} {} exit={} steps={}/{}",
                "outcome ".yellow(),
                action,
                interface,
                status,
                exit_code,
                steps_completed,
                steps_total
            )
        }
    };
    format!("{} {}", ts.dimmed(), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkmedic_common::{Decision, Diagnosis};

    #[test]
    fn test_target_interface_follows_config() {
        let mut config = Config::default();
        config.daemon.interface = "wlan0".to_string();

        assert_eq!(target_interface(&config, None), "wlan0");
        assert_eq!(
            target_interface(&config, Some("wlan1".to_string())),
            "wlan1"
        );
    }

    #[test]
    fn test_summarize_decision() {
        let record = AuditRecord::now(AuditEvent::Decision {
            diagnosis: Diagnosis::healthy(),
            decision: Decision::no_action(),
            reasoning: "No issue".to_string(),
        });
        let line = summarize(&record);
        assert!(line.contains("none"));
        assert!(line.contains("\"No issue\""));
    }

    #[test]
    fn test_summarize_outcome() {
        let record = AuditRecord::now(AuditEvent::ActionOutcome {
            action: "wifi_reset".to_string(),
            interface: "wlP9s9".to_string(),
            success: false,
            exit_code: -1,
            reason: "manual".to_string(),
            detail: None,
            steps_completed: 0,
            steps_total: 2,
        });
        let line = summarize(&record);
        assert!(line.contains("wifi_reset"));
        assert!(line.contains("exit=-1"));
        assert!(line.contains("steps=0/2"));
    }
}
