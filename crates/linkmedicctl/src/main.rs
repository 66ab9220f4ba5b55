//! linkmedicctl - manual control of the link remediation agent
//!
//! Runs whitelisted actions by hand and inspects the audit trail. Manual
//! actions go through the same executor and audit trail as the daemon.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "linkmedicctl")]
#[command(about = "Control and inspect the linkmedic remediation agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one whitelisted action now
    Action {
        /// Action name (see list-actions)
        name: String,

        /// Target interface (defaults to the configured one)
        #[arg(short, long)]
        interface: Option<String>,

        /// Show the commands without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// List whitelisted actions
    ListActions,

    /// Show recent audit records
    Audit {
        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 20)]
        last: usize,

        /// Print raw JSON lines
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Action {
            name,
            interface,
            dry_run,
        } => {
            let interface = commands::target_interface(&config, interface);
            let ok = commands::action(&config, &name, &interface, dry_run).await?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::ListActions => commands::list_actions(&config),
        Commands::Audit { last, json } => commands::audit(&config, last, json),
    }
}
