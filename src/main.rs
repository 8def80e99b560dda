//! jericho CLI: replay actions against a planning snapshot.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use jericho::config::KernelConfig;
use jericho::kernel::replay;
use jericho::persist::{load_actions, load_snapshot, save_snapshot};
use jericho::time::DayKey;

#[derive(Parser)]
#[command(name = "jericho", version, about = "Deterministic goal-execution planner")]
struct Cli {
    /// Kernel config (TOML). Defaults apply when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a JSON array of actions to a snapshot and write it back.
    Replay {
        /// Snapshot file; created when missing.
        #[arg(long)]
        snapshot: PathBuf,

        /// JSON file holding the actions to apply in order.
        #[arg(long)]
        actions: PathBuf,

        /// Write the result here instead of over the input snapshot.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the active cycle's calendar for one day.
    Materialize {
        #[arg(long)]
        snapshot: PathBuf,

        /// Day-key (YYYY-MM-DD); defaults to the snapshot's current day.
        #[arg(long)]
        day: Option<String>,
    },

    /// Print goal reports and the learning profile.
    Report {
        #[arg(long)]
        snapshot: PathBuf,
    },

    /// Manage the kernel config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config.
    Init {
        #[arg(long, default_value = "jericho.toml")]
        path: PathBuf,
    },
    /// Print the effective config as TOML.
    Show,
}

fn load_config(path: Option<&Path>) -> Result<KernelConfig> {
    match path {
        Some(path) => Ok(KernelConfig::load(path)?),
        None => Ok(KernelConfig::default()),
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            snapshot,
            actions,
            out,
        } => {
            let state = load_snapshot(&snapshot)?;
            let actions = load_actions(&actions)?;
            let next = replay(&state, &actions, &config);
            for denial in &next.denials {
                println!("{}: {}", denial.code, denial.detail);
            }
            let target = out.unwrap_or(snapshot);
            save_snapshot(&target, &next)?;
            println!("Applied {} actions; snapshot written to {}", actions.len(), target.display());
        }

        Commands::Materialize { snapshot, day } => {
            let state = load_snapshot(&snapshot)?;
            let blocks = match day {
                Some(raw) => {
                    let day = DayKey::parse(&raw)?;
                    state.materialized.day(day).to_vec()
                }
                None => state.materialized.today_blocks.clone(),
            };
            if blocks.is_empty() {
                println!("No blocks.");
            }
            for block in &blocks {
                println!(
                    "{}  {}  {:>4}m  {:?}  {}",
                    block.start.format("%Y-%m-%d %H:%M"),
                    block.id,
                    block.minutes(),
                    block.status,
                    block.label,
                );
            }
        }

        Commands::Report { snapshot } => {
            let state = load_snapshot(&snapshot)?;
            let json = serde_json::to_string_pretty(&serde_json::json!({
                "reports": state.reports,
                "learning": state.learning,
            }))
            .into_diagnostic()?;
            println!("{json}");
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { path } => {
                KernelConfig::default().save(&path)?;
                println!("Wrote default config to {}", path.display());
            }
            ConfigAction::Show => {
                let toml = toml::to_string_pretty(&config).into_diagnostic()?;
                println!("{toml}");
            }
        },
    }

    Ok(())
}
