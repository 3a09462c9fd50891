use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use wlan_health_monitor::config::{AppConfig, ConfigLoader, LogFormat};
use wlan_health_monitor::history::{HistoryStore, ReportKind};
use wlan_health_monitor::logging::init_subscriber;
use wlan_health_monitor::monitor::Monitor;
use wlan_health_monitor::report::build_report;
use wlan_health_monitor::source::FixtureSource;

#[derive(Parser)]
#[command(name = "wlan-health")]
#[command(about = "Wireless network health monitor with day-over-day trends", long_about = None)]
struct Cli {
    /// Environment file to read before the process environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    keep_days: Option<u32>,
    #[arg(long, global = true)]
    org_id: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single monitoring cycle and print the digest
    Run {
        #[arg(long)]
        fixtures: Option<PathBuf>,
        /// Write the markdown digest here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also keep this snapshot in history as a summary report
        #[arg(long)]
        summary: bool,
    },
    /// Run monitoring cycles on an interval until interrupted
    Daemon {
        #[arg(long)]
        fixtures: Option<PathBuf>,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Compare today's latest snapshot with an earlier day
    Compare {
        #[arg(long)]
        days_ago: Option<u32>,
    },
    /// Summarize stored history
    History {
        /// Export every stored snapshot to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Remove history buckets past the retention window
    Cleanup,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let loader = match &self.env_file {
            Some(path) => ConfigLoader::with_env_file(path),
            None => ConfigLoader::new(),
        };
        let mut config = loader.load().context("failed to load configuration")?;

        if let Some(dir) = &self.history_dir {
            config.history_dir = dir.clone();
        }
        if let Some(days) = self.keep_days {
            config.keep_days = days;
        }
        if let Some(org) = &self.org_id {
            config.organization_id = org.clone();
        }
        if self.json_logs {
            config.log_format = LogFormat::Json;
        }
        match &self.command {
            Commands::Run { fixtures, .. } | Commands::Daemon { fixtures, .. } => {
                if let Some(dir) = fixtures {
                    config.fixtures_dir = Some(dir.clone());
                }
            }
            _ => {}
        }
        if let Commands::Daemon {
            interval_secs: Some(secs),
            ..
        } = self.command
        {
            config.interval_secs = secs;
        }
        if let Commands::Compare {
            days_ago: Some(days),
        } = self.command
        {
            config.compare_days_ago = days;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn build_monitor(config: &AppConfig) -> anyhow::Result<Monitor<FixtureSource>> {
    let fixtures = config.fixtures_dir.clone().context(
        "no data source configured; pass --fixtures or set WLAN_HEALTH_FIXTURES_DIR",
    )?;
    let thresholds = config
        .threshold_table()
        .context("invalid severity thresholds")?;
    let history = HistoryStore::new(&config.history_dir, config.keep_days);
    let source = FixtureSource::new(fixtures);
    info!(fixtures = %source.root().display(), "reading platform data from fixtures");
    Ok(Monitor::new(source, thresholds, history, config.organization_id.clone())
        .with_compare_days_ago(config.compare_days_ago)
        .with_window(chrono::Duration::hours(i64::from(config.window_hours)))
        .with_metrics(config.sle_metrics.clone())
        .with_trend_engine(config.trend_engine()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_subscriber(&config);

    let store = HistoryStore::new(&config.history_dir, config.keep_days);

    match cli.command {
        Commands::Run { out, summary, .. } => {
            let monitor = build_monitor(&config)?;
            let outcome = monitor.run_cycle().await;
            if summary {
                if let Some(path) = store.save(&outcome.snapshot, ReportKind::SummaryReport) {
                    println!("Summary report saved to {}.", path.display());
                }
            }
            let report = build_report(&outcome.snapshot, &outcome.trends, &outcome.breakdown);
            match out {
                Some(path) => {
                    std::fs::write(&path, report)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{report}"),
            }
        }
        Commands::Daemon { .. } => {
            let monitor = Arc::new(build_monitor(&config)?);
            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, finishing current cycle");
                    signal_token.cancel();
                }
            });

            let cycles = monitor
                .run_daemon(
                    Duration::from_secs(config.interval_secs),
                    shutdown,
                    |outcome| {
                        println!(
                            "{} {} ({} sites, trend {})",
                            outcome.snapshot.timestamp.to_rfc3339(),
                            outcome.snapshot.overall_status(),
                            outcome.snapshot.total_sites,
                            outcome.trends.overall_trend
                        );
                    },
                )
                .await;
            println!("Stopped after {cycles} cycles.");
        }
        Commands::Compare { .. } => {
            let now = Utc::now();
            let current = store
                .try_load_previous_at(0, now)
                .context("failed to read today's history")?
                .context("no snapshot saved today; run a cycle first")?;
            let previous = store
                .try_load_previous_at(config.compare_days_ago, now)
                .with_context(|| {
                    format!("failed to read history from {} days ago", config.compare_days_ago)
                })?;
            let trends = config.trend_engine().compare(&current, previous.as_ref());
            println!("{}", serde_json::to_string_pretty(&trends)?);
        }
        Commands::History { csv } => {
            let summary = store.summary().context("failed to read history")?;
            if summary.total_days == 0 {
                println!("No history stored in {}.", store.root().display());
            } else {
                println!(
                    "{} days ({}), {} snapshots",
                    summary.total_days,
                    summary.date_range.as_deref().unwrap_or("-"),
                    summary.report_count
                );
                for date in &summary.dates {
                    println!("- {date}");
                }
            }
            if let Some(path) = csv {
                let rows = store
                    .export_csv(&path)
                    .with_context(|| format!("failed to export {}", path.display()))?;
                println!("Exported {rows} snapshots to {}.", path.display());
            }
        }
        Commands::Cleanup => {
            let removed = store
                .try_cleanup_at(Utc::now())
                .context("history cleanup failed")?;
            println!("Removed {removed} expired history buckets.");
        }
    }

    Ok(())
}
