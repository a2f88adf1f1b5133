// =============================================================================
// Shadow Scanner - Main Entry Point
// =============================================================================
//
// Shadow mode only: the scanner ranks and sizes candidates and writes an audit
// report. No orders are ever placed.
//
//   shadow-scanner scan --watchlist watchlist.txt --topn 5
//   shadow-scanner evaluate --outcomes outcomes.json --granularity week
//   shadow-scanner init-config --config scan_config.json
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod allocation;
mod config;
mod decision_envelope;
mod error;
mod evaluation;
mod factors;
mod pipeline;
mod providers;
mod ranker;
mod regime;
mod risk;
mod signals;
mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ScanConfig;
use crate::evaluation::{EvaluationAggregator, PeriodGranularity, RealizedOutcome};
use crate::pipeline::{ReportStore, ScanOrchestrator, ScanRequest, ScanRun};
use crate::providers::{build_market_provider, build_news_provider};

#[derive(Debug, Parser)]
#[command(name = "shadow-scanner", version, about = "Risk-gated stock candidate scanner (shadow mode)")]
struct Cli {
    /// JSON config file (policy + settings).
    #[arg(long, global = true, default_value = "scan_config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one scan and persist its report.
    Scan {
        /// One symbol per line; blank lines and `#` comments are ignored.
        #[arg(long)]
        watchlist: PathBuf,
        /// Number of recommendations to keep (capped by max_positions).
        #[arg(long, default_value_t = 5)]
        topn: usize,
        /// Currently held symbols, same format as the watchlist.
        #[arg(long)]
        holdings: Option<PathBuf>,
    },
    /// Aggregate realized outcomes against persisted reports.
    Evaluate {
        /// JSON array of realized outcomes.
        #[arg(long)]
        outcomes: PathBuf,
        /// Number of most recent reports to consider.
        #[arg(long, default_value_t = 30)]
        lookback: usize,
        #[arg(long, value_enum, default_value_t = PeriodGranularity::Week)]
        granularity: PeriodGranularity,
        /// Buckets with fewer matched samples report no statistics.
        #[arg(long, default_value_t = 1)]
        min_samples: usize,
    },
    /// Write the default config to `--config` so it can be edited.
    InitConfig {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn read_symbol_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read symbol file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn print_summary(run: &ScanRun) {
    let report = &run.report;
    println!(
        "run {} [{}] regime={} ({:+.1}) report={}",
        report.run_id,
        report.status,
        report.regime.regime,
        report.regime.adjustment,
        run.report_path.display()
    );
    for d in report.diagnostics.iter().chain(std::iter::once(&run.persist_diagnostic)) {
        println!(
            "  {:<16} {:<9} {:>8.1} ms  {}",
            d.stage.as_str(),
            format!("{:?}", d.status).to_lowercase(),
            d.duration_ms,
            d.error.as_deref().or(d.note.as_deref()).unwrap_or("")
        );
    }
    if let Some(stage) = report.failed_stage {
        let cause = report
            .diagnostic(stage)
            .and_then(|d| d.error.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        println!("run failed at {stage}: {cause}");
        return;
    }
    if report.recommendations.is_empty() {
        println!("no candidate passed the gates");
    }
    for (rec, alloc) in report.recommendations.iter().zip(&report.allocation.allocations) {
        println!(
            "  #{} {:<10} score {:>6.2}  weight {:>5.1}%  {}  [{}]",
            rec.rank,
            rec.symbol,
            rec.composite_score,
            alloc.weight * 100.0,
            rec.news_summary,
            rec.risk_note
        );
    }
    println!(
        "  news coverage {:.1}%  avg news score {:+.2}  cash {:.1}%",
        report.news.coverage_pct,
        report.news.avg_news_score,
        report.allocation.cash_weight * 100.0
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ScanConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ScanConfig::default()
    });

    // Override the reports directory from env if available.
    if let Ok(dir) = std::env::var("SHADOW_SCANNER_REPORTS_DIR") {
        if !dir.trim().is_empty() {
            config.settings.reports_dir = dir.trim().to_string();
        }
    }

    let store = ReportStore::new(&config.settings.reports_dir);

    match cli.command {
        // ── 2a. Scan ─────────────────────────────────────────────────────
        Command::Scan {
            watchlist,
            topn,
            holdings,
        } => {
            let symbols = read_symbol_file(&watchlist)?;
            let holdings: HashSet<String> = match holdings {
                Some(path) => read_symbol_file(&path)?.into_iter().collect(),
                None => HashSet::new(),
            };

            let market = build_market_provider(&config.settings.market_provider)?;
            let news = build_news_provider(
                &config.settings.news_provider,
                &config.settings.market_provider,
            )?;

            info!(
                watchlist = %watchlist.display(),
                symbols = symbols.len(),
                topn,
                reports_dir = %store.dir().display(),
                "Starting shadow scan"
            );

            let orchestrator = ScanOrchestrator::new(
                market,
                news,
                config.policy.clone(),
                store,
                Duration::from_secs(config.settings.provider_timeout_secs),
            );
            let request = ScanRequest {
                watchlist: symbols,
                top_n: topn,
                holdings,
            };

            match orchestrator.run(&request).await {
                Ok(run) => {
                    print_summary(&run);
                    Ok(if run.succeeded() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                Err(e) => {
                    error!(error = %e, "Scan could not be persisted");
                    eprintln!("scan failed: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        // ── 2b. Evaluate ─────────────────────────────────────────────────
        Command::Evaluate {
            outcomes,
            lookback,
            granularity,
            min_samples,
        } => {
            let content = std::fs::read_to_string(&outcomes)
                .with_context(|| format!("failed to read outcomes from {}", outcomes.display()))?;
            let outcomes: Vec<RealizedOutcome> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse outcomes from {}", outcomes.display()))?;

            let reports = store.load_recent(lookback)?;
            let summary = EvaluationAggregator::new(granularity)
                .with_min_samples(min_samples)
                .aggregate(&reports, &outcomes);
            for alert in &summary.alerts {
                warn!(alert = %alert, "Evaluation data quality");
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }

        // ── 2c. Init config ──────────────────────────────────────────────
        Command::InitConfig { force } => {
            if cli.config.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    cli.config.display()
                );
            }
            ScanConfig::default().save(&cli.config)?;
            println!("wrote default config to {}", cli.config.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}
