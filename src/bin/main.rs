//! node-dns-sync binary entry point.

use clap::Parser;
use node_dns_sync::{telemetry, Config, Reconciler};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Synchronize cluster node external addresses into DNS A records.
#[derive(Parser, Debug)]
#[command(name = "node-dns-sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML). Optional; environment variables also apply.
    #[arg(short, long, default_value = "node-dns-sync.toml")]
    config: PathBuf,

    /// Compute and log the diff without touching DNS or the state file.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(Some(&args.config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("node-dns-sync: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init(&config.telemetry) {
        eprintln!("node-dns-sync: failed to initialize telemetry: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        config_file = %args.config.display(),
        zone_id = %config.cloudflare.zone_id,
        domain_suffix = %config.sync.domain_suffix,
        state_file = %config.sync.state_file.display(),
        dry_run = args.dry_run,
        "Starting node-dns-sync"
    );

    let code = run(&config, args.dry_run).await;
    telemetry::shutdown().await;
    code
}

async fn run(config: &Config, dry_run: bool) -> ExitCode {
    let mut reconciler = match Reconciler::from_config(config, dry_run).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to initialize");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = reconciler.check_preconditions() {
        error!(error = %e, "state storage precondition failed");
        return ExitCode::FAILURE;
    }

    match reconciler.run_once().await {
        Ok(report) if report.failures.is_empty() => ExitCode::SUCCESS,
        Ok(report) => {
            info!(
                failed = report.failures.len(),
                "run completed with failures, affected nodes retry next run"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "reconciliation failed");
            ExitCode::FAILURE
        }
    }
}
