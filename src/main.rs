//! Audit a poll from a directory of ledger exports
use ballot_auditor::{
    config::ValidationConfig, ledger::LedgerSource, pipeline::Auditor, worker::WorkerPool,
};
use clap::Parser;
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "ballot-auditor", version, about = "Independent audit of a ledger-recorded poll", long_about = None)]
struct Cli {
    /// Directory holding the ledger exports (*.csv)
    dir: PathBuf,
    /// Identifier of the voting contract
    contract_id: String,
    /// Skip transaction signature checks
    #[arg(long = "no-tx-sig")]
    no_tx_sig: bool,
    /// Skip blind signature checks
    #[arg(long = "no-blind-sig")]
    no_blind_sig: bool,
    /// Skip range proof checks
    #[arg(long = "no-zkp")]
    no_zkp: bool,
    /// Log the per-question sums of the published results
    #[arg(long)]
    debug: bool,
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
    /// Worker threads; defaults to one per logical CPU
    #[arg(short = 'j', long = "workers")]
    workers: Option<usize>,
}

impl Cli {
    fn get_config(&self) -> ValidationConfig {
        let mut config = ValidationConfig::from_env();
        config.verify_tx_signatures &= !self.no_tx_sig;
        config.verify_blind_signatures &= !self.no_blind_sig;
        config.verify_proofs &= !self.no_zkp;
        config.debug |= self.debug;
        return config;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let config = cli.get_config();
    info!("checks: {:?}", config);
    let pool = match cli.workers {
        Some(workers) => WorkerPool::new(workers, ballot_auditor::worker::MAX_RETRIES),
        None => WorkerPool::with_hardware_parallelism(),
    };
    let pool = match pool {
        Ok(pool) => pool,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    info!("{} workers", pool.get_workers());
    let cancel = pool.get_cancel_handle();

    let source = match LedgerSource::from_dir(&cli.dir) {
        Ok(source) => source,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    info!("{} ledger files in {}", source.get_files().len(), cli.dir.display());

    let contract_id = cli.contract_id.clone();
    let mut audit = tokio::task::spawn_blocking(move || {
        return Auditor::new(config, pool).audit_source(&source, &contract_id);
    });

    let outcome = tokio::select! {
        outcome = &mut audit => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning outstanding calls");
            cancel.cancel();
            audit.await
        }
    };

    let report = match outcome {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            error!("audit failed: {}", e);
            return ExitCode::from(2);
        }
        Err(e) => {
            error!("audit task failed: {}", e);
            return ExitCode::from(2);
        }
    };

    info!(
        "{} active transactions, {} rejected, {} repeated votes, {} ballots counted",
        report.active_transactions,
        report.rejected.len(),
        report.duplicate_votes,
        report.valid_ballots
    );
    if report.is_consistent() {
        info!("audit passed");
        return ExitCode::SUCCESS;
    }
    error!("audit found inconsistencies");
    return ExitCode::from(1);
}
