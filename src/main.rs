use clap::{Parser, Subcommand};
use gdc_ledger::application::ledger::LedgerEngine;
use gdc_ledger::application::locks::JobLocks;
use gdc_ledger::config::LedgerConfig;
use gdc_ledger::domain::ports::StoreHandle;
use gdc_ledger::infrastructure::in_memory::InMemoryStore;
#[cfg(feature = "storage-rocksdb")]
use gdc_ledger::infrastructure::rocksdb::RocksDbStore;
use gdc_ledger::interfaces::cli;
use gdc_ledger::telemetry;
use miette::{IntoDiagnostic, Result, bail};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// JSON config file; missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply postings from a CSV file and print every account
    Post {
        /// Postings CSV: kind,user,amount,description
        input: PathBuf,
    },
    /// Replace the tax brackets with the default tiers
    SeedBrackets,
    /// Run the weekly tax sweep now
    TaxSweep,
    /// Close every auction whose end time has passed
    CloseAuctions,
    /// Check every balance against the sum of its transactions
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    telemetry::init(&args.log_level);

    let config = LedgerConfig::load(args.config.as_deref()).into_diagnostic()?;
    let store = open_store(args.db_path.as_deref())?;
    let ledger = Arc::new(LedgerEngine::new(store, config));
    let jobs = Arc::new(JobLocks::new());
    let stdout = io::stdout();

    match args.command {
        Command::Post { input } => {
            let file = File::open(input).into_diagnostic()?;
            cli::post(&ledger, file, stdout.lock())
                .await
                .into_diagnostic()?;
        }
        Command::SeedBrackets => {
            cli::seed_brackets(&ledger, stdout.lock())
                .await
                .into_diagnostic()?;
        }
        Command::TaxSweep => {
            cli::tax_sweep(ledger, jobs, stdout.lock())
                .await
                .into_diagnostic()?;
        }
        Command::CloseAuctions => {
            cli::close_auctions(ledger, jobs, stdout.lock())
                .await
                .into_diagnostic()?;
        }
        Command::Reconcile => {
            let mismatched = cli::reconcile(&ledger, stdout.lock())
                .await
                .into_diagnostic()?;
            if mismatched > 0 {
                bail!("{mismatched} account(s) out of balance with their transactions");
            }
        }
    }

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> Result<StoreHandle> {
    match db_path {
        Some(path) => Ok(Arc::new(RocksDbStore::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> Result<StoreHandle> {
    if let Some(path) = db_path {
        tracing::warn!(
            path = %path.display(),
            "Persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
        );
    }
    Ok(Arc::new(InMemoryStore::new()))
}
