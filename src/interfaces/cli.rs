//! Command handlers behind the `gdc-ledger` binary.
//!
//! Each handler writes its report to the given sink and returns it, so the
//! binary only parses arguments and picks the storage backend.

use crate::application::auction_close::{AuctionCloser, CloseReport};
use crate::application::auctions::AuctionHouse;
use crate::application::ledger::LedgerEngine;
use crate::application::locks::JobLocks;
use crate::application::tax_sweep::{SweepReport, TaxSweep, seed_default_brackets};
use crate::domain::money::Amount;
use crate::domain::transaction::TransactionKind;
use crate::error::{LedgerError, Result};
use crate::interfaces::csv::account_writer::AccountWriter;
use crate::interfaces::csv::posting_reader::{Posting, PostingReader};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostSummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Applies every posting in `source`, then writes all accounts to `sink`.
///
/// Unreadable rows and rejected postings are logged and skipped.
pub async fn post<R: Read, W: Write>(
    ledger: &LedgerEngine,
    source: R,
    sink: W,
) -> Result<PostSummary> {
    let mut summary = PostSummary::default();
    for (line, posting) in PostingReader::new(source).postings().enumerate() {
        let outcome = match posting {
            Ok(posting) => apply_posting(ledger, posting).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => summary.applied += 1,
            Err(e) => {
                summary.rejected += 1;
                warn!(row = line + 1, error = %e, "posting rejected");
            }
        }
    }
    info!(applied = summary.applied, rejected = summary.rejected, "postings processed");

    let accounts = ledger.accounts().await?;
    AccountWriter::new(sink).write_accounts(&accounts)?;
    Ok(summary)
}

pub async fn apply_posting(ledger: &LedgerEngine, posting: Posting) -> Result<()> {
    if posting.kind == TransactionKind::InitialSetup {
        let starting = posting
            .amount
            .unwrap_or(ledger.config().starting_balance);
        ledger.open_account_with(posting.user, false, starting).await?;
        return Ok(());
    }

    let amount = posting.amount.ok_or_else(|| {
        LedgerError::InvalidAmount(format!("{} posting without an amount", posting.kind))
    })?;
    let description = posting
        .description
        .unwrap_or_else(|| posting.kind.as_str().to_string());
    let account_id = ledger.account_for_user(posting.user).await?.id;

    if amount < Decimal::ZERO {
        ledger
            .debit(account_id, -amount, posting.kind, &description)
            .await?;
    } else {
        ledger
            .apply(account_id, Amount::new(amount)?, posting.kind, &description)
            .await?;
    }
    Ok(())
}

/// Installs the default tax tiers and prints how many were written.
pub async fn seed_brackets<W: Write>(ledger: &LedgerEngine, mut sink: W) -> Result<usize> {
    let seeded = seed_default_brackets(ledger.store()).await?;
    writeln!(sink, "{}", seeded.len())?;
    Ok(seeded.len())
}

pub async fn tax_sweep<W: Write>(
    ledger: Arc<LedgerEngine>,
    jobs: Arc<JobLocks>,
    sink: W,
) -> Result<SweepReport> {
    let report = TaxSweep::new(ledger, jobs).run_weekly_sweep().await?;
    write_json(sink, &report)?;
    Ok(report)
}

pub async fn close_auctions<W: Write>(
    ledger: Arc<LedgerEngine>,
    jobs: Arc<JobLocks>,
    sink: W,
) -> Result<CloseReport> {
    let house = Arc::new(AuctionHouse::new(ledger));
    let report = AuctionCloser::new(house, jobs)
        .close_due_auctions(Utc::now())
        .await?;
    write_json(sink, &report)?;
    Ok(report)
}

/// Writes one row per account and returns how many are out of balance.
pub async fn reconcile<W: Write>(ledger: &LedgerEngine, sink: W) -> Result<usize> {
    let results = ledger.reconcile_all().await?;
    AccountWriter::new(sink).write_reconciliations(&results)?;

    let mismatched = results.iter().filter(|r| !r.is_balanced()).count();
    if mismatched > 0 {
        warn!(mismatched, "accounts out of balance with their ledger");
    }
    Ok(mismatched)
}

fn write_json<W: Write, T: Serialize>(mut sink: W, report: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut sink, report)?;
    writeln!(sink)?;
    Ok(())
}
