use crate::application::ledger::LedgerEngine;
use crate::application::locks::{Job, JobLocks};
use crate::domain::account::AccountId;
use crate::domain::money::Amount;
use crate::domain::ports::{Attachment, Sequence, StoreHandle};
use crate::domain::tax::{BracketTable, TaxBracket, TaxDeductionLog, default_brackets};
use crate::domain::transaction::TransactionKind;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub accounts_considered: usize,
    pub processed: usize,
    pub skipped_zero_tax: usize,
    pub skipped_no_bracket: usize,
    pub failed: usize,
    pub total_collected: Decimal,
}

enum Outcome {
    Collected(Decimal),
    ZeroTax,
    NoBracket,
    /// The balance dropped to zero or below between the scan and the lock.
    NoLongerPositive,
}

/// Weekly bracket-based deduction from every positive balance.
pub struct TaxSweep {
    ledger: Arc<LedgerEngine>,
    jobs: Arc<JobLocks>,
}

impl TaxSweep {
    pub fn new(ledger: Arc<LedgerEngine>, jobs: Arc<JobLocks>) -> Self {
        Self { ledger, jobs }
    }

    /// Taxes every account with a positive balance, one commit per account.
    ///
    /// A failure on one account is logged and counted; the sweep carries on.
    /// Only a failure to start (job already running, brackets or accounts
    /// unreadable) is returned as an error.
    pub async fn run_weekly_sweep(&self) -> Result<SweepReport> {
        let _running = self.jobs.try_acquire(Job::TaxSweep)?;
        info!("starting weekly tax sweep");

        let table = BracketTable::new(self.ledger.store().tax_brackets().await?);
        let mut report = SweepReport {
            total_collected: Decimal::new(0, 2),
            ..SweepReport::default()
        };
        if table.is_empty() {
            info!("no active tax brackets, nothing to collect");
            return Ok(report);
        }

        let candidates: Vec<AccountId> = self
            .ledger
            .accounts()
            .await?
            .into_iter()
            .filter(|account| account.balance.is_positive())
            .map(|account| account.id)
            .collect();
        report.accounts_considered = candidates.len();

        for account_id in candidates {
            match self.sweep_account(account_id, &table).await {
                Ok(Outcome::Collected(tax)) => {
                    report.processed += 1;
                    report.total_collected += tax;
                }
                Ok(Outcome::ZeroTax) => report.skipped_zero_tax += 1,
                Ok(Outcome::NoBracket) => report.skipped_no_bracket += 1,
                Ok(Outcome::NoLongerPositive) => {}
                Err(e) => {
                    warn!(account = account_id, error = %e, "tax deduction failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            total = %report.total_collected,
            "weekly tax sweep finished"
        );
        Ok(report)
    }

    async fn sweep_account(&self, account_id: AccountId, table: &BracketTable) -> Result<Outcome> {
        let mut locked = self.ledger.lock(account_id).await?;
        let account = locked.account().clone();
        if !account.balance.is_positive() {
            return Ok(Outcome::NoLongerPositive);
        }

        let Some(bracket) = table.select(account.balance) else {
            debug!(account = account_id, balance = %account.balance, "no applicable bracket");
            return Ok(Outcome::NoBracket);
        };
        let tax = bracket.tax_on(account.balance);
        if tax.is_zero() {
            debug!(account = account_id, "tax rounds to zero, skipping");
            return Ok(Outcome::ZeroTax);
        }

        let log_id = self.ledger.store().next_id(Sequence::TaxLog).await?;
        let description = format!("Weekly tax ({} @ {}%)", bracket.name, bracket.tax_rate);
        self.ledger
            .apply_locked_with(
                &mut locked,
                Amount::debit(tax)?,
                TransactionKind::AutomatedTaxDeduction,
                &description,
                |tx| {
                    Ok(vec![Attachment::TaxDeduction(TaxDeductionLog {
                        id: log_id,
                        user_id: account.user_id,
                        tax_bracket_id: bracket.id,
                        balance_before_deduction: account.balance,
                        tax_rate_applied: bracket.tax_rate,
                        amount_deducted: tax,
                        deduction_date: tx.timestamp,
                        banking_transaction_id: tx.id,
                    })])
                },
            )
            .await?;

        debug!(account = account_id, %tax, bracket = %bracket.name, "taxed");
        Ok(Outcome::Collected(tax))
    }
}

/// Replaces every configured bracket with the default progressive tiers.
pub async fn seed_default_brackets(store: &StoreHandle) -> Result<Vec<TaxBracket>> {
    store.clear_tax_brackets().await?;
    let mut seeded = Vec::new();
    for bracket in default_brackets() {
        let bracket = TaxBracket {
            id: store.next_id(Sequence::TaxBracket).await?,
            ..bracket
        };
        store.save_tax_bracket(bracket.clone()).await?;
        seeded.push(bracket);
    }
    info!(count = seeded.len(), "seeded default tax brackets");
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::error::LedgerError;
    use crate::infrastructure::in_memory::InMemoryStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: InMemoryStore,
        ledger: Arc<LedgerEngine>,
        sweep: TaxSweep,
        jobs: Arc<JobLocks>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let ledger = Arc::new(LedgerEngine::new(
            Arc::new(store.clone()),
            LedgerConfig::default(),
        ));
        let jobs = Arc::new(JobLocks::new());
        let sweep = TaxSweep::new(ledger.clone(), jobs.clone());
        Fixture {
            store,
            ledger,
            sweep,
            jobs,
        }
    }

    async fn bracket(store: &InMemoryStore, min: Decimal, max: Option<Decimal>, rate: Decimal) {
        use crate::domain::ports::{TaxStore, UnitOfWork};
        let id = store.next_id(Sequence::TaxBracket).await.unwrap();
        store
            .save_tax_bracket(TaxBracket {
                id,
                name: format!("Bracket {id}"),
                description: None,
                min_balance: min,
                max_balance: max,
                tax_rate: rate,
                is_active: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overlapping_brackets_higher_floor_applies() {
        let f = fixture();
        bracket(&f.store, dec!(0), Some(dec!(1000)), dec!(1)).await;
        bracket(&f.store, dec!(500), Some(dec!(1500)), dec!(3)).await;
        let account = f.ledger.open_account_with(1, false, dec!(700)).await.unwrap();

        let report = f.sweep.run_weekly_sweep().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.total_collected, dec!(21.00));
        assert_eq!(
            f.ledger.account(account.id).await.unwrap().balance.value(),
            dec!(679.00)
        );
    }

    #[tokio::test]
    async fn test_deduction_log_references_its_transaction() {
        use crate::domain::ports::{TaxStore, TransactionStore};
        let f = fixture();
        bracket(&f.store, dec!(0), None, dec!(2.5)).await;
        f.ledger.open_account_with(7, false, dec!(2000)).await.unwrap();

        f.sweep.run_weekly_sweep().await.unwrap();

        let logs = f.store.tax_deduction_logs().await.unwrap();
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert_eq!(log.user_id, 7);
        assert_eq!(log.balance_before_deduction.value(), dec!(2000.00));
        assert_eq!(log.amount_deducted, dec!(50.00));

        let tx = f
            .store
            .transaction(log.banking_transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::AutomatedTaxDeduction);
        assert_eq!(tx.amount.value(), dec!(-50.00));
        assert_eq!(tx.description, "Weekly tax (Bracket 1 @ 2.5%)");
        assert_eq!(
            f.store
                .tax_deduction_for_transaction(tx.id)
                .await
                .unwrap()
                .map(|l| l.id),
            Some(log.id)
        );
    }

    #[tokio::test]
    async fn test_zero_tax_writes_nothing() {
        use crate::domain::ports::{TaxStore, TransactionStore};
        let f = fixture();
        bracket(&f.store, dec!(0), None, dec!(1)).await;
        // 1% of 0.40 is 0.004, which rounds to 0.00.
        let account = f.ledger.open_account_with(1, false, dec!(0.40)).await.unwrap();

        let report = f.sweep.run_weekly_sweep().await.unwrap();

        assert_eq!(report.skipped_zero_tax, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(f.store.transactions_for_account(account.id).await.unwrap().len(), 1);
        assert!(f.store.tax_deduction_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_and_unbracketed_balances_are_skipped() {
        let f = fixture();
        bracket(&f.store, dec!(100), None, dec!(5)).await;
        f.ledger.open_account_with(1, false, dec!(0)).await.unwrap();
        f.ledger.open_account_with(2, false, dec!(50)).await.unwrap();
        let overdrawn = f.ledger.open_account_with(3, false, dec!(10)).await.unwrap();
        f.ledger
            .apply(
                overdrawn.id,
                Amount::new(dec!(-20)).unwrap(),
                TransactionKind::AdminWithdrawal,
                "correction",
            )
            .await
            .unwrap();

        let report = f.sweep.run_weekly_sweep().await.unwrap();

        assert_eq!(report.accounts_considered, 1);
        assert_eq!(report.skipped_no_bracket, 1);
        assert_eq!(report.processed, 0);
    }

    #[tokio::test]
    async fn test_failed_account_does_not_stop_the_sweep() {
        let f = fixture();
        bracket(&f.store, dec!(0), None, dec!(10)).await;
        let first = f.ledger.open_account_with(1, false, dec!(100)).await.unwrap();
        let broken = f.ledger.open_account_with(2, false, dec!(100)).await.unwrap();
        let last = f.ledger.open_account_with(3, false, dec!(100)).await.unwrap();
        f.store.fail_commits_for(broken.id).await;

        let report = f.sweep.run_weekly_sweep().await.unwrap();

        assert_eq!(report.accounts_considered, 3);
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total_collected, dec!(20.00));
        for (id, expected) in [(first.id, dec!(90)), (broken.id, dec!(100)), (last.id, dec!(90))] {
            assert_eq!(f.ledger.account(id).await.unwrap().balance.value(), expected);
        }
        assert!(f.ledger.reconcile_all().await.unwrap().iter().all(|r| r.is_balanced()));
    }

    #[tokio::test]
    async fn test_no_brackets_is_an_empty_success() {
        let f = fixture();
        f.ledger.open_account(1, false).await.unwrap();

        let report = f.sweep.run_weekly_sweep().await.unwrap();
        assert_eq!(report.accounts_considered, 0);
        assert_eq!(report.total_collected.to_string(), "0.00");
    }

    #[tokio::test]
    async fn test_overlapping_run_is_refused() {
        let f = fixture();
        let _held = f.jobs.try_acquire(Job::TaxSweep).unwrap();

        assert!(matches!(
            f.sweep.run_weekly_sweep().await,
            Err(LedgerError::JobAlreadyRunning("tax-sweep"))
        ));
    }

    #[tokio::test]
    async fn test_seed_replaces_existing_brackets() {
        use crate::domain::ports::TaxStore;
        let f = fixture();
        bracket(&f.store, dec!(0), None, dec!(50)).await;
        let handle: StoreHandle = Arc::new(f.store.clone());

        let seeded = seed_default_brackets(&handle).await.unwrap();

        let stored = f.store.tax_brackets().await.unwrap();
        assert_eq!(seeded.len(), 4);
        assert_eq!(stored, seeded);
        assert!(stored.iter().all(|b| b.tax_rate != dec!(50)));
    }
}
