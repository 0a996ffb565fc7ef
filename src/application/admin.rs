use crate::application::ledger::LedgerEngine;
use crate::domain::account::AccountId;
use crate::domain::money::{Amount, to_cents};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Staff corrections to account balances. These bypass the funds check.
pub struct AdminDesk {
    ledger: Arc<LedgerEngine>,
}

impl AdminDesk {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self { ledger }
    }

    /// Posts a signed correction as an admin deposit or withdrawal.
    pub async fn adjust_balance(
        &self,
        account_id: AccountId,
        amount: Decimal,
        reason: &str,
    ) -> Result<Transaction> {
        let amount = Amount::new(amount)?;
        let tx = self
            .ledger
            .apply(account_id, amount, adjustment_kind(amount), reason)
            .await?;
        info!(account = account_id, %amount, reason, "balance adjusted");
        Ok(tx)
    }

    /// Sets the balance to `target` by posting the difference.
    ///
    /// Returns `None` when the balance already equals `target`.
    pub async fn override_balance(
        &self,
        account_id: AccountId,
        target: Decimal,
        reason: &str,
    ) -> Result<Option<Transaction>> {
        let target = to_cents(target)?;
        let mut locked = self.ledger.lock(account_id).await?;
        let delta = target - locked.balance().value();
        if delta.is_zero() {
            return Ok(None);
        }

        let amount = Amount::new(delta)?;
        let tx = self
            .ledger
            .apply_locked(&mut locked, amount, adjustment_kind(amount), reason)
            .await?;
        info!(account = account_id, %target, reason, "balance overridden");
        Ok(Some(tx))
    }
}

fn adjustment_kind(amount: Amount) -> TransactionKind {
    if amount.is_credit() {
        TransactionKind::AdminDeposit
    } else {
        TransactionKind::AdminWithdrawal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::infrastructure::in_memory::InMemoryStore;
    use rust_decimal_macros::dec;

    async fn desk() -> (AdminDesk, Arc<LedgerEngine>, AccountId) {
        let ledger = Arc::new(LedgerEngine::new(
            Arc::new(InMemoryStore::new()),
            LedgerConfig::default(),
        ));
        let account = ledger.open_account(1, false).await.unwrap();
        (AdminDesk::new(ledger.clone()), ledger, account.id)
    }

    #[tokio::test]
    async fn test_adjustment_kind_follows_sign() {
        let (desk, ledger, id) = desk().await;

        let deposit = desk.adjust_balance(id, dec!(25), "Event prize").await.unwrap();
        let withdrawal = desk.adjust_balance(id, dec!(-200), "Clawback").await.unwrap();

        assert_eq!(deposit.kind, TransactionKind::AdminDeposit);
        assert_eq!(withdrawal.kind, TransactionKind::AdminWithdrawal);
        // Admin corrections may overdraw.
        assert_eq!(ledger.account(id).await.unwrap().balance.value(), dec!(-75.00));
    }

    #[tokio::test]
    async fn test_override_posts_the_difference() {
        let (desk, ledger, id) = desk().await;

        let tx = desk.override_balance(id, dec!(40), "Reset").await.unwrap().unwrap();
        assert_eq!(tx.amount.value(), dec!(-60.00));
        assert_eq!(ledger.account(id).await.unwrap().balance.value(), dec!(40.00));

        assert!(desk.override_balance(id, dec!(40.00), "Again").await.unwrap().is_none());
        assert!(ledger.reconcile(id).await.unwrap().is_balanced());
    }
}
