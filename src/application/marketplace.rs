use crate::application::ledger::LedgerEngine;
use crate::domain::account::UserId;
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

pub struct Marketplace {
    ledger: Arc<LedgerEngine>,
}

/// The buyer's debit and the seller's credit of one sale.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub buyer_transaction: Transaction,
    pub seller_transaction: Transaction,
}

impl Marketplace {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self { ledger }
    }

    pub async fn purchase(
        &self,
        buyer: UserId,
        seller: UserId,
        price: Decimal,
        title: &str,
    ) -> Result<Purchase> {
        if buyer == seller {
            return Err(LedgerError::InvalidState(
                "cannot buy your own listing".to_string(),
            ));
        }
        let from = self.ledger.account_for_user(buyer).await?.id;
        let to = self.ledger.account_for_user(seller).await?.id;

        let (buyer_transaction, seller_transaction) = self
            .ledger
            .transfer(
                from,
                to,
                price,
                TransactionKind::MarketplacePurchase,
                TransactionKind::MarketplaceSale,
                &format!("Marketplace: {title}"),
            )
            .await?;
        info!(buyer, seller, %price, "marketplace purchase");
        Ok(Purchase {
            buyer_transaction,
            seller_transaction,
        })
    }
}
