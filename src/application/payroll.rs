use crate::application::ledger::LedgerEngine;
use crate::domain::account::UserId;
use crate::domain::money::Amount;
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, info};

const SECONDS_PER_HOUR: Decimal = dec!(3600);

/// Pays hourly wages when a worker clocks out.
pub struct Payroll {
    ledger: Arc<LedgerEngine>,
}

impl Payroll {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self { ledger }
    }

    /// Credits `hours worked * pay_rate`, rounded to cents, as an admin deposit.
    ///
    /// Returns `None` when the shift earned nothing.
    pub async fn clock_out(
        &self,
        user: UserId,
        session_start: DateTime<Utc>,
        now: DateTime<Utc>,
        pay_rate: Decimal,
    ) -> Result<Option<Transaction>> {
        if now < session_start {
            return Err(LedgerError::InvalidState(
                "clock-out precedes the start of the session".to_string(),
            ));
        }
        if pay_rate < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "pay rate {pay_rate} is negative"
            )));
        }

        let hours = Decimal::from((now - session_start).num_seconds()) / SECONDS_PER_HOUR;
        let earned = (hours * pay_rate).round_dp(2);
        if earned <= Decimal::ZERO {
            debug!(user, %hours, "shift earned nothing");
            return Ok(None);
        }

        let account_id = self.ledger.account_for_user(user).await?.id;
        let tx = self
            .ledger
            .apply(
                account_id,
                Amount::new(earned)?,
                TransactionKind::AdminDeposit,
                &format!("Pay for {:.2} hours of work.", hours.round_dp(2)),
            )
            .await?;
        info!(user, %earned, tx = tx.id, "wages paid");
        Ok(Some(tx))
    }
}
