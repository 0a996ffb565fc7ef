use crate::application::ledger::Reconciliation;
use crate::domain::account::{Account, AccountId, UserId};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    account: AccountId,
    user: UserId,
    balance: Decimal,
    currency: &'a str,
    company: bool,
}

#[derive(Serialize)]
struct ReconciliationRow {
    account: AccountId,
    user: UserId,
    balance: Decimal,
    ledger_total: Decimal,
    transactions: usize,
    balanced: bool,
}

/// Writes account state and reconciliation results as CSV.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// `account,user,balance,currency,company`, one row per account.
    pub fn write_accounts(&mut self, accounts: &[Account]) -> Result<()> {
        if accounts.is_empty() {
            self.writer
                .write_record(["account", "user", "balance", "currency", "company"])?;
        }
        for account in accounts {
            self.writer.serialize(AccountRow {
                account: account.id,
                user: account.user_id,
                balance: account.balance.value(),
                currency: &account.currency,
                company: account.is_company,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_reconciliations(&mut self, results: &[Reconciliation]) -> Result<()> {
        if results.is_empty() {
            self.writer.write_record([
                "account",
                "user",
                "balance",
                "ledger_total",
                "transactions",
                "balanced",
            ])?;
        }
        for result in results {
            self.writer.serialize(ReconciliationRow {
                account: result.account_id,
                user: result.user_id,
                balance: result.balance,
                ledger_total: result.ledger_total,
                transactions: result.transaction_count,
                balanced: result.is_balanced(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Balance;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_accounts() {
        let mut account = Account::open(3, 7, "GDC", true, Utc::now());
        account.balance = Balance::new(dec!(750));

        let mut out = Vec::new();
        AccountWriter::new(&mut out).write_accounts(&[account]).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "account,user,balance,currency,company\n3,7,750.00,GDC,true\n");
    }

    #[test]
    fn test_empty_output_still_has_header() {
        let mut out = Vec::new();
        AccountWriter::new(&mut out).write_accounts(&[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "account,user,balance,currency,company\n"
        );
    }

    #[test]
    fn test_write_reconciliations() {
        let rows = [Reconciliation {
            account_id: 1,
            user_id: 2,
            balance: dec!(10.00),
            ledger_total: dec!(9.00),
            transaction_count: 3,
        }];
        let mut out = Vec::new();
        AccountWriter::new(&mut out).write_reconciliations(&rows).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("account,user,balance,ledger_total,transactions,balanced\n"));
        assert!(text.contains("1,2,10.00,9.00,3,false"));
    }
}
