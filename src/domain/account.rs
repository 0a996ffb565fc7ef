use super::money::{Amount, Balance, check_range};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AccountId = u64;
pub type UserId = u64;

/// A user's bank account.
///
/// Every user owns at most one account. The balance is only ever changed
/// through a committed change set that also appends the matching
/// [`Transaction`](super::transaction::Transaction).
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub balance: Balance,
    /// Currency tag, "GDC" unless configured otherwise.
    pub currency: String,
    /// Company accounts are owned by a player-run business rather than a person.
    pub is_company: bool,
    pub last_updated_on: DateTime<Utc>,
    /// Bumped on every write; the store rejects writes based on a stale version.
    pub version: u64,
}

impl Account {
    pub fn open(
        id: AccountId,
        user_id: UserId,
        currency: impl Into<String>,
        is_company: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            balance: Balance::ZERO,
            currency: currency.into(),
            is_company,
            last_updated_on: now,
            version: 1,
        }
    }

    /// Returns the state of this account after `amount` is posted to it.
    ///
    /// Fails with `InvalidAmount` when the new balance would not fit the column.
    pub fn posted(&self, amount: Amount, now: DateTime<Utc>) -> Result<Self> {
        let balance = self.balance + amount;
        check_range(balance.value(), "resulting balance")?;
        Ok(Self {
            balance,
            last_updated_on: now,
            version: self.version + 1,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_open_account_starts_empty() {
        let account = Account::open(1, 7, "GDC", false, Utc::now());
        assert_eq!(account.balance, Balance::ZERO);
        assert_eq!(account.version, 1);
        assert!(!account.is_company);
    }

    #[test]
    fn test_posted_leaves_original_untouched() {
        let account = Account::open(1, 7, "GDC", false, Utc::now());
        let later = account
            .posted(Amount::new(dec!(12.50)).unwrap(), Utc::now())
            .unwrap();

        assert_eq!(account.balance, Balance::ZERO);
        assert_eq!(later.balance, Balance::new(dec!(12.50)));
        assert_eq!(later.version, 2);
        assert_eq!(later.user_id, 7);
    }

    #[test]
    fn test_posted_balance_must_fit_the_column() {
        let near_max = Amount::new(dec!(99999999.99)).unwrap();
        let full = Account::open(1, 7, "GDC", false, Utc::now())
            .posted(near_max, Utc::now())
            .unwrap();

        assert!(matches!(
            full.posted(Amount::new(dec!(0.01)).unwrap(), Utc::now()),
            Err(crate::error::LedgerError::InvalidAmount(_))
        ));
        // Debits bring it back into range.
        assert!(full.posted(-near_max, Utc::now()).is_ok());
    }
}
