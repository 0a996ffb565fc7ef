use super::account::UserId;
use super::money::{Balance, SCALE};
use super::transaction::TransactionId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub type TaxBracketId = u64;
pub type TaxDeductionLogId = u64;

/// A balance range taxed at a flat percentage.
///
/// `min_balance` is inclusive, `max_balance` exclusive; `None` means no upper bound.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TaxBracket {
    pub id: TaxBracketId,
    pub name: String,
    pub description: Option<String>,
    pub min_balance: Decimal,
    pub max_balance: Option<Decimal>,
    /// Percentage, e.g. `2.5` for 2.5%.
    pub tax_rate: Decimal,
    pub is_active: bool,
}

impl TaxBracket {
    pub fn contains(&self, balance: Balance) -> bool {
        let balance = balance.value();
        balance >= self.min_balance && self.max_balance.is_none_or(|max| balance < max)
    }

    /// Tax owed on `balance`, rounded half-to-even to cents.
    pub fn tax_on(&self, balance: Balance) -> Decimal {
        let mut tax = (balance.value() * self.tax_rate / dec!(100)).round_dp(SCALE);
        tax.rescale(SCALE);
        tax
    }
}

/// Active brackets ordered for selection.
///
/// Configured ranges may overlap; the bracket with the highest `min_balance`
/// that contains a balance wins.
#[derive(Debug, Clone)]
pub struct BracketTable {
    brackets: Vec<TaxBracket>,
}

impl BracketTable {
    pub fn new(brackets: impl IntoIterator<Item = TaxBracket>) -> Self {
        let mut brackets: Vec<TaxBracket> = brackets.into_iter().filter(|b| b.is_active).collect();
        brackets.sort_by_key(|b| b.id);
        // Stable: equal floors keep ascending id order.
        brackets.sort_by(|a, b| b.min_balance.cmp(&a.min_balance));
        Self { brackets }
    }

    pub fn is_empty(&self) -> bool {
        self.brackets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.brackets.len()
    }

    pub fn select(&self, balance: Balance) -> Option<&TaxBracket> {
        self.brackets.iter().find(|bracket| bracket.contains(balance))
    }
}

/// Audit row pairing an automated deduction with the transaction that made it.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TaxDeductionLog {
    pub id: TaxDeductionLogId,
    pub user_id: UserId,
    pub tax_bracket_id: TaxBracketId,
    pub balance_before_deduction: Balance,
    pub tax_rate_applied: Decimal,
    pub amount_deducted: Decimal,
    pub deduction_date: DateTime<Utc>,
    pub banking_transaction_id: TransactionId,
}

/// The progressive tiers installed by `seed-brackets`.
pub fn default_brackets() -> Vec<TaxBracket> {
    let tier = |id, name: &str, min, max, rate| TaxBracket {
        id,
        name: name.to_string(),
        description: None,
        min_balance: min,
        max_balance: max,
        tax_rate: rate,
        is_active: true,
    };
    vec![
        tier(1, "Tier 1", dec!(0.00), Some(dec!(10000.00)), dec!(1.00)),
        tier(2, "Tier 2", dec!(10000.01), Some(dec!(50000.00)), dec!(2.50)),
        tier(3, "Tier 3", dec!(50000.01), Some(dec!(250000.00)), dec!(5.00)),
        tier(4, "Tier 4", dec!(250000.01), None, dec!(10.00)),
    ]
}
