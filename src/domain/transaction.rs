use super::account::AccountId;
use super::money::Amount;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TransactionId = u64;

/// Longest description an audit row can hold.
pub const MAX_DESCRIPTION_LEN: usize = 255;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    Credit,
    Debit,
    Either,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    InitialSetup,
    AdminDeposit,
    AdminWithdrawal,
    TicketPayment,
    PermitFee,
    MarketplaceSale,
    MarketplacePurchase,
    TaxPayment,
    AutomatedTaxDeduction,
    PermitFeePayment,
    AuctionWinDebit,
    AuctionSaleCredit,
    Other,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 13] = [
        Self::InitialSetup,
        Self::AdminDeposit,
        Self::AdminWithdrawal,
        Self::TicketPayment,
        Self::PermitFee,
        Self::MarketplaceSale,
        Self::MarketplacePurchase,
        Self::TaxPayment,
        Self::AutomatedTaxDeduction,
        Self::PermitFeePayment,
        Self::AuctionWinDebit,
        Self::AuctionSaleCredit,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialSetup => "initial_setup",
            Self::AdminDeposit => "admin_deposit",
            Self::AdminWithdrawal => "admin_withdrawal",
            Self::TicketPayment => "ticket_payment",
            Self::PermitFee => "permit_fee",
            Self::MarketplaceSale => "marketplace_sale",
            Self::MarketplacePurchase => "marketplace_purchase",
            Self::TaxPayment => "tax_payment",
            Self::AutomatedTaxDeduction => "automated_tax_deduction",
            Self::PermitFeePayment => "permit_fee_payment",
            Self::AuctionWinDebit => "auction_win_debit",
            Self::AuctionSaleCredit => "auction_sale_credit",
            Self::Other => "other",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::InitialSetup
            | Self::AdminDeposit
            | Self::MarketplaceSale
            | Self::AuctionSaleCredit => Direction::Credit,
            Self::AdminWithdrawal
            | Self::TicketPayment
            | Self::PermitFee
            | Self::MarketplacePurchase
            | Self::TaxPayment
            | Self::AutomatedTaxDeduction
            | Self::PermitFeePayment
            | Self::AuctionWinDebit => Direction::Debit,
            Self::Other => Direction::Either,
        }
    }

    /// Rejects an amount whose sign contradicts this kind.
    pub fn check_sign(&self, amount: Amount) -> Result<()> {
        match (self.direction(), amount.is_credit()) {
            (Direction::Credit, false) => Err(LedgerError::InvalidAmount(format!(
                "{self} must be a credit, got {amount}"
            ))),
            (Direction::Debit, true) => Err(LedgerError::InvalidAmount(format!(
                "{self} must be a debit, got {amount}"
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| LedgerError::UnknownVariant {
                kind: "transaction kind",
                value: value.to_string(),
            })
    }
}

/// An immutable ledger row. Once committed it is never updated or deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub timestamp: DateTime<Utc>,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub description: String,
}

pub fn check_description(description: &str) -> Result<()> {
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(LedgerError::InvalidDescription(len));
    }
    Ok(())
}
