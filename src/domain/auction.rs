use super::account::UserId;
use super::transaction::TransactionId;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub type AuctionId = u64;
pub type BidId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    PendingApproval,
    Active,
    /// A winner is recorded; funds have not moved yet.
    SoldAwaitingPayment,
    ExpiredNoBids,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Active => "active",
            Self::SoldAwaitingPayment => "sold_awaiting_payment",
            Self::ExpiredNoBids => "expired_no_bids",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuctionStatus {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_approval" => Ok(Self::PendingApproval),
            "active" => Ok(Self::Active),
            "sold_awaiting_payment" => Ok(Self::SoldAwaitingPayment),
            "expired_no_bids" => Ok(Self::ExpiredNoBids),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(LedgerError::UnknownVariant {
                kind: "auction status",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AuctionItem {
    pub id: AuctionId,
    pub submitter_user_id: UserId,
    pub admin_approver_id: Option<UserId>,
    pub item_name: String,
    pub item_description: Option<String>,
    pub suggested_starting_bid: Option<Decimal>,
    pub starting_bid: Option<Decimal>,
    pub min_bid_increment: Option<Decimal>,
    pub submission_time: DateTime<Utc>,
    pub approval_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub original_end_time: Option<DateTime<Utc>>,
    pub current_end_time: Option<DateTime<Utc>>,
    pub status: AuctionStatus,
    pub admin_notes: Option<String>,
    pub winning_bid_id: Option<BidId>,
    pub winner_user_id: Option<UserId>,
    // Settlement is not connected yet; these stay empty after close.
    pub winner_payment_transaction_id: Option<TransactionId>,
    pub seller_payout_transaction_id: Option<TransactionId>,
}

impl AuctionItem {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Active && self.current_end_time.is_some_and(|end| end <= now)
    }

    /// Lowest acceptable next bid given the current highest one.
    pub fn minimum_next_bid(&self, highest: Option<&AuctionBid>, default_increment: Decimal) -> Decimal {
        match highest {
            Some(bid) => bid.amount + self.min_bid_increment.unwrap_or(default_increment),
            None => self.starting_bid.unwrap_or(Decimal::ZERO),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AuctionBid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_user_id: UserId,
    pub amount: Decimal,
    pub bid_time: DateTime<Utc>,
}

/// Orders bids so that the better bid sorts first: higher amount, then the
/// earlier bid, then the lower id.
fn rank(a: &AuctionBid, b: &AuctionBid) -> Ordering {
    b.amount
        .cmp(&a.amount)
        .then_with(|| a.bid_time.cmp(&b.bid_time))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn winning_bid(bids: &[AuctionBid]) -> Option<&AuctionBid> {
    bids.iter().min_by(|a, b| rank(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn bid(id: BidId, amount: Decimal, at: DateTime<Utc>) -> AuctionBid {
        AuctionBid {
            id,
            auction_id: 1,
            bidder_user_id: id + 100,
            amount,
            bid_time: at,
        }
    }

    #[test]
    fn test_equal_amounts_earliest_bid_wins() {
        let t1 = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let t2 = t1 + Duration::seconds(30);
        // Later bid inserted first, with a lower id, to prove time decides.
        let bids = vec![bid(1, dec!(100), t2), bid(2, dec!(100), t1)];

        assert_eq!(winning_bid(&bids).unwrap().id, 2);
    }

    #[test]
    fn test_highest_amount_beats_earlier_time() {
        let t1 = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let bids = vec![
            bid(1, dec!(100), t1),
            bid(2, dec!(100.01), t1 + Duration::minutes(5)),
        ];
        assert_eq!(winning_bid(&bids).unwrap().id, 2);
    }

    #[test]
    fn test_no_bids_no_winner() {
        assert!(winning_bid(&[]).is_none());
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert_eq!("Active".parse::<AuctionStatus>().unwrap(), AuctionStatus::Active);
        assert!(matches!(
            "closed".parse::<AuctionStatus>(),
            Err(LedgerError::UnknownVariant { kind: "auction status", .. })
        ));
    }
}
