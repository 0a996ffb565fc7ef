use super::account::UserId;
use super::transaction::TransactionId;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TicketId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Outstanding,
    Paid,
    Contested,
    Cancelled,
    ResolvedUnpaid,
    ResolvedDismissed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        Self::Outstanding,
        Self::Paid,
        Self::Contested,
        Self::Cancelled,
        Self::ResolvedUnpaid,
        Self::ResolvedDismissed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Outstanding => "Outstanding",
            Self::Paid => "Paid",
            Self::Contested => "Contested",
            Self::Cancelled => "Cancelled",
            Self::ResolvedUnpaid => "Resolved - Unpaid",
            Self::ResolvedDismissed => "Resolved - Dismissed",
        }
    }

    fn wire_name(&self) -> &'static str {
        match self {
            Self::Outstanding => "outstanding",
            Self::Paid => "paid",
            Self::Contested => "contested",
            Self::Cancelled => "cancelled",
            Self::ResolvedUnpaid => "resolved_unpaid",
            Self::ResolvedDismissed => "resolved_dismissed",
        }
    }

    /// A ticket can be paid while it is still owed.
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Outstanding | Self::ResolvedUnpaid)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TicketStatus {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == value || status.wire_name() == value)
            .ok_or_else(|| LedgerError::UnknownVariant {
                kind: "ticket status",
                value: value.to_string(),
            })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Ticket {
    pub id: TicketId,
    pub issued_to_user_id: UserId,
    pub issued_by_officer_id: UserId,
    pub vehicle_id: Option<u64>,
    pub violation_details: String,
    pub fine_amount: Decimal,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: TicketStatus,
    pub contest_reason: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by_admin_id: Option<UserId>,
    pub banking_transaction_id: Option<TransactionId>,
}
