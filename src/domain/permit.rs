use super::account::UserId;
use super::transaction::TransactionId;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type PermitApplicationId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PermitStatus {
    PendingReview,
    RequiresModification,
    ApprovedPendingPayment,
    PaidAwaitingIssuance,
    Issued,
    Rejected,
    CancelledByUser,
    CancelledByAdmin,
}

impl PermitStatus {
    pub const ALL: [PermitStatus; 8] = [
        Self::PendingReview,
        Self::RequiresModification,
        Self::ApprovedPendingPayment,
        Self::PaidAwaitingIssuance,
        Self::Issued,
        Self::Rejected,
        Self::CancelledByUser,
        Self::CancelledByAdmin,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::PendingReview => "Pending Review",
            Self::RequiresModification => "Requires Modification",
            Self::ApprovedPendingPayment => "Approved - Pending Payment",
            Self::PaidAwaitingIssuance => "Paid - Awaiting Issuance",
            Self::Issued => "Issued",
            Self::Rejected => "Rejected",
            Self::CancelledByUser => "Cancelled by User",
            Self::CancelledByAdmin => "Cancelled by Admin",
        }
    }

    fn wire_name(&self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::RequiresModification => "requires_modification",
            Self::ApprovedPendingPayment => "approved_pending_payment",
            Self::PaidAwaitingIssuance => "paid_awaiting_issuance",
            Self::Issued => "issued",
            Self::Rejected => "rejected",
            Self::CancelledByUser => "cancelled_by_user",
            Self::CancelledByAdmin => "cancelled_by_admin",
        }
    }

    pub fn is_reviewable(&self) -> bool {
        matches!(self, Self::PendingReview | Self::RequiresModification)
    }

    /// The applicant may withdraw until the fee is paid.
    pub fn is_cancellable_by_user(&self) -> bool {
        matches!(
            self,
            Self::PendingReview | Self::RequiresModification | Self::ApprovedPendingPayment
        )
    }
}

impl fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PermitStatus {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == value || status.wire_name() == value)
            .ok_or_else(|| LedgerError::UnknownVariant {
                kind: "permit status",
                value: value.to_string(),
            })
    }
}

/// Outcome of an officer's review.
#[derive(Debug, PartialEq, Clone)]
pub enum ReviewDecision {
    Approve { fee: Decimal },
    Reject,
    RequestModification,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PermitApplication {
    pub id: PermitApplicationId,
    pub user_id: UserId,
    pub vehicle_type: String,
    pub route_details: String,
    pub travel_start: DateTime<Utc>,
    pub travel_end: DateTime<Utc>,
    pub user_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: PermitStatus,
    pub permit_fee: Option<Decimal>,
    pub officer_notes: Option<String>,
    pub reviewed_by_officer_id: Option<UserId>,
    pub banking_transaction_id: Option<TransactionId>,
    pub issued_permit_id: Option<String>,
    pub issued_on: Option<DateTime<Utc>>,
    pub issued_by_officer_id: Option<UserId>,
}

pub fn permit_number(application_id: PermitApplicationId) -> String {
    format!("PRM-{application_id:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_labels() {
        for status in PermitStatus::ALL {
            assert_eq!(status.label().parse::<PermitStatus>().unwrap(), status);
        }
        assert_eq!(
            "approved_pending_payment".parse::<PermitStatus>().unwrap(),
            PermitStatus::ApprovedPendingPayment
        );
        assert!("Approved".parse::<PermitStatus>().is_err());
    }

    #[test]
    fn test_permit_number_is_zero_padded() {
        assert_eq!(permit_number(42), "PRM-000042");
    }
}
