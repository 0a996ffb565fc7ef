use crate::application::ledger::LedgerEngine;
use crate::application::locks::KeyedLocks;
use crate::domain::account::UserId;
use crate::domain::money::{Amount, positive_cents};
use crate::domain::permit::{
    PermitApplication, PermitApplicationId, PermitStatus, ReviewDecision, permit_number,
};
use crate::domain::ports::{Attachment, Sequence};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Oversize-load permits: application, review, fee payment and issuance.
pub struct PermitOffice {
    ledger: Arc<LedgerEngine>,
    locks: KeyedLocks<PermitApplicationId>,
}

/// What an applicant submits.
#[derive(Debug, Clone)]
pub struct PermitRequest {
    pub vehicle_type: String,
    pub route_details: String,
    pub travel_start: DateTime<Utc>,
    pub travel_end: DateTime<Utc>,
    pub user_notes: Option<String>,
}

impl PermitOffice {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self {
            ledger,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn application(&self, id: PermitApplicationId) -> Result<PermitApplication> {
        self.ledger
            .store()
            .permit_application(id)
            .await?
            .ok_or(LedgerError::not_found("permit application", id))
    }

    pub async fn apply_for_permit(
        &self,
        user: UserId,
        request: PermitRequest,
        now: DateTime<Utc>,
    ) -> Result<PermitApplication> {
        if request.travel_end < request.travel_start {
            return Err(LedgerError::InvalidState(
                "travel end must not precede travel start".to_string(),
            ));
        }
        let store = self.ledger.store();
        let application = PermitApplication {
            id: store.next_id(Sequence::Permit).await?,
            user_id: user,
            vehicle_type: request.vehicle_type,
            route_details: request.route_details,
            travel_start: request.travel_start,
            travel_end: request.travel_end,
            user_notes: request.user_notes,
            created_at: now,
            status: PermitStatus::PendingReview,
            permit_fee: None,
            officer_notes: None,
            reviewed_by_officer_id: None,
            banking_transaction_id: None,
            issued_permit_id: None,
            issued_on: None,
            issued_by_officer_id: None,
        };
        store.save_permit_application(application.clone()).await?;
        info!(application = application.id, user, "permit application submitted");
        Ok(application)
    }

    pub async fn review(
        &self,
        id: PermitApplicationId,
        officer: UserId,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<PermitApplication> {
        self.transition(id, |application| {
            if !application.status.is_reviewable() {
                return Err(LedgerError::InvalidState(format!(
                    "application {id} is {} and cannot be reviewed",
                    application.status
                )));
            }
            application.status = match decision {
                ReviewDecision::Approve { fee } => {
                    application.permit_fee = Some(positive_cents(fee, "permit fee")?);
                    PermitStatus::ApprovedPendingPayment
                }
                ReviewDecision::Reject => PermitStatus::Rejected,
                ReviewDecision::RequestModification => PermitStatus::RequiresModification,
            };
            application.reviewed_by_officer_id = Some(officer);
            application.officer_notes = notes;
            Ok(())
        })
        .await
    }

    /// Pays the approved fee; the application advances in the same commit as the debit.
    pub async fn pay(&self, id: PermitApplicationId, payer: UserId) -> Result<Transaction> {
        let _guard = self.locks.lock(id).await;
        let application = self.application(id).await?;
        if application.user_id != payer {
            return Err(LedgerError::NotAuthorized(format!(
                "application {id} does not belong to user {payer}"
            )));
        }
        if application.status != PermitStatus::ApprovedPendingPayment {
            return Err(LedgerError::InvalidState(format!(
                "application {id} is {}, not awaiting payment",
                application.status
            )));
        }
        let fee = application
            .permit_fee
            .filter(|fee| fee.is_sign_positive() && !fee.is_zero())
            .ok_or_else(|| LedgerError::InvalidState(format!("application {id} has no fee set")))?;

        let mut locked = self.ledger.lock_for_user(payer).await?;
        locked.ensure_funds(fee)?;

        let tx = self
            .ledger
            .apply_locked_with(
                &mut locked,
                Amount::debit(fee)?,
                TransactionKind::PermitFeePayment,
                &format!("Payment for Permit Application #{id}"),
                |tx| {
                    let paid = PermitApplication {
                        status: PermitStatus::PaidAwaitingIssuance,
                        banking_transaction_id: Some(tx.id),
                        ..application.clone()
                    };
                    Ok(vec![Attachment::Permit(paid)])
                },
            )
            .await?;
        info!(application = id, payer, tx = tx.id, "permit fee paid");
        Ok(tx)
    }

    pub async fn issue(
        &self,
        id: PermitApplicationId,
        officer: UserId,
        now: DateTime<Utc>,
    ) -> Result<PermitApplication> {
        self.transition(id, |application| {
            if application.status != PermitStatus::PaidAwaitingIssuance {
                return Err(LedgerError::InvalidState(format!(
                    "application {id} is {}, not paid",
                    application.status
                )));
            }
            application.status = PermitStatus::Issued;
            application.issued_permit_id = Some(permit_number(id));
            application.issued_on = Some(now);
            application.issued_by_officer_id = Some(officer);
            Ok(())
        })
        .await
    }

    pub async fn cancel_by_user(&self, id: PermitApplicationId, user: UserId) -> Result<PermitApplication> {
        self.transition(id, |application| {
            if application.user_id != user {
                return Err(LedgerError::NotAuthorized(format!(
                    "application {id} does not belong to user {user}"
                )));
            }
            if !application.status.is_cancellable_by_user() {
                return Err(LedgerError::InvalidState(format!(
                    "application {id} is {} and can no longer be cancelled",
                    application.status
                )));
            }
            application.status = PermitStatus::CancelledByUser;
            Ok(())
        })
        .await
    }

    async fn transition<F>(&self, id: PermitApplicationId, change: F) -> Result<PermitApplication>
    where
        F: FnOnce(&mut PermitApplication) -> Result<()>,
    {
        let _guard = self.locks.lock(id).await;
        let mut application = self.application(id).await?;
        change(&mut application)?;
        self.ledger
            .store()
            .save_permit_application(application.clone())
            .await?;
        info!(application = id, status = %application.status, "permit application updated");
        Ok(application)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::infrastructure::in_memory::InMemoryStore;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const OFFICER: UserId = 10;
    const HAULER: UserId = 20;

    async fn office(balance: Decimal) -> (PermitOffice, Arc<LedgerEngine>) {
        let ledger = Arc::new(LedgerEngine::new(
            Arc::new(InMemoryStore::new()),
            LedgerConfig::default(),
        ));
        ledger.open_account_with(HAULER, true, balance).await.unwrap();
        (PermitOffice::new(ledger.clone()), ledger)
    }

    fn request(now: DateTime<Utc>) -> PermitRequest {
        PermitRequest {
            vehicle_type: "Lowboy trailer".to_string(),
            route_details: "Farm 3 to harbour via north road".to_string(),
            travel_start: now + Duration::days(1),
            travel_end: now + Duration::days(2),
            user_notes: None,
        }
    }

    #[tokio::test]
    async fn test_full_permit_lifecycle() {
        let (office, ledger) = office(dec!(500)).await;
        let now = Utc::now();
        let application = office.apply_for_permit(HAULER, request(now), now).await.unwrap();
        assert_eq!(application.status, PermitStatus::PendingReview);

        office
            .review(application.id, OFFICER, ReviewDecision::Approve { fee: dec!(120) }, None)
            .await
            .unwrap();
        let tx = office.pay(application.id, HAULER).await.unwrap();
        assert_eq!(tx.kind, TransactionKind::PermitFeePayment);
        assert_eq!(tx.amount.value(), dec!(-120.00));
        assert_eq!(
            tx.description,
            format!("Payment for Permit Application #{}", application.id)
        );

        let paid = office.application(application.id).await.unwrap();
        assert_eq!(paid.status, PermitStatus::PaidAwaitingIssuance);
        assert_eq!(paid.banking_transaction_id, Some(tx.id));

        let issued = office.issue(application.id, OFFICER, now).await.unwrap();
        assert_eq!(issued.status, PermitStatus::Issued);
        assert_eq!(issued.issued_permit_id, Some(permit_number(application.id)));
        assert_eq!(
            ledger.account_for_user(HAULER).await.unwrap().balance.value(),
            dec!(380.00)
        );
    }

    #[tokio::test]
    async fn test_unapproved_application_cannot_be_paid() {
        let (office, _) = office(dec!(500)).await;
        let now = Utc::now();
        let application = office.apply_for_permit(HAULER, request(now), now).await.unwrap();

        assert!(matches!(
            office.pay(application.id, HAULER).await,
            Err(LedgerError::InvalidState(_))
        ));
        assert!(matches!(
            office.issue(application.id, OFFICER, now).await,
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_fee_needs_funds() {
        let (office, _) = office(dec!(50)).await;
        let now = Utc::now();
        let application = office.apply_for_permit(HAULER, request(now), now).await.unwrap();
        office
            .review(application.id, OFFICER, ReviewDecision::Approve { fee: dec!(75) }, None)
            .await
            .unwrap();

        assert!(matches!(
            office.pay(application.id, HAULER).await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
        assert_eq!(
            office.application(application.id).await.unwrap().status,
            PermitStatus::ApprovedPendingPayment
        );
    }

    #[tokio::test]
    async fn test_review_outcomes() {
        let (office, _) = office(dec!(0)).await;
        let now = Utc::now();
        let application = office.apply_for_permit(HAULER, request(now), now).await.unwrap();

        assert!(matches!(
            office
                .review(application.id, OFFICER, ReviewDecision::Approve { fee: dec!(0) }, None)
                .await,
            Err(LedgerError::InvalidAmount(_))
        ));
        let revised = office
            .review(
                application.id,
                OFFICER,
                ReviewDecision::RequestModification,
                Some("Route crosses the old bridge".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(revised.status, PermitStatus::RequiresModification);

        let rejected = office
            .review(application.id, OFFICER, ReviewDecision::Reject, None)
            .await
            .unwrap();
        assert_eq!(rejected.status, PermitStatus::Rejected);
        assert!(office
            .review(application.id, OFFICER, ReviewDecision::Reject, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_user_cancellation_stops_at_payment() {
        let (office, _) = office(dec!(500)).await;
        let now = Utc::now();
        let open = office.apply_for_permit(HAULER, request(now), now).await.unwrap();
        assert!(matches!(
            office.cancel_by_user(open.id, OFFICER).await,
            Err(LedgerError::NotAuthorized(_))
        ));
        let cancelled = office.cancel_by_user(open.id, HAULER).await.unwrap();
        assert_eq!(cancelled.status, PermitStatus::CancelledByUser);

        let paid = office.apply_for_permit(HAULER, request(now), now).await.unwrap();
        office
            .review(paid.id, OFFICER, ReviewDecision::Approve { fee: dec!(10) }, None)
            .await
            .unwrap();
        office.pay(paid.id, HAULER).await.unwrap();
        assert!(matches!(
            office.cancel_by_user(paid.id, HAULER).await,
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_applications_lock_independently() {
        let (office, _) = office(dec!(500)).await;
        let now = Utc::now();
        let first = office.apply_for_permit(HAULER, request(now), now).await.unwrap();
        let second = office.apply_for_permit(HAULER, request(now), now).await.unwrap();

        let _held = office.locks.lock(first.id).await;
        let reviewed = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            office.review(second.id, OFFICER, ReviewDecision::Reject, None),
        )
        .await
        .expect("an unrelated application should not wait")
        .unwrap();
        assert_eq!(reviewed.status, PermitStatus::Rejected);
    }
}
