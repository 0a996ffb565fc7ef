use crate::application::ledger::LedgerEngine;
use crate::application::locks::KeyedLocks;
use crate::config::later;
use crate::domain::account::UserId;
use crate::domain::money::{Amount, positive_cents};
use crate::domain::ports::{Attachment, Sequence};
use crate::domain::ticket::{Ticket, TicketId, TicketStatus};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Traffic tickets: issuing, contesting and paying fines.
pub struct TicketDesk {
    ledger: Arc<LedgerEngine>,
    // Status changes are read-modify-write on the ticket row.
    locks: KeyedLocks<TicketId>,
}

impl TicketDesk {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self {
            ledger,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn ticket(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.ledger
            .store()
            .ticket(ticket_id)
            .await?
            .ok_or(LedgerError::not_found("ticket", ticket_id))
    }

    pub async fn issue(
        &self,
        officer: UserId,
        user: UserId,
        vehicle_id: Option<u64>,
        violation_details: &str,
        fine: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Ticket> {
        if officer == user {
            return Err(LedgerError::NotAuthorized(
                "officers cannot ticket themselves".to_string(),
            ));
        }
        let fine_amount = positive_cents(fine, "fine")?;

        let store = self.ledger.store();
        let ticket = Ticket {
            id: store.next_id(Sequence::Ticket).await?,
            issued_to_user_id: user,
            issued_by_officer_id: officer,
            vehicle_id,
            violation_details: violation_details.to_string(),
            fine_amount,
            issue_date: now,
            due_date: later(now, self.ledger.config().ticket_due()?)?,
            status: TicketStatus::Outstanding,
            contest_reason: None,
            resolution_notes: None,
            resolved_by_admin_id: None,
            banking_transaction_id: None,
        };
        store.save_ticket(ticket.clone()).await?;
        info!(ticket = ticket.id, user, officer, fine = %fine_amount, "ticket issued");
        Ok(ticket)
    }

    /// Pays a fine from the recipient's account.
    ///
    /// The funds check runs under the account lock and the ticket flips to
    /// `Paid` in the same commit as the debit.
    pub async fn pay(&self, ticket_id: TicketId, payer: UserId) -> Result<Transaction> {
        let _guard = self.locks.lock(ticket_id).await;
        let ticket = self.ticket(ticket_id).await?;
        if ticket.issued_to_user_id != payer {
            return Err(LedgerError::NotAuthorized(format!(
                "ticket {ticket_id} was not issued to user {payer}"
            )));
        }
        if !ticket.status.is_payable() {
            return Err(LedgerError::InvalidState(format!(
                "ticket {ticket_id} is {} and cannot be paid",
                ticket.status
            )));
        }

        let mut locked = self.ledger.lock_for_user(payer).await?;
        locked.ensure_funds(ticket.fine_amount)?;

        let tx = self
            .ledger
            .apply_locked_with(
                &mut locked,
                Amount::debit(ticket.fine_amount)?,
                TransactionKind::TicketPayment,
                &format!("Payment for Ticket #{ticket_id}"),
                |tx| {
                    let paid = Ticket {
                        status: TicketStatus::Paid,
                        banking_transaction_id: Some(tx.id),
                        ..ticket.clone()
                    };
                    Ok(vec![Attachment::Ticket(paid)])
                },
            )
            .await?;
        info!(ticket = ticket_id, payer, tx = tx.id, "ticket paid");
        Ok(tx)
    }

    pub async fn contest(&self, ticket_id: TicketId, user: UserId, reason: &str) -> Result<Ticket> {
        self.transition(ticket_id, |ticket| {
            if ticket.issued_to_user_id != user {
                return Err(LedgerError::NotAuthorized(format!(
                    "ticket {ticket_id} was not issued to user {user}"
                )));
            }
            if ticket.status != TicketStatus::Outstanding {
                return Err(LedgerError::InvalidState(format!(
                    "only outstanding tickets can be contested, ticket {ticket_id} is {}",
                    ticket.status
                )));
            }
            ticket.status = TicketStatus::Contested;
            ticket.contest_reason = Some(reason.to_string());
            Ok(())
        })
        .await
    }

    /// Rules on a contested ticket. An upheld fine becomes payable again.
    pub async fn resolve(
        &self,
        ticket_id: TicketId,
        admin: UserId,
        fine_upheld: bool,
        notes: &str,
    ) -> Result<Ticket> {
        self.transition(ticket_id, |ticket| {
            if ticket.status != TicketStatus::Contested {
                return Err(LedgerError::InvalidState(format!(
                    "ticket {ticket_id} is {}, not contested",
                    ticket.status
                )));
            }
            ticket.status = if fine_upheld {
                TicketStatus::ResolvedUnpaid
            } else {
                TicketStatus::ResolvedDismissed
            };
            ticket.resolution_notes = Some(notes.to_string());
            ticket.resolved_by_admin_id = Some(admin);
            Ok(())
        })
        .await
    }

    pub async fn cancel(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.transition(ticket_id, |ticket| {
            if !matches!(ticket.status, TicketStatus::Outstanding | TicketStatus::Contested) {
                return Err(LedgerError::InvalidState(format!(
                    "ticket {ticket_id} is {} and cannot be cancelled",
                    ticket.status
                )));
            }
            ticket.status = TicketStatus::Cancelled;
            Ok(())
        })
        .await
    }

    async fn transition<F>(&self, ticket_id: TicketId, change: F) -> Result<Ticket>
    where
        F: FnOnce(&mut Ticket) -> Result<()>,
    {
        let _guard = self.locks.lock(ticket_id).await;
        let mut ticket = self.ticket(ticket_id).await?;
        change(&mut ticket)?;
        self.ledger.store().save_ticket(ticket.clone()).await?;
        info!(ticket = ticket_id, status = %ticket.status, "ticket updated");
        Ok(ticket)
    }
}
