use crate::application::auctions::AuctionHouse;
use crate::application::locks::{Job, JobLocks};
use crate::domain::auction::{AuctionId, AuctionStatus, winning_bid};
use crate::domain::ports::{Attachment, ChangeSet};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloseReport {
    pub closed_with_winner: usize,
    pub expired_no_bids: usize,
    pub failed: usize,
}

enum Outcome {
    Sold,
    Expired,
    /// Extended or cancelled after the scan.
    NotDue,
}

/// Finalises auctions whose end time has passed.
///
/// Winners are recorded but not charged: the auction moves to
/// `sold_awaiting_payment` and no ledger posting is made.
pub struct AuctionCloser {
    house: Arc<AuctionHouse>,
    jobs: Arc<JobLocks>,
}

impl AuctionCloser {
    pub fn new(house: Arc<AuctionHouse>, jobs: Arc<JobLocks>) -> Self {
        Self { house, jobs }
    }

    pub async fn close_due_auctions(&self, now: DateTime<Utc>) -> Result<CloseReport> {
        let _running = self.jobs.try_acquire(Job::AuctionClose)?;
        info!(%now, "closing due auctions");

        let due = self.house.ledger().store().due_auctions(now).await?;
        let mut report = CloseReport::default();
        if due.is_empty() {
            info!("no active auctions have reached their end time");
            return Ok(report);
        }

        for auction in due {
            match self.close(auction.id, now).await {
                Ok(Outcome::Sold) => report.closed_with_winner += 1,
                Ok(Outcome::Expired) => report.expired_no_bids += 1,
                Ok(Outcome::NotDue) => {}
                Err(e) => {
                    warn!(auction = auction.id, error = %e, "failed to close auction");
                    report.failed += 1;
                }
            }
        }

        info!(
            sold = report.closed_with_winner,
            expired = report.expired_no_bids,
            failed = report.failed,
            "auction close finished"
        );
        Ok(report)
    }

    async fn close(&self, auction_id: AuctionId, now: DateTime<Utc>) -> Result<Outcome> {
        let _guard = self.house.lock(auction_id).await;
        let mut auction = self.house.auction(auction_id).await?;
        if !auction.is_due(now) {
            debug!(auction = auction_id, "no longer due, skipping");
            return Ok(Outcome::NotDue);
        }

        let store = self.house.ledger().store();
        let bids = store.bids_for_auction(auction_id).await?;
        let outcome = match winning_bid(&bids) {
            Some(bid) => {
                auction.status = AuctionStatus::SoldAwaitingPayment;
                auction.winning_bid_id = Some(bid.id);
                auction.winner_user_id = Some(bid.bidder_user_id);
                info!(
                    auction = auction_id,
                    winner = bid.bidder_user_id,
                    amount = %bid.amount,
                    "auction sold"
                );
                Outcome::Sold
            }
            None => {
                auction.status = AuctionStatus::ExpiredNoBids;
                info!(auction = auction_id, "auction expired with no bids");
                Outcome::Expired
            }
        };

        store
            .commit(ChangeSet {
                attachments: vec![Attachment::Auction(auction)],
                ..ChangeSet::default()
            })
            .await?;
        Ok(outcome)
    }
}
