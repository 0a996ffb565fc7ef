use crate::application::ledger::LedgerEngine;
use crate::application::locks::{KeyedGuard, KeyedLocks};
use crate::config::later;
use crate::domain::account::UserId;
use crate::domain::auction::{AuctionBid, AuctionId, AuctionItem, AuctionStatus, winning_bid};
use crate::domain::money::positive_cents;
use crate::domain::ports::Sequence;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Submission, approval and bidding for auction items.
///
/// Bids and the close job serialise on a per-auction lock, so a bid can never
/// land on an auction that is being closed.
pub struct AuctionHouse {
    ledger: Arc<LedgerEngine>,
    locks: KeyedLocks<AuctionId>,
}

impl AuctionHouse {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self {
            ledger,
            locks: KeyedLocks::new(),
        }
    }

    pub(crate) fn ledger(&self) -> &LedgerEngine {
        &self.ledger
    }

    pub(crate) async fn lock(&self, auction_id: AuctionId) -> KeyedGuard<AuctionId> {
        self.locks.lock(auction_id).await
    }

    pub async fn auction(&self, auction_id: AuctionId) -> Result<AuctionItem> {
        self.ledger
            .store()
            .auction(auction_id)
            .await?
            .ok_or(LedgerError::not_found("auction", auction_id))
    }

    pub async fn highest_bid(&self, auction_id: AuctionId) -> Result<Option<AuctionBid>> {
        let bids = self.ledger.store().bids_for_auction(auction_id).await?;
        Ok(winning_bid(&bids).cloned())
    }

    pub async fn submit(
        &self,
        submitter: UserId,
        item_name: &str,
        item_description: Option<String>,
        suggested_starting_bid: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<AuctionItem> {
        if item_name.trim().is_empty() {
            return Err(LedgerError::InvalidState("item name must not be empty".to_string()));
        }
        let suggested_starting_bid = suggested_starting_bid
            .map(|bid| positive_cents(bid, "suggested starting bid"))
            .transpose()?;

        let store = self.ledger.store();
        let auction = AuctionItem {
            id: store.next_id(Sequence::Auction).await?,
            submitter_user_id: submitter,
            admin_approver_id: None,
            item_name: item_name.trim().to_string(),
            item_description,
            suggested_starting_bid,
            starting_bid: None,
            min_bid_increment: None,
            submission_time: now,
            approval_time: None,
            start_time: None,
            original_end_time: None,
            current_end_time: None,
            status: AuctionStatus::PendingApproval,
            admin_notes: None,
            winning_bid_id: None,
            winner_user_id: None,
            winner_payment_transaction_id: None,
            seller_payout_transaction_id: None,
        };
        store.save_auction(auction.clone()).await?;
        info!(auction = auction.id, submitter, "auction submitted");
        Ok(auction)
    }

    /// Starts a pending auction immediately.
    ///
    /// `starting_bid` falls back to the submitter's suggestion and the
    /// increment to the configured default.
    pub async fn approve(
        &self,
        auction_id: AuctionId,
        admin: UserId,
        starting_bid: Option<Decimal>,
        min_increment: Option<Decimal>,
        admin_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AuctionItem> {
        let _guard = self.lock(auction_id).await;
        let mut auction = self.auction(auction_id).await?;
        if auction.status != AuctionStatus::PendingApproval {
            return Err(LedgerError::InvalidState(format!(
                "auction {auction_id} is {}, not pending approval",
                auction.status
            )));
        }

        let settings = &self.ledger.config().auction;
        let starting_bid = starting_bid
            .or(auction.suggested_starting_bid)
            .ok_or_else(|| LedgerError::InvalidBid("a starting bid is required".to_string()))?;
        let increment = min_increment.unwrap_or(settings.default_min_bid_increment);
        let end = later(now, settings.default_duration()?)?;

        auction.starting_bid = Some(positive_cents(starting_bid, "starting bid")?);
        auction.min_bid_increment = Some(positive_cents(increment, "bid increment")?);
        auction.admin_approver_id = Some(admin);
        auction.admin_notes = admin_notes;
        auction.approval_time = Some(now);
        auction.start_time = Some(now);
        auction.original_end_time = Some(end);
        auction.current_end_time = Some(end);
        auction.status = AuctionStatus::Active;

        self.ledger.store().save_auction(auction.clone()).await?;
        info!(auction = auction_id, admin, %end, "auction approved");
        Ok(auction)
    }

    /// Submitters may withdraw a pending item; admins may also stop a live auction.
    pub async fn cancel(&self, auction_id: AuctionId, actor: UserId, is_admin: bool) -> Result<AuctionItem> {
        let _guard = self.lock(auction_id).await;
        let mut auction = self.auction(auction_id).await?;

        if !is_admin && actor != auction.submitter_user_id {
            return Err(LedgerError::NotAuthorized(format!(
                "user {actor} did not submit auction {auction_id}"
            )));
        }
        let cancellable = match auction.status {
            AuctionStatus::PendingApproval => true,
            AuctionStatus::Active => is_admin,
            _ => false,
        };
        if !cancellable {
            return Err(LedgerError::InvalidState(format!(
                "auction {auction_id} cannot be cancelled while {}",
                auction.status
            )));
        }

        auction.status = AuctionStatus::Cancelled;
        self.ledger.store().save_auction(auction.clone()).await?;
        info!(auction = auction_id, actor, "auction cancelled");
        Ok(auction)
    }

    /// Records a bid. No funds are reserved; payment is settled after the auction closes.
    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder: UserId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AuctionBid> {
        let _guard = self.lock(auction_id).await;
        let mut auction = self.auction(auction_id).await?;

        let end = match (auction.status, auction.current_end_time) {
            (AuctionStatus::Active, Some(end)) if now < end => end,
            _ => {
                return Err(LedgerError::InvalidBid(format!(
                    "auction {auction_id} is not open for bidding"
                )));
            }
        };
        if bidder == auction.submitter_user_id {
            return Err(LedgerError::InvalidBid("cannot bid on your own auction".to_string()));
        }
        self.ledger.account_for_user(bidder).await?;

        let amount = positive_cents(amount, "bid")?;
        let store = self.ledger.store();
        let bids = store.bids_for_auction(auction_id).await?;
        let settings = &self.ledger.config().auction;
        let minimum = auction.minimum_next_bid(winning_bid(&bids), settings.default_min_bid_increment);
        if amount < minimum {
            return Err(LedgerError::InvalidBid(format!(
                "bid {amount} is below the minimum of {minimum}"
            )));
        }

        let snipe_window = end
            .checked_sub_signed(settings.anti_snipe_threshold()?)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if now >= snipe_window {
            let extended = later(now, settings.anti_snipe_extension()?)?;
            auction.current_end_time = Some(extended);
            debug!(auction = auction_id, %extended, "late bid extended the auction");
        }

        let bid = AuctionBid {
            id: store.next_id(Sequence::Bid).await?,
            auction_id,
            bidder_user_id: bidder,
            amount,
            bid_time: now,
        };
        store.record_bid(bid.clone(), auction).await?;
        debug!(auction = auction_id, bidder, %amount, "bid placed");
        Ok(bid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::infrastructure::in_memory::InMemoryStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    const SELLER: UserId = 1;
    const ALICE: UserId = 2;
    const BOB: UserId = 3;

    async fn house() -> AuctionHouse {
        let ledger = Arc::new(LedgerEngine::new(
            Arc::new(InMemoryStore::new()),
            LedgerConfig::default(),
        ));
        for user in [SELLER, ALICE, BOB] {
            ledger.open_account(user, false).await.unwrap();
        }
        AuctionHouse::new(ledger)
    }

    async fn live_auction(house: &AuctionHouse, now: DateTime<Utc>) -> AuctionItem {
        let item = house
            .submit(SELLER, "Vintage tractor", None, Some(dec!(50)), now)
            .await
            .unwrap();
        house
            .approve(item.id, 99, None, Some(dec!(5)), None, now)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_approval_starts_the_clock() {
        let house = house().await;
        let now = Utc::now();
        let auction = live_auction(&house, now).await;

        assert_eq!(auction.status, AuctionStatus::Active);
        assert_eq!(auction.starting_bid, Some(dec!(50.00)));
        assert_eq!(auction.current_end_time, Some(now + Duration::hours(24)));
        assert_eq!(auction.original_end_time, auction.current_end_time);
    }

    #[tokio::test]
    async fn test_bid_rules() {
        let house = house().await;
        let now = Utc::now();
        let auction = live_auction(&house, now).await;

        let below_start = house.place_bid(auction.id, ALICE, dec!(49.99), now).await;
        assert!(matches!(below_start, Err(LedgerError::InvalidBid(_))));

        house.place_bid(auction.id, ALICE, dec!(50), now).await.unwrap();

        let below_increment = house.place_bid(auction.id, BOB, dec!(54.99), now).await;
        assert!(matches!(below_increment, Err(LedgerError::InvalidBid(_))));
        house.place_bid(auction.id, BOB, dec!(55), now).await.unwrap();

        let own = house.place_bid(auction.id, SELLER, dec!(100), now).await;
        assert!(matches!(own, Err(LedgerError::InvalidBid(_))));

        let no_account = house.place_bid(auction.id, 42, dec!(100), now).await;
        assert!(matches!(no_account, Err(LedgerError::NoAccountForUser(42))));

        let highest = house.highest_bid(auction.id).await.unwrap().unwrap();
        assert_eq!((highest.bidder_user_id, highest.amount), (BOB, dec!(55.00)));
    }

    #[tokio::test]
    async fn test_late_bid_extends_auction() {
        let house = house().await;
        let start = Utc::now();
        let auction = live_auction(&house, start).await;
        let end = auction.current_end_time.unwrap();

        let early = end - Duration::minutes(10);
        house.place_bid(auction.id, ALICE, dec!(50), early).await.unwrap();
        assert_eq!(house.auction(auction.id).await.unwrap().current_end_time, Some(end));

        let late = end - Duration::seconds(30);
        house.place_bid(auction.id, BOB, dec!(60), late).await.unwrap();
        let extended = house.auction(auction.id).await.unwrap();
        assert_eq!(extended.current_end_time, Some(late + Duration::minutes(5)));
        assert_eq!(extended.original_end_time, Some(end));
    }

    #[tokio::test]
    async fn test_bids_after_end_are_refused() {
        let house = house().await;
        let start = Utc::now();
        let auction = live_auction(&house, start).await;
        let after = auction.current_end_time.unwrap();

        let result = house.place_bid(auction.id, ALICE, dec!(50), after).await;
        assert!(matches!(result, Err(LedgerError::InvalidBid(_))));
    }

    #[tokio::test]
    async fn test_cancellation_rights() {
        let house = house().await;
        let now = Utc::now();

        let pending = house.submit(SELLER, "Plough", None, None, now).await.unwrap();
        assert!(matches!(
            house.cancel(pending.id, ALICE, false).await,
            Err(LedgerError::NotAuthorized(_))
        ));
        let cancelled = house.cancel(pending.id, SELLER, false).await.unwrap();
        assert_eq!(cancelled.status, AuctionStatus::Cancelled);

        let live = live_auction(&house, now).await;
        assert!(matches!(
            house.cancel(live.id, SELLER, false).await,
            Err(LedgerError::InvalidState(_))
        ));
        assert!(house.cancel(live.id, 99, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_approval_requires_a_starting_bid() {
        let house = house().await;
        let now = Utc::now();
        let item = house.submit(SELLER, "Seeds", None, None, now).await.unwrap();

        let result = house.approve(item.id, 99, None, None, None, now).await;
        assert!(matches!(result, Err(LedgerError::InvalidBid(_))));
        assert_eq!(
            house.auction(item.id).await.unwrap().status,
            AuctionStatus::PendingApproval
        );
    }
}
