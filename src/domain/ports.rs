use super::account::{Account, AccountId, UserId};
use super::auction::{AuctionBid, AuctionId, AuctionItem};
use super::permit::{PermitApplication, PermitApplicationId};
use super::tax::{TaxBracket, TaxDeductionLog};
use super::ticket::{Ticket, TicketId};
use super::transaction::{Transaction, TransactionId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Id spaces handed out by [`UnitOfWork::next_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Account,
    Transaction,
    TaxBracket,
    TaxLog,
    Auction,
    Bid,
    Ticket,
    Permit,
}

impl Sequence {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Transaction => "transaction",
            Self::TaxBracket => "tax_bracket",
            Self::TaxLog => "tax_log",
            Self::Auction => "auction",
            Self::Bid => "bid",
            Self::Ticket => "ticket",
            Self::Permit => "permit",
        }
    }
}

/// An account row to write, guarded by the version the writer read.
///
/// `expected_version: None` inserts a new account.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub account: Account,
    pub expected_version: Option<u64>,
}

/// A record that must land in the same commit as the ledger rows it refers to.
#[derive(Debug, Clone)]
pub enum Attachment {
    TaxDeduction(TaxDeductionLog),
    Ticket(Ticket),
    Permit(PermitApplication),
    Auction(AuctionItem),
}

/// Everything written by one unit of work. Stores apply all of it or none of it.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub accounts: Vec<AccountWrite>,
    pub transactions: Vec<Transaction>,
    pub attachments: Vec<Attachment>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.transactions.is_empty() && self.attachments.is_empty()
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account(&self, id: AccountId) -> Result<Option<Account>>;
    async fn account_for_user(&self, user_id: UserId) -> Result<Option<Account>>;
    async fn all_accounts(&self) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;
    /// Transactions of one account in commit order.
    async fn transactions_for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn next_id(&self, sequence: Sequence) -> Result<u64>;

    /// Applies the change set atomically.
    ///
    /// Fails with `ConcurrentModification` when an account's stored version no
    /// longer matches `expected_version`, with `AccountExists` when an insert
    /// would give a user a second account, and with `Persistence` for storage
    /// errors. Nothing is written on failure.
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}

#[async_trait]
pub trait TaxStore: Send + Sync {
    async fn save_tax_bracket(&self, bracket: TaxBracket) -> Result<()>;
    async fn tax_brackets(&self) -> Result<Vec<TaxBracket>>;
    async fn clear_tax_brackets(&self) -> Result<()>;
    async fn tax_deduction_logs(&self) -> Result<Vec<TaxDeductionLog>>;
    async fn tax_deduction_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TaxDeductionLog>>;
}

#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn auction(&self, id: AuctionId) -> Result<Option<AuctionItem>>;
    async fn save_auction(&self, auction: AuctionItem) -> Result<()>;
    /// Active auctions whose current end time is at or before `now`.
    async fn due_auctions(&self, now: DateTime<Utc>) -> Result<Vec<AuctionItem>>;
    async fn bids_for_auction(&self, auction_id: AuctionId) -> Result<Vec<AuctionBid>>;
    /// Stores a bid together with the updated auction it was placed on.
    async fn record_bid(&self, bid: AuctionBid, auction: AuctionItem) -> Result<()>;
}

#[async_trait]
pub trait CitationStore: Send + Sync {
    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>>;
    async fn save_ticket(&self, ticket: Ticket) -> Result<()>;
    async fn permit_application(&self, id: PermitApplicationId) -> Result<Option<PermitApplication>>;
    async fn save_permit_application(&self, application: PermitApplication) -> Result<()>;
}

/// The full persistence surface the services depend on.
pub trait Store:
    AccountStore + TransactionStore + UnitOfWork + TaxStore + AuctionStore + CitationStore
{
}

impl<T> Store for T where
    T: AccountStore + TransactionStore + UnitOfWork + TaxStore + AuctionStore + CitationStore
{
}

pub type StoreHandle = Arc<dyn Store>;
