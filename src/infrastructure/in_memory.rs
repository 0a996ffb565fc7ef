use crate::domain::account::{Account, AccountId, UserId};
use crate::domain::auction::{AuctionBid, AuctionId, AuctionItem, BidId};
use crate::domain::permit::{PermitApplication, PermitApplicationId};
use crate::domain::ports::{
    AccountStore, Attachment, AuctionStore, ChangeSet, CitationStore, Sequence, TaxStore,
    TransactionStore, UnitOfWork,
};
use crate::domain::tax::{TaxBracket, TaxBracketId, TaxDeductionLog, TaxDeductionLogId};
use crate::domain::ticket::{Ticket, TicketId};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    accounts: BTreeMap<AccountId, Account>,
    transactions: BTreeMap<TransactionId, Transaction>,
    brackets: BTreeMap<TaxBracketId, TaxBracket>,
    tax_logs: BTreeMap<TaxDeductionLogId, TaxDeductionLog>,
    auctions: BTreeMap<AuctionId, AuctionItem>,
    bids: BTreeMap<BidId, AuctionBid>,
    tickets: BTreeMap<TicketId, Ticket>,
    permits: BTreeMap<PermitApplicationId, PermitApplication>,
    sequences: HashMap<Sequence, u64>,
    #[cfg(test)]
    failing_accounts: HashSet<AccountId>,
    #[cfg(test)]
    failing_auctions: HashSet<AuctionId>,
}

impl State {
    fn user_has_account(&self, user_id: UserId) -> bool {
        self.accounts.values().any(|a| a.user_id == user_id)
    }

    /// Checks a change set against the current state without writing anything.
    fn validate(&self, changes: &ChangeSet) -> Result<()> {
        #[cfg(test)]
        {
            let touched = changes
                .accounts
                .iter()
                .map(|w| w.account.id)
                .chain(changes.transactions.iter().map(|t| t.account_id));
            for account_id in touched {
                if self.failing_accounts.contains(&account_id) {
                    return Err(LedgerError::persistence(format!(
                        "simulated write failure for account {account_id}"
                    )));
                }
            }
            for attachment in &changes.attachments {
                if let Attachment::Auction(auction) = attachment
                    && self.failing_auctions.contains(&auction.id)
                {
                    return Err(LedgerError::persistence(format!(
                        "simulated write failure for auction {}",
                        auction.id
                    )));
                }
            }
        }

        let mut inserted_users = HashSet::new();
        for write in &changes.accounts {
            let account = &write.account;
            match (write.expected_version, self.accounts.get(&account.id)) {
                (None, Some(_)) => {
                    return Err(LedgerError::persistence(format!(
                        "account id {} is already taken",
                        account.id
                    )));
                }
                (None, None) => {
                    if self.user_has_account(account.user_id)
                        || !inserted_users.insert(account.user_id)
                    {
                        return Err(LedgerError::AccountExists(account.user_id));
                    }
                }
                (Some(_), None) => return Err(LedgerError::AccountNotFound(account.id)),
                (Some(expected), Some(stored)) => {
                    if stored.version != expected {
                        return Err(LedgerError::ConcurrentModification(account.id));
                    }
                }
            }
        }

        for tx in &changes.transactions {
            if self.transactions.contains_key(&tx.id) {
                return Err(LedgerError::persistence(format!(
                    "transaction {} already exists",
                    tx.id
                )));
            }
            let written = changes.accounts.iter().any(|w| w.account.id == tx.account_id);
            if !written && !self.accounts.contains_key(&tx.account_id) {
                return Err(LedgerError::AccountNotFound(tx.account_id));
            }
        }

        for attachment in &changes.attachments {
            if let Attachment::TaxDeduction(log) = attachment
                && self
                    .tax_logs
                    .values()
                    .any(|l| l.banking_transaction_id == log.banking_transaction_id)
            {
                return Err(LedgerError::persistence(format!(
                    "transaction {} already has a tax deduction log",
                    log.banking_transaction_id
                )));
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for write in changes.accounts {
            self.accounts.insert(write.account.id, write.account);
        }
        for tx in changes.transactions {
            self.transactions.insert(tx.id, tx);
        }
        for attachment in changes.attachments {
            match attachment {
                Attachment::TaxDeduction(log) => {
                    self.tax_logs.insert(log.id, log);
                }
                Attachment::Ticket(ticket) => {
                    self.tickets.insert(ticket.id, ticket);
                }
                Attachment::Permit(application) => {
                    self.permits.insert(application.id, application);
                }
                Attachment::Auction(auction) => {
                    self.auctions.insert(auction.id, auction);
                }
            }
        }
    }
}

/// A thread-safe in-memory store for every ledger table.
///
/// All tables sit behind a single `RwLock`, so a commit is validated and
/// applied while holding the write guard and readers never observe half of it.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later commit touching `account_id` fail with a persistence error.
    #[cfg(test)]
    pub(crate) async fn fail_commits_for(&self, account_id: AccountId) {
        self.state.write().await.failing_accounts.insert(account_id);
    }

    #[cfg(test)]
    pub(crate) async fn fail_auction_commits(&self, auction_id: AuctionId) {
        self.state.write().await.failing_auctions.insert(auction_id);
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn account_for_user(&self, user_id: UserId) -> Result<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.values().find(|a| a.user_id == user_id).cloned())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.state.read().await.accounts.values().cloned().collect())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn transactions_for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .filter(|tx| tx.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn next_id(&self, sequence: Sequence) -> Result<u64> {
        let mut state = self.state.write().await;
        let counter = state.sequences.entry(sequence).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut state = self.state.write().await;
        state.validate(&changes)?;
        state.apply(changes);
        Ok(())
    }
}

#[async_trait]
impl TaxStore for InMemoryStore {
    async fn save_tax_bracket(&self, bracket: TaxBracket) -> Result<()> {
        self.state.write().await.brackets.insert(bracket.id, bracket);
        Ok(())
    }

    async fn tax_brackets(&self) -> Result<Vec<TaxBracket>> {
        Ok(self.state.read().await.brackets.values().cloned().collect())
    }

    async fn clear_tax_brackets(&self) -> Result<()> {
        self.state.write().await.brackets.clear();
        Ok(())
    }

    async fn tax_deduction_logs(&self) -> Result<Vec<TaxDeductionLog>> {
        Ok(self.state.read().await.tax_logs.values().cloned().collect())
    }

    async fn tax_deduction_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TaxDeductionLog>> {
        let state = self.state.read().await;
        Ok(state
            .tax_logs
            .values()
            .find(|log| log.banking_transaction_id == transaction_id)
            .cloned())
    }
}

#[async_trait]
impl AuctionStore for InMemoryStore {
    async fn auction(&self, id: AuctionId) -> Result<Option<AuctionItem>> {
        Ok(self.state.read().await.auctions.get(&id).cloned())
    }

    async fn save_auction(&self, auction: AuctionItem) -> Result<()> {
        self.state.write().await.auctions.insert(auction.id, auction);
        Ok(())
    }

    async fn due_auctions(&self, now: DateTime<Utc>) -> Result<Vec<AuctionItem>> {
        let state = self.state.read().await;
        Ok(state
            .auctions
            .values()
            .filter(|auction| auction.is_due(now))
            .cloned()
            .collect())
    }

    async fn bids_for_auction(&self, auction_id: AuctionId) -> Result<Vec<AuctionBid>> {
        let state = self.state.read().await;
        Ok(state
            .bids
            .values()
            .filter(|bid| bid.auction_id == auction_id)
            .cloned()
            .collect())
    }

    async fn record_bid(&self, bid: AuctionBid, auction: AuctionItem) -> Result<()> {
        let mut state = self.state.write().await;
        if state.bids.contains_key(&bid.id) {
            return Err(LedgerError::persistence(format!("bid {} already exists", bid.id)));
        }
        state.bids.insert(bid.id, bid);
        state.auctions.insert(auction.id, auction);
        Ok(())
    }
}

#[async_trait]
impl CitationStore for InMemoryStore {
    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        Ok(self.state.read().await.tickets.get(&id).cloned())
    }

    async fn save_ticket(&self, ticket: Ticket) -> Result<()> {
        self.state.write().await.tickets.insert(ticket.id, ticket);
        Ok(())
    }

    async fn permit_application(&self, id: PermitApplicationId) -> Result<Option<PermitApplication>> {
        Ok(self.state.read().await.permits.get(&id).cloned())
    }

    async fn save_permit_application(&self, application: PermitApplication) -> Result<()> {
        self.state
            .write()
            .await
            .permits
            .insert(application.id, application);
        Ok(())
    }
}
