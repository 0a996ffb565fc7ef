use crate::domain::account::{Account, AccountId, UserId};
use crate::domain::auction::{AuctionBid, AuctionId, AuctionItem};
use crate::domain::permit::{PermitApplication, PermitApplicationId};
use crate::domain::ports::{
    AccountStore, Attachment, AuctionStore, ChangeSet, CitationStore, Sequence, TaxStore,
    TransactionStore, UnitOfWork,
};
use crate::domain::tax::{TaxBracket, TaxDeductionLog};
use crate::domain::ticket::{Ticket, TicketId};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_ACCOUNTS: &str = "accounts";
/// user id -> account id, enforces one account per user.
pub const CF_USER_ACCOUNTS: &str = "user_accounts";
pub const CF_TRANSACTIONS: &str = "transactions";
pub const CF_TAX_BRACKETS: &str = "tax_brackets";
/// Keyed by the banking transaction id, which makes the back-reference unique.
pub const CF_TAX_LOGS: &str = "tax_logs";
pub const CF_AUCTIONS: &str = "auctions";
pub const CF_BIDS: &str = "bids";
pub const CF_TICKETS: &str = "tickets";
pub const CF_PERMITS: &str = "permits";
/// Sequence counters.
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 10] = [
    CF_ACCOUNTS,
    CF_USER_ACCOUNTS,
    CF_TRANSACTIONS,
    CF_TAX_BRACKETS,
    CF_TAX_LOGS,
    CF_AUCTIONS,
    CF_BIDS,
    CF_TICKETS,
    CF_PERMITS,
    CF_META,
];

/// A persistent store backed by RocksDB.
///
/// Every table lives in its own column family with big-endian `u64` keys and
/// JSON values. Multi-row writes go through a single `WriteBatch`, and
/// `write_lock` serialises the read-validate-write sequence of concurrent
/// commits within the process. RocksDB's own file lock keeps other processes out.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a database at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::persistence(format!("column family '{name}' not found")))
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: u64) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains(&self, cf_name: &str, key: u64) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key.to_be_bytes())?.is_some())
    }

    /// Every value in a column family, in key order.
    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn put<T: Serialize>(&self, batch: &mut WriteBatch, cf_name: &str, key: u64, value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key.to_be_bytes(), serde_json::to_vec(value)?);
        Ok(())
    }

    fn user_account_id(&self, user_id: UserId) -> Result<Option<AccountId>> {
        self.get(CF_USER_ACCOUNTS, user_id)
    }

    fn validate(&self, changes: &ChangeSet) -> Result<()> {
        let mut inserted_users = HashSet::new();
        for write in &changes.accounts {
            let account = &write.account;
            let stored: Option<Account> = self.get(CF_ACCOUNTS, account.id)?;
            match (write.expected_version, stored) {
                (None, Some(_)) => {
                    return Err(LedgerError::persistence(format!(
                        "account id {} is already taken",
                        account.id
                    )));
                }
                (None, None) => {
                    if self.user_account_id(account.user_id)?.is_some()
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
            if self.contains(CF_TRANSACTIONS, tx.id)? {
                return Err(LedgerError::persistence(format!(
                    "transaction {} already exists",
                    tx.id
                )));
            }
            let written = changes.accounts.iter().any(|w| w.account.id == tx.account_id);
            if !written && !self.contains(CF_ACCOUNTS, tx.account_id)? {
                return Err(LedgerError::AccountNotFound(tx.account_id));
            }
        }

        for attachment in &changes.attachments {
            if let Attachment::TaxDeduction(log) = attachment
                && self.contains(CF_TAX_LOGS, log.banking_transaction_id)?
            {
                return Err(LedgerError::persistence(format!(
                    "transaction {} already has a tax deduction log",
                    log.banking_transaction_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for RocksDbStore {
    async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        self.get(CF_ACCOUNTS, id)
    }

    async fn account_for_user(&self, user_id: UserId) -> Result<Option<Account>> {
        match self.user_account_id(user_id)? {
            Some(account_id) => self.get(CF_ACCOUNTS, account_id),
            None => Ok(None),
        }
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        self.scan(CF_ACCOUNTS)
    }
}

#[async_trait]
impl TransactionStore for RocksDbStore {
    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.get(CF_TRANSACTIONS, id)
    }

    async fn transactions_for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        let all: Vec<Transaction> = self.scan(CF_TRANSACTIONS)?;
        Ok(all.into_iter().filter(|tx| tx.account_id == account_id).collect())
    }
}

#[async_trait]
impl UnitOfWork for RocksDbStore {
    async fn next_id(&self, sequence: Sequence) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_META)?;
        let key = sequence.name().as_bytes();

        let current = match self.db.get_cf(cf, key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    LedgerError::persistence(format!("corrupt '{}' sequence", sequence.name()))
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = current + 1;
        self.db.put_cf(cf, key, next.to_be_bytes())?;
        Ok(next)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.validate(&changes)?;

        let mut batch = WriteBatch::default();
        for write in &changes.accounts {
            let account = &write.account;
            self.put(&mut batch, CF_ACCOUNTS, account.id, account)?;
            if write.expected_version.is_none() {
                self.put(&mut batch, CF_USER_ACCOUNTS, account.user_id, &account.id)?;
            }
        }
        for tx in &changes.transactions {
            self.put(&mut batch, CF_TRANSACTIONS, tx.id, tx)?;
        }
        for attachment in &changes.attachments {
            match attachment {
                Attachment::TaxDeduction(log) => {
                    self.put(&mut batch, CF_TAX_LOGS, log.banking_transaction_id, log)?
                }
                Attachment::Ticket(ticket) => self.put(&mut batch, CF_TICKETS, ticket.id, ticket)?,
                Attachment::Permit(application) => {
                    self.put(&mut batch, CF_PERMITS, application.id, application)?
                }
                Attachment::Auction(auction) => {
                    self.put(&mut batch, CF_AUCTIONS, auction.id, auction)?
                }
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl TaxStore for RocksDbStore {
    async fn save_tax_bracket(&self, bracket: TaxBracket) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_TAX_BRACKETS, bracket.id, &bracket)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn tax_brackets(&self) -> Result<Vec<TaxBracket>> {
        self.scan(CF_TAX_BRACKETS)
    }

    async fn clear_tax_brackets(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_TAX_BRACKETS)?;
        let mut batch = WriteBatch::default();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _value) = item?;
            batch.delete_cf(cf, key);
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn tax_deduction_logs(&self) -> Result<Vec<TaxDeductionLog>> {
        let mut logs: Vec<TaxDeductionLog> = self.scan(CF_TAX_LOGS)?;
        logs.sort_by_key(|log| log.id);
        Ok(logs)
    }

    async fn tax_deduction_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TaxDeductionLog>> {
        self.get(CF_TAX_LOGS, transaction_id)
    }
}

#[async_trait]
impl AuctionStore for RocksDbStore {
    async fn auction(&self, id: AuctionId) -> Result<Option<AuctionItem>> {
        self.get(CF_AUCTIONS, id)
    }

    async fn save_auction(&self, auction: AuctionItem) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_AUCTIONS, auction.id, &auction)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn due_auctions(&self, now: DateTime<Utc>) -> Result<Vec<AuctionItem>> {
        let all: Vec<AuctionItem> = self.scan(CF_AUCTIONS)?;
        Ok(all.into_iter().filter(|auction| auction.is_due(now)).collect())
    }

    async fn bids_for_auction(&self, auction_id: AuctionId) -> Result<Vec<AuctionBid>> {
        let all: Vec<AuctionBid> = self.scan(CF_BIDS)?;
        Ok(all.into_iter().filter(|bid| bid.auction_id == auction_id).collect())
    }

    async fn record_bid(&self, bid: AuctionBid, auction: AuctionItem) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.contains(CF_BIDS, bid.id)? {
            return Err(LedgerError::persistence(format!("bid {} already exists", bid.id)));
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_BIDS, bid.id, &bid)?;
        self.put(&mut batch, CF_AUCTIONS, auction.id, &auction)?;
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl CitationStore for RocksDbStore {
    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.get(CF_TICKETS, id)
    }

    async fn save_ticket(&self, ticket: Ticket) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_TICKETS, ticket.id, &ticket)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn permit_application(&self, id: PermitApplicationId) -> Result<Option<PermitApplication>> {
        self.get(CF_PERMITS, id)
    }

    async fn save_permit_application(&self, application: PermitApplication) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_PERMITS, application.id, &application)?;
        self.db.write(batch)?;
        Ok(())
    }
}
