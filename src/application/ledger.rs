use crate::application::locks::{KeyedGuard, KeyedLocks};
use crate::config::LedgerConfig;
use crate::domain::account::{Account, AccountId, UserId};
use crate::domain::money::{Amount, Balance, to_cents};
use crate::domain::ports::{AccountWrite, Attachment, ChangeSet, Sequence, StoreHandle};
use crate::domain::transaction::{Transaction, TransactionKind, check_description};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

/// An account read while holding its exclusive lock.
///
/// The snapshot stays current for as long as the value lives, because every
/// writer must hold the same lock. Dropping it releases the lock.
pub struct LockedAccount {
    account: Account,
    _guard: KeyedGuard<AccountId>,
}

impl LockedAccount {
    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn id(&self) -> AccountId {
        self.account.id
    }

    pub fn balance(&self) -> Balance {
        self.account.balance
    }

    /// Caller-side overdraft check: the balance must cover `required`.
    pub fn ensure_funds(&self, required: Decimal) -> Result<()> {
        if self.account.balance.covers(required) {
            Ok(())
        } else {
            Err(LedgerError::InsufficientFunds {
                account_id: self.account.id,
                required,
                available: self.account.balance.value(),
            })
        }
    }
}

/// Balance versus transaction history for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub ledger_total: Decimal,
    pub transaction_count: usize,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.balance == self.ledger_total
    }
}

/// The only writer of account balances.
///
/// Every posting changes the balance and appends its [`Transaction`] in one
/// commit. The engine does not enforce overdraft policy: `apply` will happily
/// take a balance negative, and callers that need a funds check lock the
/// account, check, then post through `apply_locked`.
pub struct LedgerEngine {
    store: StoreHandle,
    config: LedgerConfig,
    locks: KeyedLocks<AccountId>,
}

impl LedgerEngine {
    pub fn new(store: StoreHandle, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Unlocked read, fine for display but not for a funds check.
    pub async fn account(&self, account_id: AccountId) -> Result<Account> {
        self.store
            .account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    pub async fn account_for_user(&self, user_id: UserId) -> Result<Account> {
        self.store
            .account_for_user(user_id)
            .await?
            .ok_or(LedgerError::NoAccountForUser(user_id))
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.store.all_accounts().await
    }

    /// Takes the account's exclusive lock, then reads it fresh.
    pub async fn lock(&self, account_id: AccountId) -> Result<LockedAccount> {
        let guard = self.locks.lock(account_id).await;
        let account = self.account(account_id).await?;
        Ok(LockedAccount {
            account,
            _guard: guard,
        })
    }

    pub async fn lock_for_user(&self, user_id: UserId) -> Result<LockedAccount> {
        let account_id = self.account_for_user(user_id).await?.id;
        self.lock(account_id).await
    }

    /// Posts `amount` to an account and records the transaction.
    pub async fn apply(
        &self,
        account_id: AccountId,
        amount: Amount,
        kind: TransactionKind,
        description: &str,
    ) -> Result<Transaction> {
        let mut locked = self.lock(account_id).await?;
        self.apply_locked(&mut locked, amount, kind, description).await
    }

    pub async fn apply_locked(
        &self,
        locked: &mut LockedAccount,
        amount: Amount,
        kind: TransactionKind,
        description: &str,
    ) -> Result<Transaction> {
        self.apply_locked_with(locked, amount, kind, description, |_| Ok(Vec::new()))
            .await
    }

    /// Like [`apply_locked`](Self::apply_locked), but `attach` receives the new
    /// transaction and returns records that must be committed alongside it.
    pub async fn apply_locked_with<F>(
        &self,
        locked: &mut LockedAccount,
        amount: Amount,
        kind: TransactionKind,
        description: &str,
        attach: F,
    ) -> Result<Transaction>
    where
        F: FnOnce(&Transaction) -> Result<Vec<Attachment>> + Send,
    {
        kind.check_sign(amount)?;
        check_description(description)?;

        let now = Utc::now();
        let tx = Transaction {
            id: self.store.next_id(Sequence::Transaction).await?,
            account_id: locked.account.id,
            timestamp: now,
            kind,
            amount,
            description: description.to_string(),
        };
        let updated = locked.account.posted(amount, now)?;
        let attachments = attach(&tx)?;

        self.store
            .commit(ChangeSet {
                accounts: vec![AccountWrite {
                    account: updated.clone(),
                    expected_version: Some(locked.account.version),
                }],
                transactions: vec![tx.clone()],
                attachments,
            })
            .await?;

        debug!(
            account = updated.id,
            tx = tx.id,
            %kind,
            %amount,
            balance = %updated.balance,
            "posted"
        );
        locked.account = updated;
        Ok(tx)
    }

    /// Lock, check funds, post, release. `amount` is the positive sum to take.
    pub async fn debit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
        description: &str,
    ) -> Result<Transaction> {
        let amount = Amount::debit(amount)?;
        let mut locked = self.lock(account_id).await?;
        locked.ensure_funds(amount.abs())?;
        self.apply_locked(&mut locked, amount, kind, description).await
    }

    /// Opens an account for `user_id` funded with the configured starting balance.
    pub async fn open_account(&self, user_id: UserId, is_company: bool) -> Result<Account> {
        let starting_balance = self.config.starting_balance;
        self.open_account_with(user_id, is_company, starting_balance)
            .await
    }

    pub async fn open_account_with(
        &self,
        user_id: UserId,
        is_company: bool,
        starting_balance: Decimal,
    ) -> Result<Account> {
        if starting_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "starting balance {starting_balance} is negative"
            )));
        }
        let starting_balance = to_cents(starting_balance)?;
        if self.store.account_for_user(user_id).await?.is_some() {
            return Err(LedgerError::AccountExists(user_id));
        }

        let now = Utc::now();
        let id = self.store.next_id(Sequence::Account).await?;
        let mut account = Account::open(id, user_id, self.config.currency.clone(), is_company, now);
        let mut changes = ChangeSet::default();

        if !starting_balance.is_zero() {
            let amount = Amount::new(starting_balance)?;
            changes.transactions.push(Transaction {
                id: self.store.next_id(Sequence::Transaction).await?,
                account_id: id,
                timestamp: now,
                kind: TransactionKind::InitialSetup,
                amount,
                description: "Initial account setup".to_string(),
            });
            account = account.posted(amount, now)?;
        }
        changes.accounts.push(AccountWrite {
            account: account.clone(),
            expected_version: None,
        });

        self.store.commit(changes).await?;
        info!(account = id, user = user_id, balance = %account.balance, "account opened");
        Ok(account)
    }

    /// Moves `amount` from one account to another in a single commit.
    ///
    /// Both accounts are locked in ascending id order so two opposite
    /// transfers cannot deadlock. The payer must cover the amount.
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        debit_kind: TransactionKind,
        credit_kind: TransactionKind,
        description: &str,
    ) -> Result<(Transaction, Transaction)> {
        if from == to {
            return Err(LedgerError::InvalidState(format!(
                "cannot transfer from account {from} to itself"
            )));
        }
        let debit = Amount::debit(amount)?;
        let credit = -debit;
        debit_kind.check_sign(debit)?;
        credit_kind.check_sign(credit)?;
        check_description(description)?;

        let (payer, payee) = if from < to {
            let payer = self.lock(from).await?;
            (payer, self.lock(to).await?)
        } else {
            let payee = self.lock(to).await?;
            (self.lock(from).await?, payee)
        };
        payer.ensure_funds(debit.abs())?;

        let now = Utc::now();
        let payer_after = payer.account.posted(debit, now)?;
        let payee_after = payee.account.posted(credit, now)?;
        let outgoing = self.transaction(payer.id(), debit, debit_kind, description, now).await?;
        let incoming = self.transaction(payee.id(), credit, credit_kind, description, now).await?;

        self.store
            .commit(ChangeSet {
                accounts: vec![
                    AccountWrite {
                        account: payer_after,
                        expected_version: Some(payer.account.version),
                    },
                    AccountWrite {
                        account: payee_after,
                        expected_version: Some(payee.account.version),
                    },
                ],
                transactions: vec![outgoing.clone(), incoming.clone()],
                attachments: Vec::new(),
            })
            .await?;

        debug!(from, to, %amount, "transferred");
        Ok((outgoing, incoming))
    }

    async fn transaction(
        &self,
        account_id: AccountId,
        amount: Amount,
        kind: TransactionKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        Ok(Transaction {
            id: self.store.next_id(Sequence::Transaction).await?,
            account_id,
            timestamp: now,
            kind,
            amount,
            description: description.to_string(),
        })
    }

    pub async fn reconcile(&self, account_id: AccountId) -> Result<Reconciliation> {
        let account = self.account(account_id).await?;
        self.reconcile_account(&account).await
    }

    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>> {
        let mut results = Vec::new();
        for account in self.store.all_accounts().await? {
            results.push(self.reconcile_account(&account).await?);
        }
        Ok(results)
    }

    async fn reconcile_account(&self, account: &Account) -> Result<Reconciliation> {
        let transactions = self.store.transactions_for_account(account.id).await?;
        let ledger_total: Decimal = transactions.iter().map(|tx| tx.amount.value()).sum();
        Ok(Reconciliation {
            account_id: account.id,
            user_id: account.user_id,
            balance: account.balance.value(),
            ledger_total,
            transaction_count: transactions.len(),
        })
    }
}
