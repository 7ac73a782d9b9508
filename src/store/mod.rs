use thiserror::Error;

use crate::account::{Account, AccountDraft, AccountId, User, UserId};
use crate::transaction::{Transaction, TransactionDraft};

pub mod in_memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account {0} does not exist")]
    AccountNotFound(AccountId),
    #[error("User {0} does not exist")]
    UserNotFound(UserId),
    #[error("Account number `{0}` is already taken")]
    DuplicateAccountNumber(String),
    #[error("Transaction reference `{0}` is already taken")]
    DuplicateReference(String),
    #[error("Username `{0}` is already taken")]
    DuplicateUsername(String),
    #[error("Storage backend is unavailable")]
    Unavailable,
}

/// One unit of work against the store. Reads see committed state only;
/// staged writes become visible all at once when the unit commits.
pub trait AtomicUnit {
    /// Committed state of an account locked by this unit.
    fn account(&self, id: AccountId) -> Result<&Account, StoreError>;

    /// Stages an entry. At commit its signed amount is added to the
    /// account balance and the entry is appended to the journal.
    fn stage(&mut self, draft: TransactionDraft);
}

/// Durable keyed storage for the ledger. Implementations must tolerate
/// concurrent callers: every method takes `&self`, and operations on
/// disjoint accounts must not serialize each other.
pub trait LedgerStore: Send + Sync {
    /// Adds a user directory entry with a unique username.
    fn create_user(&self, username: &str) -> Result<User, StoreError>;

    fn user(&self, id: UserId) -> Result<User, StoreError>;

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Persists a new account, rejecting duplicate account numbers.
    fn create_account(&self, draft: AccountDraft) -> Result<Account, StoreError>;

    fn account(&self, id: AccountId) -> Result<Account, StoreError>;

    /// All accounts owned by a user, in creation order.
    fn accounts_by_user(&self, user_id: UserId) -> Result<Vec<Account>, StoreError>;

    /// A user's entries across all accounts, most recent first.
    fn transactions_by_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// An account's entries, most recent first.
    fn transactions_by_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Runs `unit` with exclusive access to `accounts` and commits its
    /// staged entries together with their balance updates. Either the whole
    /// unit is applied or none of it: a unit error, an unknown account or a
    /// duplicate reference leaves the store untouched. Returns the
    /// committed entries in staging order.
    fn run_atomic<E, F>(&self, accounts: &[AccountId], unit: F) -> Result<Vec<Transaction>, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn AtomicUnit) -> Result<(), E>;
}
