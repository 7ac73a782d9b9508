use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::{
    Account, AccountDraft, AccountError, AccountId, AccountKind, DEFAULT_CURRENCY, User, UserId,
};
use crate::reference::{MAX_GENERATION_ATTEMPTS, RandomReferences, ReferenceSource};
use crate::store::{LedgerStore, StoreError};
use crate::transaction::{Transaction, TransactionDraft, TransactionError, TransactionKind};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("No user named `{0}`")]
    RecipientNotFound(String),
    #[error("Sender has no account to transfer from")]
    NoSenderAccount,
    #[error("Recipient does not have an account")]
    NoRecipientAccount,
    #[error("Gave up looking for an unused account number")]
    AccountNumberExhausted,
    #[error("Gave up looking for an unused transaction reference")]
    ReferenceExhausted,
}

/// The operations facade over a [`LedgerStore`].
///
/// One instance is shared by all request handlers (`Arc<Ledger<_>>`); every
/// operation takes `&self` and delegates its atomicity to the store, so
/// balances are never cached across calls.
pub struct Ledger<S> {
    store: S,
    references: Box<dyn ReferenceSource>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self::with_references(store, Box::new(RandomReferences))
    }

    /// Swaps the identifier source. Tests use this to force collisions.
    pub fn with_references(store: S, references: Box<dyn ReferenceSource>) -> Self {
        Self { store, references }
    }

    /// Adds a user to the directory so transfers can resolve the username.
    pub fn register_user(&self, username: &str) -> Result<User, LedgerError> {
        let user = self.store.create_user(username)?;
        tracing::info!(user = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Opens an account with a fresh unique number and a zero balance.
    pub fn open_account(&self, user_id: UserId, kind: AccountKind) -> Result<Account, LedgerError> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let draft = AccountDraft {
                number: self.references.account_number(),
                kind,
                currency: DEFAULT_CURRENCY.to_string(),
                user_id,
            };
            match self.store.create_account(draft) {
                Err(StoreError::DuplicateAccountNumber(number)) => {
                    tracing::debug!(number = %number, "account number collision, retrying");
                }
                Err(err) => return Err(err.into()),
                Ok(account) => {
                    tracing::info!(
                        account = account.id,
                        user = user_id,
                        number = %account.number,
                        "account opened"
                    );
                    return Ok(account);
                }
            }
        }
        Err(LedgerError::AccountNumberExhausted)
    }

    pub fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        Ok(self.store.account(id)?)
    }

    /// The user's accounts in creation order.
    pub fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.accounts_by_user(user_id)?)
    }

    /// The user's most recent entries across all accounts, newest first.
    pub fn recent_transactions(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions_by_user(user_id, limit)?)
    }

    /// An account's most recent entries, newest first.
    pub fn account_transactions(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions_by_account(account_id, limit)?)
    }

    /// Posts a deposit or withdrawal. The balance check and the write
    /// happen under the account's lock, so concurrent postings cannot lose
    /// updates.
    pub fn post_transaction(
        &self,
        account_id: AccountId,
        user_id: UserId,
        amount: Decimal,
        description: &str,
        kind: TransactionKind,
    ) -> Result<Transaction, LedgerError> {
        let signed = kind.signed_amount(amount)?;
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let draft = TransactionDraft::new(
                self.references.transaction_reference(),
                signed,
                description.to_string(),
                kind,
                user_id,
                account_id,
            )?;
            let result = self.store.run_atomic(&[account_id], |unit| {
                unit.account(account_id)?.check_posting(signed)?;
                unit.stage(draft);
                Ok(())
            });
            match result {
                Err(LedgerError::Store(StoreError::DuplicateReference(reference))) => {
                    tracing::debug!(reference = %reference, "reference collision, retrying");
                }
                Err(err) => return Err(err),
                Ok(mut entries) => {
                    let entry = entries.pop().expect("commit returns every staged entry");
                    tracing::info!(
                        account = account_id,
                        entry = entry.id,
                        amount = %entry.amount,
                        "entry posted"
                    );
                    return Ok(entry);
                }
            }
        }
        Err(LedgerError::ReferenceExhausted)
    }

    /// Moves funds between two users as one atomic unit of two entries: a
    /// debit leg on the sender's account and a credit leg on the
    /// recipient's. Both parties fund through their first account, in
    /// creation order.
    pub fn transfer(
        &self,
        sender_user_id: UserId,
        recipient_username: &str,
        amount: Decimal,
    ) -> Result<(Transaction, Transaction), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(TransactionError::NonPositiveAmount(amount).into());
        }

        let sender = self.store.user(sender_user_id)?;
        let recipient = self
            .store
            .user_by_username(recipient_username)?
            .ok_or_else(|| LedgerError::RecipientNotFound(recipient_username.to_string()))?;

        let sender_account = self
            .store
            .accounts_by_user(sender.id)?
            .into_iter()
            .next()
            .ok_or(LedgerError::NoSenderAccount)?;
        let recipient_account = self
            .store
            .accounts_by_user(recipient.id)?
            .into_iter()
            .next()
            .ok_or(LedgerError::NoRecipientAccount)?;

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let debit = TransactionDraft::new(
                self.references.transaction_reference(),
                -amount,
                format!("Transfer to {}", recipient.username),
                TransactionKind::Transfer,
                sender.id,
                sender_account.id,
            )?;
            let credit = TransactionDraft::new(
                self.references.transaction_reference(),
                amount,
                format!("Transfer from {}", sender.username),
                TransactionKind::Transfer,
                recipient.id,
                recipient_account.id,
            )?;
            let result = self
                .store
                .run_atomic(&[sender_account.id, recipient_account.id], |unit| {
                    // re-read under the lock: the balance seen during
                    // resolution may already be stale
                    unit.account(sender_account.id)?.check_posting(-amount)?;
                    unit.stage(debit);
                    unit.stage(credit);
                    Ok(())
                });
            match result {
                Err(LedgerError::Store(StoreError::DuplicateReference(reference))) => {
                    tracing::debug!(reference = %reference, "reference collision, retrying");
                }
                Err(err) => return Err(err),
                Ok(entries) => {
                    let [debit, credit]: [Transaction; 2] = entries
                        .try_into()
                        .expect("commit returns every staged entry");
                    tracing::info!(
                        sender = sender_account.id,
                        recipient = recipient_account.id,
                        amount = %amount,
                        "transfer settled"
                    );
                    return Ok((debit, credit));
                }
            }
        }
        Err(LedgerError::ReferenceExhausted)
    }
}
