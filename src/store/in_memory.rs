use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;

use crate::account::{Account, AccountDraft, AccountId, User, UserId};
use crate::transaction::{Transaction, TransactionDraft, TransactionId, TransactionStatus};

use super::{AtomicUnit, LedgerStore, StoreError};

/// RAM-backed [`LedgerStore`].
///
/// Every account lives behind its own mutex, so postings on disjoint
/// accounts proceed in parallel; the registry and journal locks are only
/// held for lookups and appends. Lock order is registry, then accounts in
/// ascending id order, then journal. Poisoned locks surface as
/// [`StoreError::Unavailable`].
#[derive(Default)]
pub struct InMemoryLedgerStore {
    registry: RwLock<Registry>,
    journal: Mutex<Journal>,
}

#[derive(Default)]
struct Registry {
    users: BTreeMap<UserId, User>,
    usernames: HashMap<String, UserId>,
    accounts: BTreeMap<AccountId, Arc<Mutex<Account>>>,
    owners: HashMap<UserId, Vec<AccountId>>,
    account_numbers: HashSet<String>,
    next_user_id: UserId,
    next_account_id: AccountId,
}

/// Append-only record of committed entries.
#[derive(Default)]
struct Journal {
    entries: Vec<Transaction>,
    references: HashSet<String>,
    next_entry_id: TransactionId,
}

struct InMemoryUnit<'g> {
    guards: Vec<(AccountId, MutexGuard<'g, Account>)>,
    staged: Vec<TransactionDraft>,
}

impl AtomicUnit for InMemoryUnit<'_> {
    fn account(&self, id: AccountId) -> Result<&Account, StoreError> {
        self.guards
            .iter()
            .find(|(guard_id, _)| *guard_id == id)
            .map(|(_, guard)| &**guard)
            .ok_or(StoreError::AccountNotFound(id))
    }

    fn stage(&mut self, draft: TransactionDraft) {
        self.staged.push(draft);
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn create_user(&self, username: &str) -> Result<User, StoreError> {
        let mut registry = self.registry.write().map_err(|_| StoreError::Unavailable)?;
        if registry.usernames.contains_key(username) {
            return Err(StoreError::DuplicateUsername(username.to_string()));
        }
        registry.next_user_id += 1;
        let user = User {
            id: registry.next_user_id,
            username: username.to_string(),
        };
        registry.usernames.insert(username.to_string(), user.id);
        registry.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn user(&self, id: UserId) -> Result<User, StoreError> {
        let registry = self.registry.read().map_err(|_| StoreError::Unavailable)?;
        registry
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::UserNotFound(id))
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let registry = self.registry.read().map_err(|_| StoreError::Unavailable)?;
        Ok(registry
            .usernames
            .get(username)
            .and_then(|id| registry.users.get(id))
            .cloned())
    }

    fn create_account(&self, draft: AccountDraft) -> Result<Account, StoreError> {
        let mut registry = self.registry.write().map_err(|_| StoreError::Unavailable)?;
        if !registry.account_numbers.insert(draft.number.clone()) {
            return Err(StoreError::DuplicateAccountNumber(draft.number));
        }
        registry.next_account_id += 1;
        let account = Account {
            id: registry.next_account_id,
            number: draft.number,
            kind: draft.kind,
            balance: Decimal::ZERO,
            currency: draft.currency,
            user_id: draft.user_id,
        };
        registry
            .owners
            .entry(account.user_id)
            .or_default()
            .push(account.id);
        registry
            .accounts
            .insert(account.id, Arc::new(Mutex::new(account.clone())));
        Ok(account)
    }

    fn account(&self, id: AccountId) -> Result<Account, StoreError> {
        let handle = {
            let registry = self.registry.read().map_err(|_| StoreError::Unavailable)?;
            registry
                .accounts
                .get(&id)
                .cloned()
                .ok_or(StoreError::AccountNotFound(id))?
        };
        let account = handle.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(account.clone())
    }

    fn accounts_by_user(&self, user_id: UserId) -> Result<Vec<Account>, StoreError> {
        let handles: Vec<Arc<Mutex<Account>>> = {
            let registry = self.registry.read().map_err(|_| StoreError::Unavailable)?;
            registry
                .owners
                .get(&user_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| registry.accounts.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut accounts = Vec::with_capacity(handles.len());
        for handle in handles {
            let account = handle.lock().map_err(|_| StoreError::Unavailable)?;
            accounts.push(account.clone());
        }
        Ok(accounts)
    }

    fn transactions_by_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        let journal = self.journal.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(journal
            .entries
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn transactions_by_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        let journal = self.journal.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(journal
            .entries
            .iter()
            .rev()
            .filter(|entry| entry.account_id == account_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn run_atomic<E, F>(&self, accounts: &[AccountId], unit: F) -> Result<Vec<Transaction>, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn AtomicUnit) -> Result<(), E>,
    {
        let mut ids = accounts.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let handles = {
            let registry = self
                .registry
                .read()
                .map_err(|_| E::from(StoreError::Unavailable))?;
            let mut handles = Vec::with_capacity(ids.len());
            for id in &ids {
                let handle = registry
                    .accounts
                    .get(id)
                    .cloned()
                    .ok_or_else(|| E::from(StoreError::AccountNotFound(*id)))?;
                handles.push((*id, handle));
            }
            handles
        };

        // Ascending id order, so two units locking overlapping account
        // sets cannot deadlock.
        let mut guards = Vec::with_capacity(handles.len());
        for (id, handle) in &handles {
            let guard = handle
                .lock()
                .map_err(|_| E::from(StoreError::Unavailable))?;
            guards.push((*id, guard));
        }

        let mut state = InMemoryUnit {
            guards,
            staged: Vec::new(),
        };
        unit(&mut state)?;
        let InMemoryUnit { mut guards, staged } = state;

        // Commit. All checks run before the first write, so a failure here
        // leaves balances and the journal untouched.
        let mut journal = self
            .journal
            .lock()
            .map_err(|_| E::from(StoreError::Unavailable))?;
        let mut batch_references = HashSet::new();
        for draft in &staged {
            if journal.references.contains(&draft.reference)
                || !batch_references.insert(draft.reference.as_str())
            {
                return Err(E::from(StoreError::DuplicateReference(
                    draft.reference.clone(),
                )));
            }
            if !guards.iter().any(|(id, _)| *id == draft.account_id) {
                return Err(E::from(StoreError::AccountNotFound(draft.account_id)));
            }
        }

        let timestamp = Utc::now();
        let mut committed = Vec::with_capacity(staged.len());
        for draft in staged {
            journal.next_entry_id += 1;
            let entry = Transaction {
                id: journal.next_entry_id,
                reference: draft.reference,
                amount: draft.amount,
                description: draft.description,
                kind: draft.kind,
                status: TransactionStatus::Completed,
                timestamp,
                user_id: draft.user_id,
                account_id: draft.account_id,
            };
            if let Some((_, guard)) = guards.iter_mut().find(|(id, _)| *id == entry.account_id) {
                guard.balance += entry.amount;
            }
            journal.references.insert(entry.reference.clone());
            journal.entries.push(entry.clone());
            committed.push(entry);
        }
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::account::AccountKind;
    use crate::transaction::TransactionKind;

    use super::*;

    fn draft(number: &str, user_id: UserId) -> AccountDraft {
        AccountDraft {
            number: number.to_string(),
            kind: AccountKind::Checking,
            currency: "USD".to_string(),
            user_id,
        }
    }

    fn entry(account: &Account, reference: &str, amount: Decimal) -> TransactionDraft {
        TransactionDraft {
            reference: reference.to_string(),
            amount,
            description: "test entry".to_string(),
            kind: TransactionKind::Deposit,
            user_id: account.user_id,
            account_id: account.id,
        }
    }

    #[test]
    fn duplicate_account_numbers_are_rejected() {
        let store = InMemoryLedgerStore::new();
        store.create_account(draft("1111111111", 1)).unwrap();

        let err = store.create_account(draft("1111111111", 2)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateAccountNumber(_)));
        assert!(store.accounts_by_user(2).unwrap().is_empty());
    }

    #[test]
    fn duplicate_usernames_are_rejected() {
        let store = InMemoryLedgerStore::new();
        store.create_user("alice").unwrap();

        let err = store.create_user("alice").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(_)));
    }

    #[test]
    fn accounts_come_back_in_creation_order() {
        let store = InMemoryLedgerStore::new();
        let first = store.create_account(draft("1111111111", 7)).unwrap();
        store.create_account(draft("2222222222", 8)).unwrap();
        let third = store.create_account(draft("3333333333", 7)).unwrap();

        let owned = store.accounts_by_user(7).unwrap();
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].id, first.id);
        assert_eq!(owned[1].id, third.id);
    }

    #[test]
    fn committed_units_apply_balance_and_journal_together() {
        let store = InMemoryLedgerStore::new();
        let account = store.create_account(draft("1111111111", 1)).unwrap();

        let committed = store
            .run_atomic::<StoreError, _>(&[account.id], |unit| {
                unit.stage(entry(&account, "AAAAAAAAAA", dec!(25)));
                Ok(())
            })
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].id, 1);
        assert_eq!(committed[0].status, TransactionStatus::Completed);
        assert_eq!(store.account(account.id).unwrap().balance, dec!(25));
        assert_eq!(store.transactions_by_account(account.id, 10).unwrap(), committed);
    }

    #[test]
    fn failed_units_leave_no_trace() {
        let store = InMemoryLedgerStore::new();
        let account = store.create_account(draft("1111111111", 1)).unwrap();

        let err = store
            .run_atomic::<StoreError, _>(&[account.id], |unit| {
                unit.stage(entry(&account, "AAAAAAAAAA", dec!(25)));
                Err(StoreError::Unavailable)
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::Unavailable));
        assert_eq!(store.account(account.id).unwrap().balance, Decimal::ZERO);
        assert!(store.transactions_by_account(account.id, 10).unwrap().is_empty());
    }

    #[test]
    fn duplicate_references_roll_back_the_whole_unit() {
        let store = InMemoryLedgerStore::new();
        let account = store.create_account(draft("1111111111", 1)).unwrap();
        store
            .run_atomic::<StoreError, _>(&[account.id], |unit| {
                unit.stage(entry(&account, "AAAAAAAAAA", dec!(25)));
                Ok(())
            })
            .unwrap();

        let err = store
            .run_atomic::<StoreError, _>(&[account.id], |unit| {
                unit.stage(entry(&account, "BBBBBBBBBB", dec!(5)));
                unit.stage(entry(&account, "AAAAAAAAAA", dec!(5)));
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateReference(_)));
        // neither the fresh entry nor the colliding one was applied
        assert_eq!(store.account(account.id).unwrap().balance, dec!(25));
        assert_eq!(store.transactions_by_account(account.id, 10).unwrap().len(), 1);
    }

    #[test]
    fn references_must_be_unique_within_a_unit() {
        let store = InMemoryLedgerStore::new();
        let account = store.create_account(draft("1111111111", 1)).unwrap();

        let err = store
            .run_atomic::<StoreError, _>(&[account.id], |unit| {
                unit.stage(entry(&account, "AAAAAAAAAA", dec!(5)));
                unit.stage(entry(&account, "AAAAAAAAAA", dec!(5)));
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateReference(_)));
        assert_eq!(store.account(account.id).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn unknown_accounts_fail_before_the_unit_runs() {
        let store = InMemoryLedgerStore::new();
        let err = store
            .run_atomic::<StoreError, _>(&[99], |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(99)));
    }

    #[test]
    fn entries_come_back_newest_first_up_to_the_limit() {
        let store = InMemoryLedgerStore::new();
        let account = store.create_account(draft("1111111111", 1)).unwrap();
        for reference in ["AAAAAAAAAA", "BBBBBBBBBB", "CCCCCCCCCC"] {
            store
                .run_atomic::<StoreError, _>(&[account.id], |unit| {
                    unit.stage(entry(&account, reference, dec!(1)));
                    Ok(())
                })
                .unwrap();
        }

        let recent = store.transactions_by_account(account.id, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].reference, "CCCCCCCCCC");
        assert_eq!(recent[1].reference, "BBBBBBBBBB");

        let by_user = store.transactions_by_user(1, 10).unwrap();
        assert_eq!(by_user.len(), 3);
    }
}
