use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AccountId = u64;
pub type UserId = u64;

/// Currency assigned to newly opened accounts.
pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("`{0}` is not a valid account type")]
    InvalidAccountType(String),
    #[error("Insufficient funds")]
    InsufficientFunds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Checking,
    Savings,
}

impl FromStr for AccountKind {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(Self::Checking),
            "savings" => Ok(Self::Savings),
            other => Err(AccountError::InvalidAccountType(other.to_string())),
        }
    }
}

/// Entry in the user directory. Credentials and profile data live with the
/// identity layer; the ledger only needs the id and the unique username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub number: String,
    pub kind: AccountKind,
    pub balance: Decimal,
    pub currency: String,
    pub user_id: UserId,
}

impl Account {
    /// Checks that applying the signed `amount` keeps the balance
    /// non-negative. Credits always pass; a debit larger than the current
    /// balance does not.
    pub fn check_posting(&self, amount: Decimal) -> Result<(), AccountError> {
        if self.balance + amount < Decimal::ZERO {
            Err(AccountError::InsufficientFunds)
        } else {
            Ok(())
        }
    }
}

/// An account that has not been persisted yet. The store assigns the id;
/// new accounts always start at a zero balance.
#[derive(Debug, Clone)]
pub struct AccountDraft {
    pub number: String,
    pub kind: AccountKind,
    pub currency: String,
    pub user_id: UserId,
}
