use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::{AccountId, UserId};

pub type TransactionId = u64;

/// Longest accepted entry description.
pub const MAX_DESCRIPTION_LEN: usize = 140;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
    #[error("{0:?} entries are created by transfers, not posted directly")]
    KindNotPostable(TransactionKind),
    #[error("Description is too long")]
    DescriptionTooLong,
    #[error("`{0}` is not a valid transaction type")]
    InvalidKind(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionKind {
    /// Turns an unsigned magnitude into the signed ledger amount: credits
    /// positive, debits negative. Transfers are rejected here, their legs
    /// carry signs chosen by the coordinator.
    pub fn signed_amount(self, amount: Decimal) -> Result<Decimal, TransactionError> {
        if amount <= Decimal::ZERO {
            return Err(TransactionError::NonPositiveAmount(amount));
        }
        match self {
            Self::Deposit => Ok(amount),
            Self::Withdrawal => Ok(-amount),
            Self::Transfer => Err(TransactionError::KindNotPostable(self)),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "transfer" => Ok(Self::Transfer),
            other => Err(TransactionError::InvalidKind(other.to_string())),
        }
    }
}

/// Entries settle immediately; pending or failed rows are not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
}

/// A committed ledger entry. Once created its amount, account and
/// reference never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub reference: String,
    pub amount: Decimal,
    pub description: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
    pub account_id: AccountId,
}

/// A validated entry that has not been committed yet. The store assigns
/// id, status and timestamp when the surrounding atomic unit commits.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub reference: String,
    pub amount: Decimal,
    pub description: String,
    pub kind: TransactionKind,
    pub user_id: UserId,
    pub account_id: AccountId,
}

impl TransactionDraft {
    pub fn new(
        reference: String,
        amount: Decimal,
        description: String,
        kind: TransactionKind,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<Self, TransactionError> {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(TransactionError::DescriptionTooLong);
        }
        Ok(Self {
            reference,
            amount,
            description,
            kind,
            user_id,
            account_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn signed_amounts() {
        assert_eq!(
            TransactionKind::Deposit.signed_amount(dec!(25)).unwrap(),
            dec!(25)
        );
        assert_eq!(
            TransactionKind::Withdrawal.signed_amount(dec!(25)).unwrap(),
            dec!(-25)
        );
    }

    #[test]
    fn transfers_are_not_postable() {
        let err = TransactionKind::Transfer.signed_amount(dec!(25)).unwrap_err();
        assert!(matches!(
            err,
            TransactionError::KindNotPostable(TransactionKind::Transfer)
        ));
    }

    #[test]
    fn magnitude_must_be_positive() {
        for kind in [TransactionKind::Deposit, TransactionKind::Withdrawal] {
            let err = kind.signed_amount(Decimal::ZERO).unwrap_err();
            assert!(matches!(err, TransactionError::NonPositiveAmount(_)));
            let err = kind.signed_amount(dec!(-1)).unwrap_err();
            assert!(matches!(err, TransactionError::NonPositiveAmount(_)));
        }
    }

    #[test]
    fn parse_transaction_kind() {
        assert_eq!(
            "deposit".parse::<TransactionKind>().unwrap(),
            TransactionKind::Deposit
        );
        assert_eq!(
            "transfer".parse::<TransactionKind>().unwrap(),
            TransactionKind::Transfer
        );
        let err = "refund".parse::<TransactionKind>().unwrap_err();
        assert!(matches!(err, TransactionError::InvalidKind(_)));
    }

    #[test]
    fn description_bound() {
        let draft = TransactionDraft::new(
            "AAAAAAAAAA".to_string(),
            dec!(1),
            "x".repeat(MAX_DESCRIPTION_LEN + 1),
            TransactionKind::Deposit,
            1,
            1,
        );
        assert!(matches!(draft, Err(TransactionError::DescriptionTooLong)));
    }

    #[test]
    fn entries_serialize_for_the_presentation_layer() {
        let entry = Transaction {
            id: 7,
            reference: "Q84F0PN2XY".to_string(),
            amount: dec!(-40.00),
            description: "groceries".to_string(),
            kind: TransactionKind::Withdrawal,
            status: TransactionStatus::Completed,
            timestamp: Utc::now(),
            user_id: 1,
            account_id: 2,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "withdrawal");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["amount"], "-40.00");
        assert_eq!(json["reference"], "Q84F0PN2XY");
    }
}
