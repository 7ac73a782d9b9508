/// Account and user records, plus the balance check that guards every
/// posting.
pub mod account;

/// Ledger entry records and their validation.
pub mod transaction;

/// Unique identifier generation for account numbers and transaction
/// references.
pub mod reference;

/// Storage interface, plus "in memory" implementation.
///
/// NOTE: the trait is the integration point for a durable backend; the in
/// memory store keeps the same atomicity contract a database transaction
/// would provide.
pub mod store;

/// The operations facade: account opening, deposits/withdrawals and
/// transfers between users.
pub mod ledger;
