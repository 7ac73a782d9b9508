use rand::Rng;

/// Length of externally visible account numbers.
pub const ACCOUNT_NUMBER_LEN: usize = 10;

/// Length of externally visible transaction references.
pub const TRANSACTION_REFERENCE_LEN: usize = 10;

/// How many candidate identifiers a caller may try before giving up.
pub const MAX_GENERATION_ATTEMPTS: usize = 20;

const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces candidate identifiers. Generation alone does not guarantee
/// uniqueness: callers must let the store reject duplicates and retry,
/// giving up after [`MAX_GENERATION_ATTEMPTS`].
pub trait ReferenceSource: Send + Sync {
    /// Candidate account number, a fixed-length numeric string.
    fn account_number(&self) -> String;

    /// Candidate transaction reference, fixed-length uppercase alphanumeric.
    fn transaction_reference(&self) -> String;
}

/// Draws identifiers uniformly from the thread-local RNG.
#[derive(Debug, Default)]
pub struct RandomReferences;

impl ReferenceSource for RandomReferences {
    fn account_number(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..ACCOUNT_NUMBER_LEN)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    fn transaction_reference(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..TRANSACTION_REFERENCE_LEN)
            .map(|_| char::from(REFERENCE_CHARSET[rng.gen_range(0..REFERENCE_CHARSET.len())]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_numbers_are_fixed_length_digits() {
        let number = RandomReferences.account_number();
        assert_eq!(number.len(), ACCOUNT_NUMBER_LEN);
        assert!(number.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn references_are_fixed_length_uppercase_alphanumeric() {
        let reference = RandomReferences.transaction_reference();
        assert_eq!(reference.len(), TRANSACTION_REFERENCE_LEN);
        assert!(
            reference
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }
}
