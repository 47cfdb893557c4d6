use super::Error;

/// Terminal wrapper surfaced to the caller when a transaction gives up.
///
/// Carries the attempt count; the underlying failure is the cause chain.
#[derive(Debug)]
pub(super) struct TransactionFailed {
    attempts: u32,
}

impl std::error::Error for TransactionFailed {}

impl core::fmt::Display for TransactionFailed {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if self.attempts == 1 {
            write!(f, "transaction failed after 1 attempt")
        } else {
            write!(f, "transaction failed after {} attempts", self.attempts)
        }
    }
}

impl Error {
    /// Creates the terminal transaction failed wrapper.
    pub fn transaction_failed(attempts: u32) -> Error {
        Error::from(super::ErrorKind::TransactionFailed(TransactionFailed {
            attempts,
        }))
    }

    /// Returns `true` if this error is the terminal transaction failure.
    pub fn is_transaction_failed(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::TransactionFailed(_))
    }
}
