use super::Error;

/// Error when the store reports transaction lock contention.
///
/// Always retryable: the conflicting transaction will eventually release
/// its locks (or fail its optimistic check), so a later attempt can win.
#[derive(Debug)]
pub(super) struct LockTimeout {
    detail: Box<str>,
}

/// Recognizes the store's lock-contention detail strings.
pub(super) fn matches_store_detail(detail: &str) -> bool {
    detail.contains("lock contention")
        || detail.contains("lock timeout")
        || detail.contains("concurrent modification")
}

impl std::error::Error for LockTimeout {}

impl core::fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "transaction lock timeout: {}", self.detail)
    }
}

impl Error {
    /// Creates a transaction lock timeout error.
    pub fn lock_timeout(detail: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::LockTimeout(LockTimeout {
            detail: detail.into().into(),
        }))
    }

    /// Returns `true` if this error is a transaction lock timeout error.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::LockTimeout(_))
    }
}
