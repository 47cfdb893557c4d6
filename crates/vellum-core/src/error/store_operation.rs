use super::Error;

/// Error when a document-store operation fails.
///
/// Wraps the driver's error. Commit-time classification
/// ([`Error::classify_commit`]) inspects the detail string to map known
/// signatures onto structured kinds.
#[derive(Debug)]
pub(super) struct StoreOperation {
    detail: Box<str>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StoreOperation {
    pub(super) fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl std::error::Error for StoreOperation {}

impl core::fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "store operation failed: {}", self.detail)
    }
}

impl Error {
    /// Creates a store operation error from a detail string.
    pub fn store_operation(detail: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::StoreOperation(StoreOperation {
            detail: detail.into().into(),
            source: None,
        }))
    }

    /// Creates a store operation error wrapping a driver error.
    pub fn store_operation_source(
        detail: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Error {
        Error::from(super::ErrorKind::StoreOperation(StoreOperation {
            detail: detail.into().into(),
            source: Some(Box::new(source)),
        }))
    }

    /// Returns `true` if this error is a store operation error.
    pub fn is_store_operation(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::StoreOperation(_))
    }
}
