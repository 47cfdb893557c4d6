use super::Error;

/// Error when a write is attempted in a read-only transaction context.
#[derive(Debug)]
pub(super) struct ReadOnlyWrite {
    operation: Box<str>,
}

impl std::error::Error for ReadOnlyWrite {}

impl core::fmt::Display for ReadOnlyWrite {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "write attempted in read-only transaction: {}",
            self.operation
        )
    }
}

impl Error {
    /// Creates a read-only write error naming the rejected operation.
    pub fn read_only_write(operation: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::ReadOnlyWrite(ReadOnlyWrite {
            operation: operation.into().into(),
        }))
    }

    /// Returns `true` if this error is a read-only write error.
    pub fn is_read_only_write(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ReadOnlyWrite(_))
    }
}
