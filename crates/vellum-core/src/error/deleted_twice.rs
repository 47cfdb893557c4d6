use super::Error;

/// Error when the same document key is deleted twice by one context.
#[derive(Debug)]
pub(super) struct DeletedTwice {
    path: Box<str>,
}

impl std::error::Error for DeletedTwice {}

impl core::fmt::Display for DeletedTwice {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "model deleted twice: {}", self.path)
    }
}

impl Error {
    /// Creates a deleted twice error for the given document path.
    pub fn deleted_twice(path: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::DeletedTwice(DeletedTwice {
            path: path.into().into(),
        }))
    }

    /// Returns `true` if this error is a deleted twice error.
    pub fn is_deleted_twice(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::DeletedTwice(_))
    }
}
