use super::Error;

/// Error when the same document key is tracked twice by one context.
///
/// Enabling the context's model cache turns the second `get` into a cache
/// hit instead of this error.
#[derive(Debug)]
pub(super) struct ModelTrackedTwice {
    path: Box<str>,
}

impl std::error::Error for ModelTrackedTwice {}

impl core::fmt::Display for ModelTrackedTwice {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "model tracked twice: {}", self.path)
    }
}

impl Error {
    /// Creates a model tracked twice error for the given document path.
    pub fn model_tracked_twice(path: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::ModelTrackedTwice(ModelTrackedTwice {
            path: path.into().into(),
        }))
    }

    /// Returns `true` if this error is a model tracked twice error.
    pub fn is_model_tracked_twice(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ModelTrackedTwice(_))
    }
}
