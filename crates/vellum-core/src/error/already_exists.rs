use super::Error;

/// Error when a create-only write hits an existing document.
#[derive(Debug)]
pub(super) struct ModelAlreadyExists {
    detail: Box<str>,
}

/// Recognizes the store's create-collision detail string.
pub(super) fn matches_store_detail(detail: &str) -> bool {
    detail.contains("already exists")
}

impl std::error::Error for ModelAlreadyExists {}

impl core::fmt::Display for ModelAlreadyExists {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "model already exists: {}", self.detail)
    }
}

impl Error {
    /// Creates a model already exists error.
    pub fn model_already_exists(detail: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::ModelAlreadyExists(ModelAlreadyExists {
            detail: detail.into().into(),
        }))
    }

    /// Returns `true` if this error is a model already exists error.
    pub fn is_model_already_exists(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ModelAlreadyExists(_))
    }
}
