use super::Error;

/// Error for a model operation that cannot be carried out.
///
/// This occurs when:
/// - An update provides no data to change
/// - An update or preconditioned delete targets a nonexistent document
#[derive(Debug)]
pub(super) struct ModelOperation {
    message: Box<str>,
}

/// Recognizes store detail strings for writes against missing documents.
pub(super) fn matches_store_detail(detail: &str) -> bool {
    detail.contains("no document to update") || detail.contains("no document to delete")
}

impl std::error::Error for ModelOperation {}

impl core::fmt::Display for ModelOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates a model operation error.
    pub fn model_operation(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::ModelOperation(ModelOperation {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is a model operation error.
    pub fn is_model_operation(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::ModelOperation(_))
    }
}
