use super::Error;

/// Error when a field value violates its declared schema.
///
/// This occurs when:
/// - A value fails its descriptor's validator on assignment or load
/// - A compound-key component fails validation during encode/decode
/// - A string key component contains an embedded NUL byte
/// - An immutable field is written after its initial set
#[derive(Debug)]
pub(super) struct InvalidField {
    field: Box<str>,
    message: Box<str>,
}

impl std::error::Error for InvalidField {}

impl core::fmt::Display for InvalidField {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid field `{}`: {}", self.field, self.message)
    }
}

impl Error {
    /// Creates an invalid field error for the named attribute.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidField(InvalidField {
            field: field.into().into(),
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid field error.
    pub fn is_invalid_field(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidField(_))
    }
}
