use super::Error;

/// Error when a transaction context is configured with a bad option.
#[derive(Debug)]
pub(super) struct InvalidOptions {
    message: Box<str>,
}

impl std::error::Error for InvalidOptions {}

impl core::fmt::Display for InvalidOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid options: {}", self.message)
    }
}

impl Error {
    /// Creates an invalid options error.
    pub fn invalid_options(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidOptions(InvalidOptions {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid options error.
    pub fn is_invalid_options(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidOptions(_))
    }
}
