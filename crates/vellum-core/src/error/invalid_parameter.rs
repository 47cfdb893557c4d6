use super::Error;

/// Error when an argument has the wrong shape.
///
/// For example, passing non-key attributes where only key components are
/// accepted, or addressing an attribute the model does not declare.
#[derive(Debug)]
pub(super) struct InvalidParameter {
    message: Box<str>,
}

impl std::error::Error for InvalidParameter {}

impl core::fmt::Display for InvalidParameter {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "invalid parameter: {}", self.message)
    }
}

impl Error {
    /// Creates an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::InvalidParameter(InvalidParameter {
            message: message.into().into(),
        }))
    }

    /// Returns `true` if this error is an invalid parameter error.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self.kind(), super::ErrorKind::InvalidParameter(_))
    }
}
