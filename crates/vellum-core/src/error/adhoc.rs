use super::Error;

/// A free-form error with no structured kind.
///
/// Used for application errors raised inside a transaction closure and for
/// one-off failures that no structured kind covers.
#[derive(Debug)]
pub(super) struct Adhoc {
    message: Box<str>,
}

impl Adhoc {
    pub(super) fn message(message: impl Into<String>) -> Adhoc {
        Adhoc {
            message: message.into().into(),
        }
    }
}

impl std::error::Error for Adhoc {}

impl core::fmt::Display for Adhoc {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error {
    /// Creates an ad-hoc error from a message.
    pub fn msg(message: impl Into<String>) -> Error {
        Error::from(super::ErrorKind::Adhoc(Adhoc::message(message)))
    }

    /// Creates an ad-hoc error from format arguments.
    pub fn from_args(args: core::fmt::Arguments<'_>) -> Error {
        Error::msg(args.to_string())
    }
}
